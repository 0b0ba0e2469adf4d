use std::time::Duration;

use thiserror::Error;

/// Errors shared by every bridge account backend.
///
/// Capability and precondition failures are returned straight from the call
/// that triggered them. Correlation failures (`Timeout`, `MissingPayload`,
/// `Cancelled`) only ever surface as the outcome of a [`crate::Pending`] value.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("no backend account is bound to this instance, call find_account() first")]
    NotBound,

    #[error("account {username} not found for protocol {protocol_id}")]
    AccountNotFound {
        username: String,
        protocol_id: String,
    },

    #[error("unknown protocol: {protocol_id}")]
    UnknownProtocol { protocol_id: String },

    #[error("{backend} does not support {operation}")]
    NotSupported { backend: String, operation: String },

    #[error("timed out after {}ms waiting for {key}", timeout.as_millis())]
    Timeout { key: String, timeout: Duration },

    #[error("handle '{handle}' already carries the conflict suffix '{marker}', not retrying join")]
    ConflictExhausted { handle: String, marker: String },

    #[error("reply for {key} did not contain {expected}")]
    MissingPayload { key: String, expected: String },

    #[error("a request for {key} is already pending")]
    AlreadyPending { key: String },

    #[error("request for {key} was dropped before it settled")]
    Cancelled { key: String },

    #[error("join properties are missing '{key}'")]
    MissingJoinProperty { key: String },

    #[error("stream write: {0}")]
    Write(String),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    #[must_use]
    pub fn not_supported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn missing_payload(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::MissingPayload {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// True for failures that come out of a correlation wait rather than
    /// from the call itself.
    pub fn is_correlation_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::MissingPayload { .. } | Self::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
