use imbridge_accounts::Error as AccountError;

/// Errors specific to the XMPP backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid jid: {0}")]
    Jid(#[from] jid::Error),

    #[error("stanza serialization failed: {0}")]
    Xml(#[from] minidom::Error),

    #[error("invalid avatar payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl From<Error> for AccountError {
    fn from(err: Error) -> Self {
        match err {
            Error::Account(e) => e,
            other => AccountError::message(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
