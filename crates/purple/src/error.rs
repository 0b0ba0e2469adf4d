use imbridge_accounts::Error as AccountError;

/// Failures reported by the legacy IM library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("library call {call} failed: {message}")]
    Call {
        call: &'static str,
        message: String,
    },

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl Error {
    #[must_use]
    pub fn call(call: &'static str, message: impl Into<String>) -> Self {
        Self::Call {
            call,
            message: message.into(),
        }
    }
}

impl From<Error> for AccountError {
    fn from(err: Error) -> Self {
        match err {
            Error::Call { call, message } => {
                AccountError::message(format!("library call {call} failed: {message}"))
            },
            Error::Account(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_error_converts_to_account_message() {
        let err: AccountError = Error::call("join_chat", "no such room").into();
        assert_eq!(err.to_string(), "library call join_chat failed: no such room");
    }

    #[test]
    fn account_error_passes_through() {
        let err: AccountError = Error::from(AccountError::NotBound).into();
        assert!(matches!(err, AccountError::NotBound));
    }
}
