use thiserror::Error;

/// Message the notebook store answers with when a key does not decrypt a notebook.
pub const WRONG_KEY_MESSAGE: &str = "incorrect notebook key";

/// Failures the coordination layer distinguishes between.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotebookError {
    /// Detected locally; never reaches the store.
    #[error("{0}")]
    Validation(String),

    /// The store rejected the key.
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    Remote(String),

    /// An interactive prompt was dismissed.
    #[error("cancelled by user")]
    Cancelled,
}

impl NotebookError {
    /// Classifies an error string returned inside a store response envelope.
    pub fn from_store_message(message: &str) -> Self {
        if message.trim() == WRONG_KEY_MESSAGE {
            Self::Authorization(message.trim().to_string())
        } else {
            Self::Remote(message.to_string())
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }
}

/// Request URLs carry notebook keys in their query string, so the URL is
/// stripped before the error is ever formatted.
impl From<reqwest::Error> for NotebookError {
    fn from(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            Self::Remote(format!("the notebook store did not answer in time: {}", e))
        } else if e.is_decode() {
            Self::Remote(format!("unexpected response from the notebook store: {}", e))
        } else {
            Self::Remote(e.to_string())
        }
    }
}

pub type NotebookResult<T> = Result<T, NotebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_key_message_is_an_authorization_error() {
        let err = NotebookError::from_store_message("incorrect notebook key");
        assert!(err.is_authorization());
    }

    #[test]
    fn other_store_messages_are_remote_errors() {
        let err = NotebookError::from_store_message("the specified notebook does not exist");
        assert_eq!(
            err,
            NotebookError::Remote("the specified notebook does not exist".to_string())
        );
    }
}
