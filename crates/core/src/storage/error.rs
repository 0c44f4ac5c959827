use thiserror::Error;

use crate::model::ConversionError;

/// Error code reported by the store when a write condition is not met.
pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// A client error returned by the store, carrying its machine-readable code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur during data-access operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    /// The store rejected the request. Retryable through the retry executor.
    #[error("Store error: {0}")]
    Client(#[from] StoreError),
    /// The request never produced a service response.
    #[error("Transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Unknown field {field} for {record}")]
    UnknownField { record: &'static str, field: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DataError {
    pub fn client(code: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Client(StoreError::new(code, message))
    }

    /// The store error code, for client errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            DataError::Client(e) => Some(&e.code),
            _ => None,
        }
    }

    pub fn is_conditional_check_failed(&self) -> bool {
        self.code() == Some(CONDITIONAL_CHECK_FAILED)
    }
}

/// Result type for data-access operations.
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let error = DataError::client("ProvisionedThroughputExceededException", "slow down");
        assert_eq!(
            error.to_string(),
            "Store error: ProvisionedThroughputExceededException: slow down"
        );
        assert_eq!(error.code(), Some("ProvisionedThroughputExceededException"));
    }

    #[test]
    fn test_conditional_check_failed() {
        let error = DataError::client(CONDITIONAL_CHECK_FAILED, "The conditional request failed");
        assert!(error.is_conditional_check_failed());
        assert!(!DataError::Transport("timeout".to_string()).is_conditional_check_failed());
    }

    #[test]
    fn test_conversion_error_is_transparent() {
        let error: DataError = ConversionError::new("age", "int", "bad").into();
        assert_eq!(error.to_string(), "Error converting field age to int: bad");
        assert_eq!(error.code(), None);
    }

    #[test]
    fn test_unknown_field_display() {
        let error = DataError::UnknownField {
            record: "Stadium",
            field: "capacity".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown field capacity for Stadium");
    }
}
