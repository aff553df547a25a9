use crate::storage::StoreError;
use thiserror::Error;
use wagerbook_sdk::objects::{ErrorCategory, ErrorPayload};

/// Errors returned by every engine operation.
///
/// Validation and state guards fail before anything is written; a
/// `Storage` error means the unit of work was rolled back as a whole.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("daily limit exceeded: {remaining} remaining today")]
    DailyLimitExceeded { remaining: i64 },

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("temporary storage failure, please retry: {0}")]
    Storage(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::InvalidInput(_) => ErrorCategory::InvalidInput,
            EngineError::InsufficientFunds { .. } => ErrorCategory::InsufficientFunds,
            EngineError::DailyLimitExceeded { .. } => ErrorCategory::DailyLimitExceeded,
            EngineError::NotAuthorized(_) => ErrorCategory::NotAuthorized,
            EngineError::InvalidState(_) => ErrorCategory::InvalidState,
            EngineError::NotFound(_) => ErrorCategory::NotFound,
            EngineError::Storage(_) => ErrorCategory::Transient,
        }
    }

    /// The error as shown to the user.
    pub fn to_payload(&self) -> ErrorPayload {
        let payload = ErrorPayload::new(self.category(), self.to_string());
        match self {
            EngineError::DailyLimitExceeded { remaining } => {
                payload.with_remaining_allowance(*remaining)
            }
            _ => payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = EngineError::DailyLimitExceeded { remaining: 40 };
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::DailyLimitExceeded);
        assert_eq!(payload.remaining_allowance, Some(40));
        assert_eq!(payload.message, "daily limit exceeded: 40 remaining today");

        let err = EngineError::Storage(StoreError::CommitFailed("disk full".into()));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.to_payload().category.is_retryable());
    }
}
