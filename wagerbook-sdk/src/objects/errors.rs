use serde::{Deserialize, Serialize};

/// Category of a failed core operation.
///
/// The presentation layer switches on this to pick wording; the message in
/// [`ErrorPayload`] is shown verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    InsufficientFunds,
    DailyLimitExceeded,
    NotAuthorized,
    InvalidState,
    NotFound,
    /// Storage failed; nothing was applied and the call may be retried.
    Transient,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::InsufficientFunds => "insufficient_funds",
            ErrorCategory::DailyLimitExceeded => "daily_limit_exceeded",
            ErrorCategory::NotAuthorized => "not_authorized",
            ErrorCategory::InvalidState => "invalid_state",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Transient => "transient",
        }
    }

    /// Whether retrying the same call unchanged can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    /// Remaining daily allowance, only set for `DailyLimitExceeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_allowance: Option<i64>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            remaining_allowance: None,
        }
    }

    pub fn with_remaining_allowance(mut self, remaining: i64) -> Self {
        self.remaining_allowance = Some(remaining);
        self
    }
}
