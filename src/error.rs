//! Session-scoped error taxonomy
//!
//! None of these are fatal to the process. Every variant is recoverable by
//! retrying the operation or resetting the session to `greeting`.

use crate::gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DivinationError {
    /// A transition's precondition is unmet; the step does not advance.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// A request builder was invoked without the session fields it needs.
    #[error("Incomplete input: {0}")]
    IncompleteInput(String),
    /// Coin-toss input is not six values drawn from {6, 7, 8, 9}.
    #[error("Invalid coin toss: {0}")]
    InvalidToss(String),
    /// The gateway answered 2xx but the body failed structural validation.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("A calculation is already in flight for this session")]
    Busy,
}

impl DivinationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::IncompleteInput(message.into())
    }

    pub fn invalid_toss(message: impl Into<String>) -> Self {
        Self::InvalidToss(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Whether the same request may be resubmitted. Any gateway failure
    /// qualifies, whatever its kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Busy)
    }
}

pub type DivinationResult<T> = Result<T, DivinationError>;
