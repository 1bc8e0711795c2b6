//! Error types for the coach service

use thiserror::Error;

/// Main error type for coach operations
#[derive(Error, Debug)]
pub enum CoachError {
    /// The active model backend reported quota/rate-limit exhaustion
    #[error("Model quota exhausted: {0}")]
    QuotaExceeded(String),

    /// The model backend failed for a reason other than quota
    #[error("Model provider error: {0}")]
    Provider(String),

    /// Primary was rate-limited and the fallback failed as well
    #[error("Both model backends failed (primary: {primary}; fallback: {fallback})")]
    BothBackendsFailed { primary: String, fallback: String },

    /// The agent loop hit the cycle cap without producing an answer
    #[error("Agent loop exceeded {max_cycles} model cycles without an answer")]
    WorkflowExhausted { max_cycles: usize },

    /// Conversation state could not be read or appended
    #[error("Thread store error: {0}")]
    ThreadStore(String),

    /// Malformed inbound chat request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database error outside the tool path (plan persistence, pool setup)
    #[error("Database error: {0}")]
    Database(String),
}

impl CoachError {
    /// Whether the caller should answer with service-unavailable semantics.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CoachError::BothBackendsFailed { .. })
    }

    /// The single user-facing message for fatal conditions. Internal detail
    /// stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            CoachError::InvalidRequest(_) => "The request could not be understood.",
            _ => "The practice coach is temporarily unavailable. Please try again in a moment.",
        }
    }
}

/// Result type alias for coach operations
pub type CoachResult<T> = Result<T, CoachError>;
