use thiserror::Error;

/// Validation / model errors, structured with enough context for a caller to
/// report the offending fragment, field and index without re-deriving it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("fragment[{index}] {field}: {message}")]
    Validation {
        index: usize,
        field: &'static str,
        message: String,
    },

    #[error("invalid max-unavailable value: {0}")]
    InvalidMaxUnavailable(String),

    #[error("invalid owner token: {0}")]
    InvalidOwner(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
