//! Error types for stackscope.

use thiserror::Error;

/// Main error type for stackscope operations.
#[derive(Error, Debug)]
pub enum StackscopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Frame index {index} out of range ({count} frames)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl StackscopeError {
    /// Whether a retry on the next access can reasonably succeed.
    ///
    /// Format errors are permanent for a given file; I/O and decode
    /// failures are treated as transient and never cached.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Decode(_))
    }
}

/// Result type alias for stackscope operations.
pub type Result<T> = std::result::Result<T, StackscopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_message() {
        let err = StackscopeError::IndexOutOfRange {
            index: 100,
            count: 100,
        };
        assert_eq!(err.to_string(), "Frame index 100 out of range (100 frames)");
    }

    #[test]
    fn test_transient_classification() {
        assert!(StackscopeError::Decode("truncated row".into()).is_transient());
        assert!(!StackscopeError::Format("shape mismatch".into()).is_transient());
        assert!(!StackscopeError::NotFound("zone".into()).is_transient());
    }
}
