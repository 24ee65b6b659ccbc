//! Error types for environment stacks

use std::fmt;
use thiserror::Error;

/// Result type alias for stack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Operation performed against a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOperation {
    Select,
    Apply,
    Output,
    Destroy,
}

impl fmt::Display for StackOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when working with environment stacks
#[derive(Debug, Error)]
pub enum StackError {
    /// The provisioning system rejected or failed an operation
    #[error("Stack '{bucket}' {operation} failed: {message}")]
    Operation {
        /// Environment the operation targeted
        bucket: String,
        operation: StackOperation,
        /// Redacted error output
        message: String,
    },

    /// The requested output has never been published
    #[error("Output '{key}' not found on stack '{bucket}'")]
    NotFound { bucket: String, key: String },

    /// A mutating call was made before any stack was selected
    #[error("No stack selected")]
    NoStackSelected,

    /// Output from the provisioning system could not be understood
    #[error("Failed to parse output of stack '{bucket}': {message}")]
    Parse { bucket: String, message: String },
}

impl StackError {
    pub fn operation(
        bucket: impl Into<String>,
        operation: StackOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            bucket: bucket.into(),
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = StackError::operation("stage", StackOperation::Apply, "unauthorized");
        assert_eq!(err.to_string(), "Stack 'stage' apply failed: unauthorized");
        assert!(!err.is_not_found());

        let err = StackError::not_found("latest", "dockerTag");
        assert_eq!(err.to_string(), "Output 'dockerTag' not found on stack 'latest'");
        assert!(err.is_not_found());
    }
}
