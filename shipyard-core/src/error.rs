//! Error types for target planning and artifact tags

use thiserror::Error;

/// Errors detected while registering targets or computing a plan
///
/// All of these are configuration errors: they are reported before any
/// target body runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Two targets were registered with the same name
    #[error("Target '{0}' is registered more than once")]
    DuplicateTarget(String),

    /// A requested or referenced target is not registered
    #[error("Unknown target '{name}'{}", .referenced_by.as_ref().map(|r| format!(" (referenced by '{}')", r)).unwrap_or_default())]
    UnknownTarget {
        /// The missing target
        name: String,
        /// Target whose edge points at the missing one
        referenced_by: Option<String>,
    },

    /// The dependency/ordering edges contain a cycle
    #[error("Circular dependency detected: {}", .members.join(" -> "))]
    Cycle {
        /// Targets on the cycle, first member repeated at the end
        members: Vec<String>,
    },
}

impl PlanError {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownTarget {
            name: name.into(),
            referenced_by: None,
        }
    }

    /// Check if this error names a cycle containing `target`
    pub fn is_cycle_through(&self, target: &str) -> bool {
        matches!(self, Self::Cycle { members } if members.iter().any(|m| m == target))
    }
}

/// Errors creating or parsing an artifact tag
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// Commit hash is too short or not hexadecimal
    #[error("Invalid commit hash '{0}': expected at least 7 hexadecimal characters")]
    InvalidCommit(String),

    /// Random disambiguator must be a single digit
    #[error("Invalid random digit {0}: expected 0-9")]
    InvalidDigit(u8),

    /// String does not follow the tag format
    #[error("Invalid artifact tag '{0}': expected yy.MM.dd.<commit7>-<hundredths><digit>")]
    Malformed(String),
}
