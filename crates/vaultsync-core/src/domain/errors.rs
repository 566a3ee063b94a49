//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! configuration problems, unparseable schedule expressions and
//! registry lookups.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A configuration field is malformed or missing
    #[error("Invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Dotted path of the offending field
        field: String,
        /// Human-readable explanation
        message: String,
    },

    /// A schedule expression is neither a preset nor a valid cron expression
    #[error("Invalid schedule expression '{expression}': {reason}")]
    ScheduleParse {
        /// The rejected expression
        expression: String,
        /// Why parsing failed
        reason: String,
    },

    /// No schedule is registered under this name
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvalidConfig`] error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
