//! Error types for reconciliation operations.

use std::io;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured validation error information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorInfo {
    /// Field that failed validation.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl ValidationErrorInfo {
    /// Create a new validation error entry.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_validation(errors: &[ValidationErrorInfo]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while reconciling network configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from file or process operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A mandatory configuration fragment or attribute is missing.
    #[error("required attribute missing: {0}")]
    RequiredAttributeMissing(String),

    /// One or more configuration fragments failed validation.
    #[error("validation failed: {}", join_validation(.0))]
    Validation(Vec<ValidationErrorInfo>),

    /// Unexpected failure in a lower layer.
    #[error("internal error: {0}")]
    Internal(String),

    /// Parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Interface not found.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },

    /// The operation is not defined for this interface type.
    #[error("unsupported interface type {kind} for {name}")]
    UnsupportedInterfaceType {
        /// Interface name.
        name: String,
        /// Interface type as stored in the property bag.
        kind: String,
    },

    /// An external command exited unsuccessfully.
    #[error("command failed: {command} (exit {exit_code}): {stderr}")]
    Command {
        /// The rendered command line.
        command: String,
        /// Process exit code (-1 if killed by a signal).
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A collaborating service reported a failure.
    #[error("{service}: {message}")]
    Collaborator {
        /// The service that failed (e.g. "configuration", "crypto").
        service: &'static str,
        /// Human-readable error message.
        message: String,
    },

    /// Internal error with operation context.
    #[error("{operation}: {source}")]
    WithContext {
        /// The operation that failed.
        operation: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a collaborator error.
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
        }
    }

    /// Add context to this error.
    ///
    /// Configuration and validation errors are returned unchanged so callers
    /// can still match on them.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            err @ (Self::Configuration(_)
            | Self::RequiredAttributeMissing(_)
            | Self::Validation(_)) => err,
            other => Self::WithContext {
                operation: operation.into(),
                source: Box::new(other),
            },
        }
    }

    /// Check if this error rejects the submitted configuration itself.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::RequiredAttributeMissing(_) | Self::Validation(_) => {
                true
            }
            Self::WithContext { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::InterfaceNotFound { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Get the exit code if this is a command failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Command { exit_code, .. } => Some(*exit_code),
            Self::WithContext { source, .. } => source.exit_code(),
            _ => None,
        }
    }
}
