//! Error types shared across the crate.
//!
//! Errors are split by the seam they cross: [`DriverError`] comes back from the
//! page driver, [`HandlerError`] from an action body, [`ActionError`] from the
//! registry, [`ReasonerError`] from the decision source and [`ConfigError`]
//! from configuration parsing. Run-level failures live in [`crate::agent`].

use thiserror::Error;

/// Result alias for page driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result alias for registry operations
pub type Result<T> = std::result::Result<T, ActionError>;

/// Errors reported by a page driver.
///
/// Only [`DriverError::SessionLost`] and [`DriverError::LaunchFailed`] are
/// fatal; everything else describes a single page operation that went wrong
/// and leaves the session usable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Page operation failed: {0}")]
    OperationFailed(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),
}

impl DriverError {
    /// Whether the session is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionLost(_) | DriverError::LaunchFailed(_))
    }
}

/// Errors raised from inside an action handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Parameters passed the declared schema but the action still could not read them
    #[error("Invalid parameters: {}", format_issues(.0))]
    InvalidParameter(Vec<ParamIssue>),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }

    /// Protocol-level errors are the only handler errors that end a run
    pub fn is_fatal(&self) -> bool {
        match self {
            HandlerError::Driver(e) => e.is_fatal(),
            HandlerError::InvalidParameter(_) | HandlerError::Failed(_) => false,
        }
    }
}

/// A single rejected parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamIssue {
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for ParamIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.field, self.reason)
    }
}

/// Registry-level errors
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action '{0}' is already registered")]
    DuplicateAction(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Invalid parameters for '{action}': {}", format_issues(.issues))]
    InvalidParameter { action: String, issues: Vec<ParamIssue> },

    #[error("Action '{action}' hit a fatal browser error: {source}")]
    Fatal {
        action: String,
        #[source]
        source: DriverError,
    },
}

impl ActionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::Fatal { .. })
    }

    /// Names of the offending parameters, if this is a parameter error
    pub fn invalid_fields(&self) -> Vec<&str> {
        match self {
            ActionError::InvalidParameter { issues, .. } => issues.iter().map(|i| i.field.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn format_issues(issues: &[ParamIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Errors from a reasoner
#[derive(Debug, Error)]
pub enum ReasonerError {
    /// The reply could not be read as a decision. The loop records it and moves on.
    #[error("Malformed decision: {0}")]
    Malformed(String),

    #[error("Reasoner request failed: {0}")]
    Transport(String),

    #[error("Reasoner API error: {0}")]
    Api(String),

    #[error("Reasoner has no more decisions")]
    Exhausted,
}

impl ReasonerError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReasonerError::Malformed(_))
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Unsupported output schema: {0}")]
    Schema(String),
}
