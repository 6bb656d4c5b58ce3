//! Result and error types for Assay.

use std::time::Duration;
use thiserror::Error;

/// Result type for Assay operations
pub type AssayResult<T> = Result<T, AssayError>;

/// Errors that can occur while driving a target surface
#[derive(Debug, Error)]
pub enum AssayError {
    /// The surface did not reach a loaded state
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// An element reference went stale between query and mutation
    #[error("Target unavailable: element for `{locator}` is no longer attached")]
    TargetUnavailable {
        /// Locator the stale element was obtained from
        locator: String,
    },

    /// A retrying predicate never held
    #[error(
        "Timed out after {}ms ({attempts} attempt(s)) waiting for {description}: expected {expected}, got {actual}",
        elapsed.as_millis()
    )]
    AssertionTimeout {
        /// What was waited for (locator and predicate)
        description: String,
        /// Expected value
        expected: String,
        /// Last observed value
        actual: String,
        /// Number of evaluations
        attempts: usize,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// A behavior table references an unknown capability or method
    #[error("Mock configuration error for `{capability}`: {message}")]
    MockConfiguration {
        /// Capability name
        capability: String,
        /// Error message
        message: String,
    },

    /// A locator expression could not be parsed
    #[error("Invalid locator `{expression}`: {message}")]
    InvalidLocator {
        /// The raw expression
        expression: String,
        /// Error message
        message: String,
    },

    /// A scenario script is malformed
    #[error("Script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Operation called in the wrong state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl AssayError {
    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a mock configuration error
    #[must_use]
    pub fn mock_configuration(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MockConfiguration {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error class
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NavigationError { .. } => "navigation_error",
            Self::TargetUnavailable { .. } => "target_unavailable",
            Self::AssertionTimeout { .. } => "assertion_timeout",
            Self::MockConfiguration { .. } => "mock_configuration_error",
            Self::InvalidLocator { .. } => "invalid_locator",
            Self::Script { .. } => "script_error",
            Self::InvalidState { .. } => "invalid_state",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
        }
    }
}
