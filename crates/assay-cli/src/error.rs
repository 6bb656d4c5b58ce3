//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Suite file could not be loaded or validated
    #[error("Invalid suite {path}: {source}")]
    Suite {
        /// Suite path
        path: String,
        /// Underlying library error
        #[source]
        source: assay::AssayError,
    },

    /// At least one scenario failed
    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed {
        /// Number of failed scenarios
        failed: usize,
        /// Number of selected scenarios
        total: usize,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Report generation error
    #[error("Report generation failed: {message}")]
    ReportGeneration {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Assay library error
    #[error("Assay error: {0}")]
    Assay(#[from] assay::AssayError),
}

impl CliError {
    /// Create a suite error
    #[must_use]
    pub fn suite(path: &std::path::Path, source: assay::AssayError) -> Self {
        Self::Suite {
            path: path.display().to_string(),
            source,
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a report generation error
    #[must_use]
    pub fn report_generation(message: impl Into<String>) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_suite_error() {
        let err = CliError::suite(Path::new("s.yaml"), assay::AssayError::script("bad kind"));
        let msg = err.to_string();
        assert!(msg.contains("s.yaml"));
        assert!(msg.contains("bad kind"));
    }

    #[test]
    fn test_scenarios_failed() {
        let err = CliError::ScenariosFailed {
            failed: 2,
            total: 12,
        };
        assert_eq!(err.to_string(), "2 of 12 scenarios failed");
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad arg");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_report_generation_error() {
        let err = CliError::report_generation("disk full");
        assert!(err.to_string().contains("Report"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.to_string().contains("I/O"));
    }
}
