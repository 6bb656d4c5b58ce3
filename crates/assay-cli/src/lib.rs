//! Assay CLI library
//!
//! Command-line front end for the Assay scenario engine: argument parsing,
//! console output and suite execution against the reference marketplace.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, FormatArg, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{device_table, ProgressReporter};
pub use runner::SuiteRunner;
