//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ColorChoice;

/// Assay: run scenario suites against a retrying command queue
#[derive(Parser, Debug)]
#[command(name = "assay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario suite against the reference marketplace
    Run(RunArgs),

    /// Parse a suite and check its mocks without running it
    Validate(ValidateArgs),

    /// List viewport presets
    Devices,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite file (.yaml, .yml or .json)
    pub suite: PathBuf,

    /// Only run scenarios whose name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Default assertion timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Polling interval in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Viewport preset or WIDTHxHEIGHT, replacing the suite's
    #[arg(long)]
    pub viewport: Option<String>,

    /// Number of scenarios run concurrently
    #[arg(short = 'j', long)]
    pub parallel: Option<usize>,

    /// Stop after the first failed scenario
    #[arg(long)]
    pub fail_fast: bool,

    /// Report format
    #[arg(long, default_value = "text")]
    pub format: FormatArg,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Suite file (.yaml, .yml or .json)
    pub suite: PathBuf,
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON run summary
    Json,
    /// `JUnit` XML
    Junit,
}

impl From<FormatArg> for assay::ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Junit => Self::Junit,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Detect from the terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
