//! Assay CLI: run scenario suites from the command line
//!
//! ## Usage
//!
//! ```bash
//! assay run scenarios/mobile_marketplace.yaml              # Run a suite
//! assay run suite.yaml --filter purchase --timeout 6000    # One scenario, longer waits
//! assay run suite.yaml --format junit --output report.xml  # CI report
//! assay validate suite.yaml                                # Check without running
//! assay devices                                            # List viewport presets
//! ```

use assay::DeviceRegistry;
use assay_cli::{
    device_table, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, SuiteRunner,
    Verbosity,
};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);
    console::set_colors_enabled_stderr(config.use_color());

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ScenariosFailed { .. }) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

/// `RUST_LOG` wins over `-v`
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity.is_verbose())
        .try_init();
}

fn run(cli: Cli, config: &CliConfig) -> CliResult<()> {
    match cli.command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            let mut runner = SuiteRunner::new(config.clone());
            runtime.block_on(runner.run(&args)).map(|_| ())
        }
        Commands::Validate(args) => SuiteRunner::new(config.clone())
            .validate(&args.suite)
            .map(|_| ()),
        Commands::Devices => {
            let registry = DeviceRegistry::new();
            print!("{}", device_table(registry.presets(), registry.aliases()));
            Ok(())
        }
    }
}
