//! Suite execution for the `run` and `validate` commands

use std::path::Path;
use std::sync::Arc;

use assay::reporter::{render, write_report};
use assay::{
    Marketplace, ReportFormat, RunSummary, Scenario, ScenarioRunner, SettingsOverrides, Suite,
    ViewportSpec,
};

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;

/// Loads suites and runs them against the reference marketplace
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a new suite runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter = ProgressReporter::new(config.use_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Load and validate a suite without running it
    ///
    /// Returns the number of scenarios it declares.
    pub fn validate(&self, path: &Path) -> CliResult<usize> {
        let suite = Suite::from_path(path).map_err(|e| CliError::suite(path, e))?;
        let compiled = suite
            .validate(&Marketplace::new())
            .map_err(|e| CliError::suite(path, e))?;
        self.reporter.success(&format!(
            "{}: {} scenarios, {} baseline commands",
            suite.name,
            compiled.scenarios.len(),
            compiled.baseline.len()
        ));
        Ok(compiled.scenarios.len())
    }

    /// Run a suite and emit its report
    ///
    /// Fails with [`CliError::ScenariosFailed`] when any scenario failed.
    pub async fn run(&mut self, args: &RunArgs) -> CliResult<RunSummary> {
        let (runner, scenarios) = Self::prepare(args)?;
        let selected = runner.select(&scenarios).len();
        if selected == 0 {
            return Err(CliError::invalid_argument(format!(
                "no scenario matches filter `{}`",
                args.filter.as_deref().unwrap_or_default()
            )));
        }

        tracing::debug!(settings = ?runner.settings(), "effective settings");
        self.reporter.header(&format!("Running {}", runner.name()));
        self.reporter
            .start_progress(selected as u64, &args.suite.display().to_string());

        let reporter = &self.reporter;
        let summary = runner
            .run_with(&scenarios, |result| reporter.scenario_finished(result))
            .await;
        self.reporter.finish();

        self.emit(&summary, args)?;
        self.reporter.summary(&summary);

        if summary.all_passed() {
            Ok(summary)
        } else {
            Err(CliError::ScenariosFailed {
                failed: summary.failed_count(),
                total: summary.total(),
            })
        }
    }

    fn prepare(args: &RunArgs) -> CliResult<(ScenarioRunner, Vec<Scenario>)> {
        let path = args.suite.as_path();
        let mut suite = Suite::from_path(path).map_err(|e| CliError::suite(path, e))?;

        let overrides = SettingsOverrides {
            timeout_ms: args.timeout,
            poll_interval_ms: args.poll_interval,
            navigation_timeout_ms: None,
            parallel: args.parallel,
            fail_fast: args.fail_fast,
        };
        suite.settings = suite.settings.merged(&overrides);
        if let Some(viewport) = &args.viewport {
            suite.viewport = ViewportSpec::parse(viewport)
                .map_err(|e| CliError::invalid_argument(e.to_string()))?;
        }

        let (mut runner, scenarios) = suite
            .into_runner(Arc::new(Marketplace::new()))
            .map_err(|e| CliError::suite(path, e))?;
        if let Some(filter) = &args.filter {
            runner = runner.with_filter(filter.as_str());
        }
        Ok((runner, scenarios))
    }

    fn emit(&self, summary: &RunSummary, args: &RunArgs) -> CliResult<()> {
        let format = ReportFormat::from(args.format);
        if let Some(output) = &args.output {
            write_report(summary, format, output)
                .map_err(|e| CliError::report_generation(e.to_string()))?;
            self.reporter
                .info(&format!("report written to {}", output.display()));
            return Ok(());
        }
        // the live progress lines already cover the text report unless verbose
        if format == ReportFormat::Text && !self.config.verbosity.is_verbose() {
            return Ok(());
        }
        let report =
            render(summary, format).map_err(|e| CliError::report_generation(e.to_string()))?;
        print!("{report}");
        Ok(())
    }
}
