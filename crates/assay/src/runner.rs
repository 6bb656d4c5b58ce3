//! Scenario Runner
//!
//! Runs scenarios in isolation. For each scenario: reset the handle, install
//! suite mocks and then scenario mocks, navigate to the base URL, run the
//! baseline, run the body, reset again. A failure is recorded and the next
//! scenario still runs unless fail-fast is on.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::command::Command;
use crate::config::Settings;
use crate::mock::{BehaviorTable, MockTables};
use crate::queue::{CommandFailure, CommandQueue, Phase, QueueOutcome, StepTrace};
use crate::result::AssayError;
use crate::target::{Application, TargetHandle};
use crate::viewport::ViewportSpec;

// =============================================================================
// SCENARIOS
// =============================================================================

/// A named, isolated sequence of commands
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Body commands
    pub commands: Vec<Command>,
    /// Mocks installed after the suite mocks
    pub mocks: MockTables,
    /// Do not run the suite baseline
    pub skip_baseline: bool,
}

impl Scenario {
    /// Create an empty scenario
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            mocks: MockTables::new(),
            skip_baseline: false,
        }
    }

    /// Append a command
    #[must_use]
    pub fn then(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Install behaviors for `capability` before the scenario starts
    #[must_use]
    pub fn with_mock(mut self, capability: impl Into<String>, table: BehaviorTable) -> Self {
        self.mocks.entry(capability.into()).or_default().extend(table);
        self
    }

    /// Opt out of the suite baseline
    #[must_use]
    pub const fn without_baseline(mut self) -> Self {
        self.skip_baseline = true;
        self
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Scenario outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every command succeeded
    Passed,
    /// A command failed
    Failed,
    /// Not run (fail-fast)
    Skipped,
}

impl Outcome {
    /// Check if outcome is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if outcome is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Part of the scenario lifecycle a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Mock installation or the initial navigation
    Setup,
    /// Suite baseline commands
    Baseline,
    /// Scenario commands
    Body,
}

/// Diagnostics of the first failure in a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Lifecycle stage
    pub stage: Stage,
    /// Index of the failed command within its stage
    pub command_index: usize,
    /// Stage of the command that failed
    pub phase: Phase,
    /// Rendered command
    pub command: String,
    /// Locator, when the command targets an element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Expected value (assertion and actionability failures)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Last observed value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Time spent on the failed command
    pub elapsed_ms: u64,
    /// Error class
    pub error: String,
    /// Full error message
    pub message: String,
}

impl FailureDetail {
    fn from_command(stage: Stage, index: usize, command: &Command, reason: &CommandFailure) -> Self {
        let (expected, actual) = match &reason.error {
            AssayError::AssertionTimeout {
                expected, actual, ..
            } => (Some(expected.clone()), Some(actual.clone())),
            _ => (None, None),
        };
        Self {
            stage,
            command_index: index,
            phase: reason.phase,
            command: command.to_string(),
            locator: command.locator().map(ToString::to_string),
            expected,
            actual,
            elapsed_ms: reason.elapsed.as_millis() as u64,
            error: reason.error.kind().to_string(),
            message: reason.error.to_string(),
        }
    }

    fn setup(phase: Phase, command: impl Into<String>, error: &AssayError) -> Self {
        Self {
            stage: Stage::Setup,
            command_index: 0,
            phase,
            command: command.into(),
            locator: None,
            expected: None,
            actual: None,
            elapsed_ms: 0,
            error: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Outcome
    pub outcome: Outcome,
    /// First failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    /// Wall time
    pub duration_ms: u64,
    /// Per-command timings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<StepTrace>,
}

impl ScenarioResult {
    fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Skipped,
            failure: None,
            duration_ms: 0,
            trace: Vec::new(),
        }
    }
}

/// Results of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Suite name
    pub suite: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall time
    pub duration_ms: u64,
    /// One result per scenario, in script order
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    /// Check if no scenario failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failed())
    }

    /// Count passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(Outcome::Passed)
    }

    /// Count failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// Count skipped scenarios
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Total number of scenarios
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Failed scenarios
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|r| r.outcome.is_failed()).collect()
    }

    /// Result for a scenario by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScenarioResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Process exit status: non-zero if any scenario failed
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} passed, {} failed, {} skipped ({} total)",
            self.suite,
            self.passed_count(),
            self.failed_count(),
            self.skipped_count(),
            self.total()
        )
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runs scenarios against fresh handles of one application
pub struct ScenarioRunner {
    app: Arc<dyn Application>,
    name: String,
    base_url: String,
    viewport: ViewportSpec,
    settings: Settings,
    mocks: MockTables,
    baseline: Vec<Command>,
    filter: Option<String>,
}

impl fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("app", &self.app.name())
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("viewport", &self.viewport)
            .field("settings", &self.settings)
            .field("baseline", &self.baseline.len())
            .field("filter", &self.filter)
            .finish()
    }
}

impl ScenarioRunner {
    /// Create a runner for `app` rooted at `base_url`
    #[must_use]
    pub fn new(app: Arc<dyn Application>, base_url: impl Into<String>) -> Self {
        let name = app.name().to_string();
        Self {
            app,
            name,
            base_url: base_url.into(),
            viewport: ViewportSpec::default(),
            settings: Settings::default(),
            mocks: MockTables::new(),
            baseline: Vec::new(),
            filter: None,
        }
    }

    /// Set the suite name used in reports
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the viewport every scenario starts with
    #[must_use]
    pub fn with_viewport(mut self, viewport: ViewportSpec) -> Self {
        self.viewport = viewport;
        self
    }

    /// Set engine settings
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Mocks installed before every scenario
    #[must_use]
    pub fn with_mocks(mut self, mocks: MockTables) -> Self {
        self.mocks = mocks;
        self
    }

    /// Commands run after the initial navigation of every scenario
    #[must_use]
    pub fn with_baseline(mut self, baseline: Vec<Command>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Only run scenarios whose name contains `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Stop after the first failed scenario
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.settings.fail_fast = fail_fast;
        self
    }

    /// Run up to `n` scenarios concurrently
    #[must_use]
    pub fn with_parallel(mut self, n: usize) -> Self {
        self.settings.parallel = n.max(1);
        self
    }

    /// Effective settings
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scenarios selected by the filter
    #[must_use]
    pub fn select<'a>(&self, scenarios: &'a [Scenario]) -> Vec<&'a Scenario> {
        scenarios
            .iter()
            .filter(|s| self.filter.as_ref().map_or(true, |f| s.name.contains(f.as_str())))
            .collect()
    }

    /// Create a handle configured like the ones scenarios run on
    #[must_use]
    pub fn handle(&self) -> TargetHandle {
        TargetHandle::new(Arc::clone(&self.app), &self.base_url)
            .with_navigation_timeout(self.settings.navigation_timeout())
            .with_viewport(self.viewport.viewport())
    }

    /// Run every selected scenario
    pub async fn run(&self, scenarios: &[Scenario]) -> RunSummary {
        self.run_with(scenarios, |_| {}).await
    }

    /// Run every selected scenario, reporting each result as it completes
    pub async fn run_with(
        &self,
        scenarios: &[Scenario],
        mut on_result: impl FnMut(&ScenarioResult),
    ) -> RunSummary {
        let started_at = Utc::now();
        let start = Instant::now();
        let selected = self.select(scenarios);
        let stop = AtomicBool::new(false);
        tracing::info!(
            suite = %self.name,
            scenarios = selected.len(),
            parallel = self.settings.parallel,
            "starting run"
        );

        let stop = &stop;
        let mut results = stream::iter(selected)
            .map(|scenario| async move {
                if stop.load(Ordering::SeqCst) {
                    return ScenarioResult::skipped(&scenario.name);
                }
                let result = self.run_scenario(scenario).await;
                if result.outcome.is_failed() && self.settings.fail_fast {
                    stop.store(true, Ordering::SeqCst);
                }
                result
            })
            .buffered(self.settings.parallel.max(1));

        let mut collected = Vec::new();
        while let Some(result) = results.next().await {
            on_result(&result);
            collected.push(result);
        }

        let summary = RunSummary {
            suite: self.name.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results: collected,
        };
        tracing::info!(summary = %summary.summary(), "run finished");
        summary
    }

    /// Run one scenario on a fresh handle
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let handle = self.handle();
        self.run_scenario_on(&handle, scenario).await
    }

    /// Run one scenario on `handle`, resetting it before and after
    pub async fn run_scenario_on(&self, handle: &TargetHandle, scenario: &Scenario) -> ScenarioResult {
        let span = tracing::info_span!("scenario", name = %scenario.name);
        async {
            let start = Instant::now();
            handle.reset(self.viewport.viewport());
            let mut trace = Vec::new();
            let failure = self.execute(handle, scenario, &mut trace).await;
            handle.reset(self.viewport.viewport());

            let outcome = if failure.is_some() {
                Outcome::Failed
            } else {
                Outcome::Passed
            };
            match &failure {
                Some(detail) => tracing::warn!(
                    stage = ?detail.stage,
                    index = detail.command_index,
                    message = %detail.message,
                    "scenario failed"
                ),
                None => tracing::info!("scenario passed"),
            }
            ScenarioResult {
                name: scenario.name.clone(),
                outcome,
                failure,
                duration_ms: start.elapsed().as_millis() as u64,
                trace,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        handle: &TargetHandle,
        scenario: &Scenario,
        trace: &mut Vec<StepTrace>,
    ) -> Option<FailureDetail> {
        for tables in [&self.mocks, &scenario.mocks] {
            if let Err(error) = handle.mocks().install_all(tables) {
                return Some(FailureDetail::setup(Phase::Configuration, "install mocks", &error));
            }
        }
        if let Err(error) = handle.navigate("/").await {
            return Some(FailureDetail::setup(Phase::Navigation, "navigate /", &error));
        }

        let retry = self.settings.retry();
        let baseline: &[Command] = if scenario.skip_baseline {
            &[]
        } else {
            &self.baseline
        };
        for (stage, commands) in [(Stage::Baseline, baseline), (Stage::Body, &scenario.commands[..])] {
            let mut queue = CommandQueue::new();
            for command in commands {
                queue.enqueue(command.clone());
            }
            let outcome = queue.run(handle, &retry).await;
            trace.extend_from_slice(queue.trace());
            if let QueueOutcome::FailedAt {
                index,
                command,
                reason,
            } = outcome
            {
                return Some(FailureDetail::from_command(stage, index, &command, &reason));
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, NodeId};
    use crate::event::DomEvent;
    use crate::expect::Expectation;
    use crate::locator::Locator;
    use crate::mock::{behaviors, Behavior, CapabilityDescriptor};
    use crate::target::Page;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    /// Clicking `#connect` calls wallet.connect and renders the outcome
    struct WalletPage;

    #[async_trait]
    impl Application for WalletPage {
        fn name(&self) -> &str {
            "wallet-page"
        }

        fn capabilities(&self) -> Vec<CapabilityDescriptor> {
            vec![CapabilityDescriptor::new("wallet", ["connect"])]
        }

        async fn load(&self, page: &Page) -> Result<(), String> {
            page.with_document(|doc| {
                doc.append(NodeId::ROOT, ElementSpec::new("button").id("connect"));
            });
            Ok(())
        }

        fn on_event(&self, page: &Page, _target: NodeId, event: &DomEvent) {
            if event.name != "click" {
                return;
            }
            let task_page = page.clone();
            page.spawn(async move {
                let text = match task_page.capability("wallet").call("connect", Value::Null).await {
                    Ok(value) => format!("connected {}", value["publicKey"].as_str().unwrap_or("")),
                    Err(err) => format!("error {err}"),
                };
                task_page.with_document(|doc| {
                    doc.append(NodeId::ROOT, ElementSpec::new("p").class("status").text(text));
                });
            });
        }
    }

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(Arc::new(WalletPage), "http://localhost:3000")
    }

    fn status(text: &str) -> Command {
        Command::assert(
            Locator::parse(".status").unwrap(),
            Expectation::ContainsText(text.into()),
        )
        .with_timeout(Duration::from_millis(200))
    }

    fn connect() -> Command {
        Command::click(Locator::parse("#connect").unwrap())
    }

    fn ok_wallet() -> BehaviorTable {
        behaviors([("connect", Behavior::resolves_with(serde_json::json!({"publicKey": "abc"})))])
    }

    mod isolation {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_mocks_do_not_leak_between_scenarios() {
            let scenarios = vec![
                Scenario::new("mocked")
                    .with_mock("wallet", ok_wallet())
                    .then(connect())
                    .then(status("connected abc")),
                Scenario::new("unmocked").then(connect()).then(status("unavailable")),
            ];
            let summary = runner().run(&scenarios).await;
            assert!(summary.all_passed(), "{summary:#?}");
        }

        #[tokio::test(start_paused = true)]
        async fn test_shared_handle_is_reset() {
            let runner = runner();
            let handle = runner.handle();
            let first = Scenario::new("a").with_mock("wallet", ok_wallet()).then(connect());
            let result = runner.run_scenario_on(&handle, &first).await;
            assert!(result.outcome.is_passed());
            assert!(!handle.mocks().is_installed("wallet"));
            assert_eq!(handle.location(), crate::target::BLANK);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failure_does_not_affect_next_scenario() {
            let scenarios = vec![
                Scenario::new("broken")
                    .with_mock("wallet", ok_wallet())
                    .then(connect())
                    .then(status("never shown"))
                    .then(connect()),
                Scenario::new("healthy")
                    .with_mock("wallet", ok_wallet())
                    .then(connect())
                    .then(status("connected")),
            ];
            let summary = runner().run(&scenarios).await;
            assert_eq!(summary.failed_count(), 1);
            assert_eq!(summary.passed_count(), 1);
            let failure = summary.results[0].failure.as_ref().unwrap();
            assert_eq!(failure.stage, Stage::Body);
            assert_eq!(failure.command_index, 1);
            assert_eq!(failure.locator.as_deref(), Some(".status"));
            assert!(failure.actual.as_deref().unwrap().contains("connected abc"));
            assert!(failure.elapsed_ms >= 200);
            assert_eq!(summary.exit_code(), 1);
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_baseline_runs_unless_skipped() {
            let runner = runner()
                .with_mocks(MockTables::from([("wallet".to_string(), ok_wallet())]))
                .with_baseline(vec![connect()]);
            let scenarios = vec![
                Scenario::new("with baseline").then(status("connected")),
                Scenario::new("without baseline")
                    .without_baseline()
                    .then(Command::assert(Locator::parse(".status").unwrap(), Expectation::Absent)),
            ];
            let summary = runner.run(&scenarios).await;
            assert!(summary.all_passed(), "{summary:#?}");
            assert_eq!(summary.results[0].trace.len(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_invalid_scenario_mock_is_a_setup_failure() {
            let scenarios = vec![Scenario::new("bad")
                .with_mock("wallet", behaviors([("teleport", Behavior::Delegate)]))];
            let summary = runner().run(&scenarios).await;
            let failure = summary.results[0].failure.as_ref().unwrap();
            assert_eq!(failure.stage, Stage::Setup);
            assert_eq!(failure.error, "mock_configuration_error");
        }
    }

    mod scheduling {
        use super::*;

        fn failing(name: &str) -> Scenario {
            Scenario::new(name).then(status("nope"))
        }

        #[tokio::test(start_paused = true)]
        async fn test_fail_fast_skips_remaining() {
            let scenarios = vec![
                failing("one"),
                Scenario::new("two"),
                Scenario::new("three"),
            ];
            let summary = runner().with_fail_fast(true).run(&scenarios).await;
            let outcomes: Vec<_> = summary.results.iter().map(|r| r.outcome).collect();
            assert_eq!(outcomes, [Outcome::Failed, Outcome::Skipped, Outcome::Skipped]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_parallel_keeps_script_order() {
            let scenarios: Vec<_> = (0..6)
                .map(|i| {
                    Scenario::new(format!("s{i}"))
                        .with_mock("wallet", ok_wallet())
                        .then(connect())
                        .then(status("connected"))
                })
                .collect();
            let mut seen = Vec::new();
            let summary = runner()
                .with_parallel(3)
                .run_with(&scenarios, |r| seen.push(r.name.clone()))
                .await;
            assert!(summary.all_passed());
            let names: Vec<_> = summary.results.iter().map(|r| r.name.clone()).collect();
            assert_eq!(names, ["s0", "s1", "s2", "s3", "s4", "s5"]);
            assert_eq!(seen, names);
        }

        #[tokio::test(start_paused = true)]
        async fn test_filter() {
            let scenarios = vec![Scenario::new("wallet connect"), Scenario::new("search")];
            let summary = runner().with_filter("wallet").run(&scenarios).await;
            assert_eq!(summary.total(), 1);
            assert!(summary.get("wallet connect").is_some());
        }
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = RunSummary {
            suite: "s".into(),
            started_at: Utc::now(),
            duration_ms: 5,
            results: vec![ScenarioResult::skipped("x")],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"][0]["outcome"], "skipped");
        assert!(json["results"][0].get("failure").is_none());
        assert_eq!(summary.exit_code(), 0);
    }
}
