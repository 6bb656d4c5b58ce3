//! Command Queue
//!
//! Executes commands against one [`TargetHandle`] strictly in FIFO order.
//! A command starts only after the previous one has fully resolved, and the
//! first failure stops the queue.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::command::{Command, Step};
use crate::dom::ElementRef;
use crate::event::Action;
use crate::expect::Expectation;
use crate::locator::Locator;
use crate::result::{AssayError, AssayResult};
use crate::retry::{wait_for, AssertionOutcome, CheckResult, RetryConfig};
use crate::target::TargetHandle;

/// Stage of a command that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Loading a page
    Navigation,
    /// Waiting for the target element to become actionable
    Actionability,
    /// Delivering events
    Dispatch,
    /// Waiting for an assertion
    Assertion,
    /// Installing mocks or changing the viewport
    Configuration,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Navigation => "navigation",
            Self::Actionability => "actionability",
            Self::Dispatch => "dispatch",
            Self::Assertion => "assertion",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Why a command failed
#[derive(Debug)]
pub struct CommandFailure {
    /// Where in the command it failed
    pub phase: Phase,
    /// The error
    pub error: AssayError,
    /// Time spent on the command
    pub elapsed: Duration,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)
    }
}

/// Result of running a queue
#[derive(Debug)]
pub enum QueueOutcome {
    /// Every command succeeded
    Completed,
    /// The command at `index` failed; later commands were not run
    FailedAt {
        /// Zero-based command index
        index: usize,
        /// The failed command
        command: Command,
        /// What went wrong
        reason: CommandFailure,
    },
}

impl QueueOutcome {
    /// Check if every command succeeded
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Timing of one executed command, relative to the start of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTrace {
    /// Zero-based command index
    pub index: usize,
    /// Rendered command
    pub command: String,
    /// Offset at which the command started
    pub started: Duration,
    /// Offset at which the command resolved
    pub finished: Duration,
    /// Predicate evaluations (0 for commands that do not wait)
    pub attempts: usize,
    /// Whether the command succeeded
    pub ok: bool,
}

/// Ordered, single-owner command queue
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    executed: usize,
    trace: Vec<StepTrace>,
}

impl CommandQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Commands not yet run
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no commands are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Timings of executed commands, in execution order
    #[must_use]
    pub fn trace(&self) -> &[StepTrace] {
        &self.trace
    }

    /// Run pending commands in order until one fails.
    ///
    /// Indices continue across calls, so a queue can be filled and run in
    /// several batches. Commands after a failure stay pending.
    pub async fn run(&mut self, target: &TargetHandle, retry: &RetryConfig) -> QueueOutcome {
        let origin = Instant::now();
        while let Some(command) = self.pending.pop_front() {
            let index = self.executed;
            self.executed += 1;
            let started = Instant::now();
            let span = tracing::debug_span!("command", index, kind = %command.kind());
            let result = execute(target, &command, retry).instrument(span).await;
            let finished = Instant::now();

            let (attempts, failure) = match result {
                Ok(attempts) => (attempts, None),
                Err((phase, error, attempts)) => (
                    attempts,
                    Some(CommandFailure {
                        phase,
                        error,
                        elapsed: finished - started,
                    }),
                ),
            };
            self.trace.push(StepTrace {
                index,
                command: command.to_string(),
                started: started - origin,
                finished: finished - origin,
                attempts,
                ok: failure.is_none(),
            });

            if let Some(reason) = failure {
                tracing::debug!(index, %command, %reason, "command failed");
                return QueueOutcome::FailedAt {
                    index,
                    command,
                    reason,
                };
            }
            tracing::trace!(index, %command, attempts, "command resolved");
        }
        QueueOutcome::Completed
    }
}

type StepResult = Result<usize, (Phase, AssayError, usize)>;

async fn execute(target: &TargetHandle, command: &Command, retry: &RetryConfig) -> StepResult {
    let config = command
        .timeout()
        .map_or(*retry, |timeout| retry.with_timeout(timeout));
    let fail = |phase: Phase| move |error: AssayError| (phase, error, 0);

    match command.step() {
        Step::Navigate { url } => target
            .navigate(url)
            .await
            .map(|()| 0)
            .map_err(fail(Phase::Navigation)),
        Step::Reload => target.reload().await.map(|()| 0).map_err(fail(Phase::Navigation)),
        Step::Find { locator } => {
            assert_with(target, Some(locator), &Expectation::Exists, &config)
                .await
                .map_err(|(error, attempts)| (Phase::Actionability, error, attempts))
        }
        Step::Act { locator, actions } => {
            let (element, attempts) = actionable(target, locator, &config)
                .await
                .map_err(|(error, attempts)| (Phase::Actionability, error, attempts))?;
            dispatch(target, &element, actions).map_err(|error| (Phase::Dispatch, error, attempts))?;
            Ok(attempts)
        }
        Step::Scroll(to) => {
            let position = target.scroll(*to);
            tracing::debug!(y = position.y, at_bottom = position.at_bottom, "scrolled");
            Ok(0)
        }
        Step::Assert {
            locator,
            expectation,
        } => assert_with(target, locator.as_ref(), expectation, &config)
            .await
            .map_err(|(error, attempts)| (Phase::Assertion, error, attempts)),
        Step::Viewport(spec) => {
            target.set_viewport(spec.viewport());
            Ok(0)
        }
        Step::Mock(tables) => target
            .mocks()
            .install_all(tables)
            .map(|()| 0)
            .map_err(fail(Phase::Configuration)),
        Step::Restore { capability } => {
            if !target.mocks().known().contains(capability) {
                return Err((
                    Phase::Configuration,
                    AssayError::mock_configuration(capability.as_str(), "unknown capability"),
                    0,
                ));
            }
            let _ = target.mocks().restore(capability);
            Ok(0)
        }
    }
}

fn dispatch(target: &TargetHandle, element: &ElementRef, actions: &[Action]) -> AssayResult<()> {
    for action in actions {
        target.mutate(element, action)?;
    }
    Ok(())
}

/// Wait until `locator` resolves to exactly one visible element
async fn actionable(
    target: &TargetHandle,
    locator: &Locator,
    config: &RetryConfig,
) -> Result<(ElementRef, usize), (AssayError, usize)> {
    let mut found = None;
    let outcome = wait_for(config, || {
        let matches = target.query(locator);
        match matches.as_slice() {
            [] => CheckResult::fail("an actionable element", "no matching element"),
            [only] => {
                if target.page().with_document(|doc| doc.is_visible(only.node())) {
                    found = Some(only.clone());
                    CheckResult::Pass
                } else {
                    CheckResult::fail("an actionable element", "hidden")
                }
            }
            many => CheckResult::fail(
                "exactly one element",
                format!("{} elements (add :first, :last or :eq(n))", many.len()),
            ),
        }
    })
    .await;

    match (outcome, found) {
        (AssertionOutcome::Satisfied { attempts, .. }, Some(element)) => Ok((element, attempts)),
        (outcome, _) => Err(timeout_error(
            format!("`{locator}` to be actionable"),
            outcome,
        )),
    }
}

async fn assert_with(
    target: &TargetHandle,
    locator: Option<&Locator>,
    expectation: &Expectation,
    config: &RetryConfig,
) -> Result<usize, (AssayError, usize)> {
    match wait_for(config, || expectation.check(target, locator)).await {
        AssertionOutcome::Satisfied { attempts, .. } => Ok(attempts),
        outcome => Err(timeout_error(expectation.describe(locator), outcome)),
    }
}

fn timeout_error(description: String, outcome: AssertionOutcome) -> (AssayError, usize) {
    let attempts = outcome.attempts();
    let (expected, actual, elapsed) = match outcome {
        AssertionOutcome::TimedOut { last, elapsed, .. } => (last.expected, last.actual, elapsed),
        _ => (
            "a terminal outcome".to_string(),
            "pending".to_string(),
            Duration::ZERO,
        ),
    };
    (
        AssayError::AssertionTimeout {
            description,
            expected,
            actual,
            attempts,
            elapsed,
        },
        attempts,
    )
}
