//! Retry-Assertion Engine
//!
//! Polls a predicate until it holds or a deadline passes.
//!
//! [`RetryLoop`] is the pure state machine: feed it an observation and the
//! time it was made, get back an [`AssertionOutcome`]. [`wait_for`] drives it
//! with tokio timers, so tests can run under a paused clock.
//!
//! The final evaluation always happens at or after the deadline, never
//! before: a predicate that turns true exactly at the deadline is satisfied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::result::AssayError;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default assertion timeout (4 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 4_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// CHECK RESULTS
// =============================================================================

/// Expected vs actual, as observed by one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// What the predicate wanted
    pub expected: String,
    /// What was observed
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.actual)
    }
}

/// Result of one predicate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Predicate holds
    Pass,
    /// Predicate does not hold
    Fail(Mismatch),
}

impl CheckResult {
    /// Failed evaluation
    #[must_use]
    pub fn fail(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Fail(Mismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Check if the result is a pass
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Check if the result is a fail
    #[must_use]
    pub const fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total timeout duration
    pub timeout: Duration,
    /// Interval between retry attempts
    pub poll_interval: Duration,
    /// Maximum number of attempts (0 = unlimited within timeout)
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: 0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: 0,
        }
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set maximum attempts
    #[must_use]
    pub const fn with_max_retries(mut self, max: usize) -> Self {
        self.max_retries = max;
        self
    }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// State of a retrying assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionOutcome {
    /// Not yet decided; evaluate again at `next_poll`
    Pending {
        /// Evaluations so far
        attempts: usize,
        /// When to evaluate next
        next_poll: Instant,
    },
    /// The predicate held
    Satisfied {
        /// Evaluations including the passing one
        attempts: usize,
        /// Time from start to the passing evaluation
        elapsed: Duration,
    },
    /// The deadline passed without the predicate holding
    TimedOut {
        /// Evaluations made
        attempts: usize,
        /// Time from start to the final evaluation
        elapsed: Duration,
        /// Mismatch seen by the final evaluation
        last: Mismatch,
    },
}

impl AssertionOutcome {
    /// `Satisfied` or `TimedOut`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    /// Check if the outcome is `Satisfied`
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Number of evaluations so far
    #[must_use]
    pub const fn attempts(&self) -> usize {
        match self {
            Self::Pending { attempts, .. }
            | Self::Satisfied { attempts, .. }
            | Self::TimedOut { attempts, .. } => *attempts,
        }
    }
}

/// Pure polling state machine
#[derive(Debug, Clone)]
pub struct RetryLoop {
    config: RetryConfig,
    started: Instant,
    deadline: Instant,
    attempts: usize,
    terminal: Option<AssertionOutcome>,
}

impl RetryLoop {
    /// Start a loop at `now`
    #[must_use]
    pub fn start(config: RetryConfig, now: Instant) -> Self {
        Self {
            config,
            started: now,
            deadline: now + config.timeout,
            attempts: 0,
            terminal: None,
        }
    }

    /// The instant after which no further polls are scheduled
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record an evaluation made at `now`.
    ///
    /// Once terminal, further observations are ignored and the terminal
    /// outcome is returned again.
    pub fn observe(&mut self, now: Instant, result: CheckResult) -> AssertionOutcome {
        if let Some(terminal) = &self.terminal {
            return terminal.clone();
        }
        self.attempts += 1;
        let elapsed = now.saturating_duration_since(self.started);

        let outcome = match result {
            CheckResult::Pass => AssertionOutcome::Satisfied {
                attempts: self.attempts,
                elapsed,
            },
            CheckResult::Fail(last)
                if now >= self.deadline
                    || (self.config.max_retries > 0 && self.attempts >= self.config.max_retries) =>
            {
                AssertionOutcome::TimedOut {
                    attempts: self.attempts,
                    elapsed,
                    last,
                }
            }
            CheckResult::Fail(_) => {
                let interval = self.config.poll_interval.max(MIN_POLL_INTERVAL);
                return AssertionOutcome::Pending {
                    attempts: self.attempts,
                    next_poll: (now + interval).min(self.deadline),
                };
            }
        };
        self.terminal = Some(outcome.clone());
        outcome
    }
}

/// Evaluate `check` now and then every poll interval until it holds or times out
pub async fn wait_for<F>(config: &RetryConfig, mut check: F) -> AssertionOutcome
where
    F: FnMut() -> CheckResult,
{
    let mut state = RetryLoop::start(*config, Instant::now());
    loop {
        match state.observe(Instant::now(), check()) {
            AssertionOutcome::Pending { next_poll, .. } => tokio::time::sleep_until(next_poll).await,
            terminal => return terminal,
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// A described retry assertion
///
/// ## Example
///
/// ```ignore
/// let assertion = RetryAssertion::new(|| {
///     if handle.location().contains("/orders") {
///         CheckResult::Pass
///     } else {
///         CheckResult::fail("/orders", handle.location())
///     }
/// });
///
/// assertion.with_timeout(Duration::from_secs(10)).verify().await?;
/// ```
pub struct RetryAssertion<F>
where
    F: Fn() -> CheckResult,
{
    check: F,
    config: RetryConfig,
    description: Option<String>,
}

impl<F> RetryAssertion<F>
where
    F: Fn() -> CheckResult,
{
    /// Create a new retry assertion
    #[must_use]
    pub fn new(check: F) -> Self {
        Self {
            check,
            config: RetryConfig::default(),
            description: None,
        }
    }

    /// Set the timeout duration
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the maximum number of attempts
    #[must_use]
    pub const fn with_max_retries(mut self, max: usize) -> Self {
        self.config.max_retries = max;
        self
    }

    /// Set a description for the assertion
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the full config
    #[must_use]
    pub const fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the current config
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Verify the assertion, retrying until success or timeout
    pub async fn verify(&self) -> Result<RetryResult, RetryError> {
        match wait_for(&self.config, &self.check).await {
            AssertionOutcome::Satisfied { attempts, elapsed } => Ok(RetryResult {
                attempts,
                duration: elapsed,
            }),
            AssertionOutcome::TimedOut {
                attempts,
                elapsed,
                last,
            } => Err(RetryError {
                mismatch: last,
                attempts,
                duration: elapsed,
                description: self.description.clone(),
            }),
            AssertionOutcome::Pending { attempts, .. } => Err(RetryError {
                mismatch: Mismatch {
                    expected: "a terminal outcome".to_string(),
                    actual: "pending".to_string(),
                },
                attempts,
                duration: Duration::ZERO,
                description: self.description.clone(),
            }),
        }
    }

    /// Verify the assertion once without retrying
    pub fn verify_once(&self) -> Result<(), RetryError> {
        match (self.check)() {
            CheckResult::Pass => Ok(()),
            CheckResult::Fail(mismatch) => Err(RetryError {
                mismatch,
                attempts: 1,
                duration: Duration::ZERO,
                description: self.description.clone(),
            }),
        }
    }
}

impl<F> fmt::Debug for RetryAssertion<F>
where
    F: Fn() -> CheckResult,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAssertion")
            .field("config", &self.config)
            .field("description", &self.description)
            .finish()
    }
}

/// Result of a successful retry assertion
#[derive(Debug, Clone, Copy)]
pub struct RetryResult {
    /// Number of attempts before success
    pub attempts: usize,
    /// Time until the passing evaluation
    pub duration: Duration,
}

/// Error when a retry assertion fails
#[derive(Debug, Clone)]
pub struct RetryError {
    /// Last observed mismatch
    pub mismatch: Mismatch,
    /// Number of attempts made
    pub attempts: usize,
    /// Time until the final evaluation
    pub duration: Duration,
    /// Description of the assertion
    pub description: Option<String>,
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref desc) = self.description {
            write!(f, "{desc}: ")?;
        }
        write!(
            f,
            "assertion failed after {} attempt(s) ({:.2}s): {}",
            self.attempts,
            self.duration.as_secs_f64(),
            self.mismatch
        )
    }
}

impl std::error::Error for RetryError {}

impl From<RetryError> for AssayError {
    fn from(err: RetryError) -> Self {
        Self::AssertionTimeout {
            description: err.description.unwrap_or_else(|| "assertion".to_string()),
            expected: err.mismatch.expected,
            actual: err.mismatch.actual,
            attempts: err.attempts,
            elapsed: err.duration,
        }
    }
}

// ============================================================================
// Builder helpers for common assertion patterns
// ============================================================================

/// Retry until `get_actual()` equals `expected`
pub fn retry_eq<T: PartialEq + fmt::Debug + 'static>(
    get_actual: impl Fn() -> T + 'static,
    expected: T,
) -> RetryAssertion<impl Fn() -> CheckResult> {
    RetryAssertion::new(move || {
        let actual = get_actual();
        if actual == expected {
            CheckResult::Pass
        } else {
            CheckResult::fail(format!("{expected:?}"), format!("{actual:?}"))
        }
    })
}

/// Retry until `check()` is true
pub fn retry_true(
    check: impl Fn() -> bool + 'static,
    expected: impl Into<String>,
) -> RetryAssertion<impl Fn() -> CheckResult> {
    let expected = expected.into();
    RetryAssertion::new(move || {
        if check() {
            CheckResult::Pass
        } else {
            CheckResult::fail(expected.clone(), "false")
        }
    })
}

/// Retry until the haystack contains `needle`
pub fn retry_contains(
    get_haystack: impl Fn() -> String + 'static,
    needle: impl Into<String>,
) -> RetryAssertion<impl Fn() -> CheckResult> {
    let needle = needle.into();
    RetryAssertion::new(move || {
        let haystack = get_haystack();
        if haystack.contains(&needle) {
            CheckResult::Pass
        } else {
            CheckResult::fail(format!("to contain {needle:?}"), format!("{haystack:?}"))
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Drive a loop with a simulated clock; the predicate flips to true at `flip`
    fn simulate(config: RetryConfig, flip: Option<Duration>) -> AssertionOutcome {
        let t0 = Instant::now();
        let mut state = RetryLoop::start(config, t0);
        let mut now = t0;
        loop {
            let passing = flip.is_some_and(|f| now.duration_since(t0) >= f);
            let result = if passing {
                CheckResult::Pass
            } else {
                CheckResult::fail("visible", "hidden")
            };
            match state.observe(now, result) {
                AssertionOutcome::Pending { next_poll, .. } => {
                    assert!(next_poll > now);
                    now = next_poll;
                }
                terminal => return terminal,
            }
        }
    }

    mod config {
        use super::*;

        #[test]
        fn test_default() {
            let config = RetryConfig::default();
            assert_eq!(config.timeout, ms(4000));
            assert_eq!(config.poll_interval, ms(50));
            assert_eq!(config.max_retries, 0);
        }

        #[test]
        fn test_builder() {
            let config = RetryConfig::new(ms(10_000))
                .with_poll_interval(ms(20))
                .with_max_retries(3);
            assert_eq!(config.timeout, ms(10_000));
            assert_eq!(config.poll_interval, ms(20));
            assert_eq!(config.max_retries, 3);
        }
    }

    mod state_machine {
        use super::*;

        #[test]
        fn test_already_true_is_one_attempt() {
            let outcome = simulate(RetryConfig::default(), Some(Duration::ZERO));
            assert_eq!(
                outcome,
                AssertionOutcome::Satisfied {
                    attempts: 1,
                    elapsed: Duration::ZERO
                }
            );
        }

        #[test]
        fn test_never_true_times_out_at_deadline() {
            let outcome = simulate(RetryConfig::default(), None);
            let AssertionOutcome::TimedOut {
                attempts,
                elapsed,
                last,
            } = outcome
            else {
                panic!("expected timeout");
            };
            assert_eq!(elapsed, ms(4000));
            assert_eq!(attempts, 81);
            assert_eq!(last.actual, "hidden");
        }

        #[test]
        fn test_true_exactly_at_deadline_is_satisfied() {
            let config = RetryConfig::new(ms(4010));
            let outcome = simulate(config, Some(ms(4010)));
            assert!(outcome.is_satisfied());
        }

        #[test]
        fn test_zero_timeout_evaluates_once() {
            let outcome = simulate(RetryConfig::new(Duration::ZERO), None);
            assert_eq!(outcome.attempts(), 1);
            assert!(outcome.is_terminal());
        }

        #[test]
        fn test_max_retries_stops_early() {
            let config = RetryConfig::default().with_max_retries(3);
            let outcome = simulate(config, None);
            assert!(matches!(outcome, AssertionOutcome::TimedOut { attempts: 3, .. }));
        }

        #[test]
        fn test_late_transition_is_ignored() {
            let t0 = Instant::now();
            let mut state = RetryLoop::start(RetryConfig::new(Duration::ZERO), t0);
            let first = state.observe(t0, CheckResult::fail("a", "b"));
            let again = state.observe(t0 + ms(5), CheckResult::Pass);
            assert_eq!(first, again);
        }
    }

    mod driver {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_wait_for_eventually_passes() {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = calls.clone();
            let start = Instant::now();
            let outcome = wait_for(&RetryConfig::default(), move || {
                if counter.fetch_add(1, Ordering::SeqCst) >= 3 {
                    CheckResult::Pass
                } else {
                    CheckResult::fail("ready", "loading")
                }
            })
            .await;
            assert!(matches!(outcome, AssertionOutcome::Satisfied { attempts: 4, .. }));
            assert!(start.elapsed() >= ms(150));
            assert!(start.elapsed() < ms(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_for_times_out_no_earlier_than_timeout() {
            let start = Instant::now();
            let outcome = wait_for(&RetryConfig::new(ms(300)), || CheckResult::fail("x", "y")).await;
            assert!(matches!(outcome, AssertionOutcome::TimedOut { .. }));
            assert!(start.elapsed() >= ms(300));
        }
    }

    mod builder {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_verify_error_carries_description() {
            let err = retry_eq(|| 1, 2)
                .with_timeout(ms(100))
                .with_description("counter")
                .verify()
                .await
                .unwrap_err();
            assert!(err.to_string().starts_with("counter: "));
            assert_eq!(err.mismatch.expected, "2");

            let err: AssayError = err.into();
            assert_eq!(err.kind(), "assertion_timeout");
        }

        #[test]
        fn test_verify_once() {
            assert!(retry_true(|| true, "ok").verify_once().is_ok());
            let err = retry_contains(|| "Buy".to_string(), "Buy Now")
                .verify_once()
                .unwrap_err();
            assert_eq!(err.attempts, 1);
        }
    }

    proptest! {
        #[test]
        fn prop_timeout_never_before_deadline(timeout in 0u64..5_000, poll in 1u64..500) {
            let config = RetryConfig::new(ms(timeout)).with_poll_interval(ms(poll));
            match simulate(config, None) {
                AssertionOutcome::TimedOut { elapsed, .. } => prop_assert_eq!(elapsed, ms(timeout)),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_flip_within_timeout_is_satisfied(timeout in 0u64..5_000, poll in 1u64..500, frac in 0.0f64..=1.0) {
            let flip = ms((timeout as f64 * frac) as u64);
            let config = RetryConfig::new(ms(timeout)).with_poll_interval(ms(poll));
            let outcome = simulate(config, Some(flip));
            let AssertionOutcome::Satisfied { elapsed, .. } = outcome else {
                return Err(TestCaseError::fail("expected satisfied"));
            };
            prop_assert!(elapsed >= flip);
            prop_assert!(elapsed < flip + ms(poll) || elapsed == ms(timeout));
        }
    }
}
