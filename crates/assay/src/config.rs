//! Run settings.
//!
//! Loaded from a suite's `settings` block; unknown keys are rejected.
//! Command-line flags are applied on top with [`SettingsOverrides`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::{RetryConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::target::DEFAULT_NAVIGATION_TIMEOUT_MS;

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}

const fn default_parallel() -> usize {
    1
}

/// Engine settings for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Default assertion timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Polling interval of the retry engine
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Navigation timeout
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Stop after the first failed scenario
    #[serde(default)]
    pub fail_fast: bool,
    /// Maximum number of scenarios run concurrently
    #[serde(default = "default_parallel")]
    pub parallel: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            fail_fast: false,
            parallel: 1,
        }
    }
}

impl Settings {
    /// Retry configuration for assertions without an override
    #[must_use]
    pub const fn retry(&self) -> RetryConfig {
        RetryConfig::new(Duration::from_millis(self.timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    /// Navigation timeout
    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Apply overrides, keeping values that are not overridden
    #[must_use]
    pub fn merged(mut self, overrides: &SettingsOverrides) -> Self {
        if let Some(timeout) = overrides.timeout_ms {
            self.timeout_ms = timeout;
        }
        if let Some(poll) = overrides.poll_interval_ms {
            self.poll_interval_ms = poll;
        }
        if let Some(nav) = overrides.navigation_timeout_ms {
            self.navigation_timeout_ms = nav;
        }
        if let Some(parallel) = overrides.parallel {
            self.parallel = parallel;
        }
        self.fail_fast |= overrides.fail_fast;
        self.parallel = self.parallel.max(1);
        self
    }
}

/// Optional values layered on top of [`Settings`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Assertion timeout
    pub timeout_ms: Option<u64>,
    /// Polling interval
    pub poll_interval_ms: Option<u64>,
    /// Navigation timeout
    pub navigation_timeout_ms: Option<u64>,
    /// Concurrency
    pub parallel: Option<usize>,
    /// Force fail-fast
    pub fail_fast: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.retry(), RetryConfig::default());
        assert_eq!(settings.navigation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_block() {
        let settings: Settings = serde_yaml_ng::from_str("timeout_ms: 6000\nfail_fast: true\n").unwrap();
        assert_eq!(settings.timeout_ms, 6000);
        assert_eq!(settings.poll_interval_ms, 50);
        assert!(settings.fail_fast);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = serde_yaml_ng::from_str::<Settings>("retries: 3\n").unwrap_err();
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::default().merged(&SettingsOverrides {
            timeout_ms: Some(1000),
            parallel: Some(0),
            ..SettingsOverrides::default()
        });
        assert_eq!(settings.timeout_ms, 1000);
        assert_eq!(settings.poll_interval_ms, 50);
        assert_eq!(settings.parallel, 1);
        assert!(!settings.fail_fast);
    }
}
