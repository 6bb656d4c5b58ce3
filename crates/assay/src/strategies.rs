//! Proptest strategies for locators, mock behaviors and retry configurations.
//!
//! ```rust,ignore
//! proptest! {
//!     #[test]
//!     fn prop_locator_display_reparses(expr in locator_expression()) {
//!         let locator = Locator::parse(&expr).unwrap();
//!         prop_assert_eq!(Locator::parse(&locator.to_string()).unwrap(), locator);
//!     }
//! }
//! ```

use proptest::prelude::*;
use serde_json::Value;
use std::time::Duration;

use crate::mock::Behavior;
use crate::retry::{CheckResult, RetryConfig};

/// A class or tag identifier
pub fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}"
}

/// One compound selector: `tag`, `.class`, `tag.class`, `#id`, `tag[attr="value"]`
pub fn compound_expression() -> impl Strategy<Value = String> {
    prop_oneof![
        identifier(),
        identifier().prop_map(|c| format!(".{c}")),
        (identifier(), identifier()).prop_map(|(t, c)| format!("{t}.{c}")),
        identifier().prop_map(|id| format!("#{id}")),
        (identifier(), identifier(), "[a-zA-Z0-9 :()/.'-]{0,12}")
            .prop_map(|(t, a, v)| format!("{t}[{a}=\"{v}\"]")),
    ]
}

/// Printable text for `:contains` filters, including quotes, brackets and backslashes
pub fn filter_text() -> impl Strategy<Value = String> {
    "[ -~]{0,24}"
}

/// A valid locator expression with an optional position filter
pub fn locator_expression() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(compound_expression(), 1..4),
        prop_oneof![
            Just(String::new()),
            Just(":first".to_string()),
            Just(":last".to_string()),
            (0usize..10).prop_map(|n| format!(":eq({n})")),
        ],
    )
        .prop_map(|(chain, position)| format!("{}{position}", chain.join(" ")))
}

/// Any mock behavior
pub fn behavior() -> impl Strategy<Value = Behavior> {
    prop_oneof![
        any::<i64>().prop_map(|n| Behavior::ResolvesWith(Value::from(n))),
        "[a-zA-Z ]{0,30}".prop_map(Behavior::RejectsWith),
        Just(Behavior::Delegate),
    ]
}

/// Retry configurations with a bounded timeout and a positive poll interval
pub fn retry_config() -> impl Strategy<Value = RetryConfig> {
    (0u64..10_000, 1u64..1_000, 0usize..20).prop_map(|(timeout, poll, retries)| {
        RetryConfig::new(Duration::from_millis(timeout))
            .with_poll_interval(Duration::from_millis(poll))
            .with_max_retries(retries)
    })
}

/// Failing checks, optionally followed by a pass
pub fn check_sequence() -> impl Strategy<Value = Vec<CheckResult>> {
    (0usize..30, any::<bool>()).prop_map(|(failures, passes)| {
        let mut results: Vec<CheckResult> = (0..failures)
            .map(|i| CheckResult::fail("visible", format!("hidden ({i})")))
            .collect();
        if passes {
            results.push(CheckResult::Pass);
        }
        results
    })
}
