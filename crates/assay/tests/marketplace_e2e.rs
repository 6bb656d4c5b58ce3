//! End-to-end tests against the marketplace sandbox.
//!
//! All tests run on a paused tokio clock, so multi-second timeouts complete
//! instantly while keeping their ordering.

#![cfg(feature = "sandbox")]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assay::prelude::*;
use assay::reporter::render_text;
use assay::sandbox::{Marketplace, SandboxTiming, WALLET, WALLET_ERROR};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn suite_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/mobile_marketplace.yaml")
}

fn loc(expression: &str) -> Locator {
    Locator::parse(expression).expect("valid locator")
}

fn button(text: &str) -> Locator {
    loc("button").with_text(text)
}

fn wallet_mocks() -> MockTables {
    let mut mocks = MockTables::new();
    let _ = mocks.insert(
        WALLET.to_string(),
        behaviors([
            ("connect", Behavior::resolves_with(json!({ "publicKey": "mockWalletAddress123" }))),
            ("signTransaction", Behavior::resolves_with(json!({ "signature": "mockSignature" }))),
        ]),
    );
    mocks
}

fn runner() -> ScenarioRunner {
    ScenarioRunner::new(Arc::new(Marketplace::new()), "http://localhost:3000")
        .with_viewport(ViewportSpec::parse("iphone-x").unwrap())
        .with_mocks(wallet_mocks())
}

/// Connect the wallet and wait for the shortened address
fn connect_baseline() -> Vec<Command> {
    vec![
        Command::click(button("Connect Wallet")),
        Command::assert(loc("span").with_text("mockWa"), Expectation::Visible),
    ]
}

// ============================================================================
// Suite file
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_mobile_suite_passes() {
    let suite = Suite::from_path(suite_path()).unwrap();
    assert_eq!(suite.scenarios.len(), 12);
    let (runner, scenarios) = suite.into_runner(Arc::new(Marketplace::new())).unwrap();

    let summary = runner.run(&scenarios).await;
    assert!(summary.all_passed(), "{}", render_text(&summary));
    assert_eq!(summary.passed_count(), 12);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mobile_suite_in_parallel() {
    let suite = Suite::from_path(suite_path()).unwrap();
    let (runner, scenarios) = suite.into_runner(Arc::new(Marketplace::new())).unwrap();
    let summary = runner.with_parallel(4).run(&scenarios).await;

    assert!(summary.all_passed(), "{}", render_text(&summary));
    let names: Vec<&str> = summary.results.iter().map(|r| r.name.as_str()).collect();
    let expected: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, expected);
}

#[tokio::test(start_paused = true)]
async fn test_filter_runs_matching_scenarios_only() {
    let suite = Suite::from_path(suite_path()).unwrap();
    let (runner, scenarios) = suite.into_runner(Arc::new(Marketplace::new())).unwrap();
    let summary = runner.with_filter("carousel").run(&scenarios).await;
    assert_eq!(summary.total(), 1);
    assert!(summary.get("swipes the carousel").unwrap().outcome.is_passed());
}

#[test]
fn test_carousel_swipe_is_one_command() {
    let suite = Suite::from_path(suite_path()).unwrap();
    let compiled = suite.compile().unwrap();
    let carousel = compiled
        .scenarios
        .iter()
        .find(|s| s.name == "swipes the carousel")
        .unwrap();
    let kinds: Vec<CommandKind> = carousel.commands.iter().map(Command::kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == CommandKind::Swipe).count(), 1);
    assert!(!kinds.contains(&CommandKind::Trigger));
}

// ============================================================================
// Timing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_wallet_failure_reported_within_default_timeout() {
    let scenario = Scenario::new("wallet failure")
        .without_baseline()
        .with_mock(WALLET, behaviors([("connect", Behavior::rejects_with("Wallet connection failed"))]))
        .then(Command::click(button("Connect Wallet")))
        .then(Command::assert(loc("div").with_text(WALLET_ERROR), Expectation::Visible))
        .then(Command::assert(
            loc(".error-message"),
            Expectation::Css {
                property: "font-size".into(),
                value: "14px".into(),
            },
        ));

    let summary = runner().run(&[scenario]).await;
    assert!(summary.all_passed(), "{}", render_text(&summary));
    let trace = &summary.results[0].trace;
    assert!(trace[1].finished - trace[1].started < Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn test_purchase_needs_extended_timeout() {
    let purchase = |timeout: Option<Duration>| {
        let mut success = Command::assert(
            loc("div").with_text("Purchase successful!"),
            Expectation::Visible,
        );
        if let Some(timeout) = timeout {
            success = success.with_timeout(timeout);
        }
        Scenario::new(format!("purchase {timeout:?}"))
            .then(Command::navigate("/marketplace"))
            .then(Command::click(loc(".listing-card:first")))
            .then(Command::click(button("Buy Now")))
            .then(Command::assert(
                loc("div").with_text("Transaction in progress..."),
                Expectation::Visible,
            ))
            .then(success)
            .then(
                Command::assert_page(Expectation::UrlIncludes("/orders".into()))
                    .with_timeout(Duration::from_secs(10)),
            )
    };

    let summary = runner()
        .with_baseline(connect_baseline())
        .run(&[purchase(Some(Duration::from_secs(10))), purchase(None)])
        .await;

    assert!(summary.results[0].outcome.is_passed(), "{}", render_text(&summary));

    let failure = summary.results[1].failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Body);
    assert_eq!(failure.command_index, 4);
    assert_eq!(failure.phase, Phase::Assertion);
    assert_eq!(failure.error, "assertion_timeout");
    assert_eq!(failure.expected.as_deref(), Some("visible"));
    assert_eq!(failure.actual.as_deref(), Some("no matching element"));
    assert!(failure.elapsed_ms >= 4000);
}

#[tokio::test(start_paused = true)]
async fn test_missing_element_times_out_in_actionability() {
    let scenario = Scenario::new("missing")
        .without_baseline()
        .then(Command::click(button("Checkout")).with_timeout(Duration::from_millis(750)));
    let summary = runner().run(&[scenario]).await;

    let failure = summary.results[0].failure.as_ref().unwrap();
    assert_eq!(failure.phase, Phase::Actionability);
    assert_eq!(failure.actual.as_deref(), Some("no matching element"));
    assert!(failure.elapsed_ms >= 750);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_locator_is_not_actionable() {
    let scenario = Scenario::new("ambiguous")
        .without_baseline()
        .then(Command::navigate("/marketplace"))
        .then(Command::click(loc(".listing-card")).with_timeout(Duration::from_millis(200)));
    let summary = runner().run(&[scenario]).await;

    let failure = summary.results[0].failure.as_ref().unwrap();
    assert_eq!(failure.phase, Phase::Actionability);
    assert!(failure.actual.as_deref().unwrap().contains("5 elements"));
}

// ============================================================================
// Isolation and ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_mock_commands_do_not_leak_between_scenarios() {
    let rejecting = Scenario::new("rejecting")
        .then(Command::mock(
            WALLET,
            behaviors([("connect", Behavior::rejects_with("nope"))]),
        ))
        .then(Command::reload())
        .then(Command::click(button("Connect Wallet")))
        .then(Command::assert(loc(".error-message"), Expectation::Visible));
    let connecting = Scenario::new("connecting")
        .then(Command::navigate("/dashboard"))
        .then(Command::click(button("Connect Wallet")))
        .then(Command::assert(loc(".wallet-address"), Expectation::Visible))
        .then(Command::assert(loc(".error-message"), Expectation::Hidden));

    let summary = runner()
        .with_baseline(connect_baseline())
        .run(&[rejecting, connecting])
        .await;
    assert!(summary.all_passed(), "{}", render_text(&summary));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_state_is_independent() {
    // the first scenario buys something; the second must not see the order
    let buy = Scenario::new("buy")
        .then(Command::navigate("/item/2"))
        .then(Command::click(button("Buy Now")))
        .then(
            Command::assert_page(Expectation::UrlIncludes("/orders".into()))
                .with_timeout(Duration::from_secs(10)),
        )
        .then(Command::assert(loc("li").with_text("Dataset #2"), Expectation::Visible));
    let fresh = Scenario::new("fresh")
        .then(Command::navigate("/dashboard"))
        .then(Command::assert(loc("p").with_text("No orders yet"), Expectation::Visible));

    let summary = runner().run(&[buy, fresh]).await;
    assert!(summary.all_passed(), "{}", render_text(&summary));
}

#[tokio::test(start_paused = true)]
async fn test_commands_resolve_in_order() {
    let suite = Suite::from_path(suite_path()).unwrap();
    let (runner, scenarios) = suite.into_runner(Arc::new(Marketplace::new())).unwrap();
    let purchase = scenarios
        .iter()
        .find(|s| s.name == "completes a purchase")
        .cloned()
        .unwrap();

    let result = runner.run_scenario(&purchase).await;
    assert!(result.outcome.is_passed(), "{result:#?}");
    // baseline commands first, then the body
    let body: Vec<_> = result.trace.iter().skip(2).collect();
    assert_eq!(body.len(), purchase.commands.len());
    for pair in result.trace.windows(2) {
        assert!(pair[0].finished <= pair[1].started || pair[1].index == 0);
    }
    for (i, step) in body.iter().enumerate() {
        assert_eq!(step.index, i);
        assert!(step.ok);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_skips_remaining() {
    let failing = Scenario::new("failing")
        .without_baseline()
        .then(
            Command::assert(loc("h1").with_text("Nope"), Expectation::Visible)
                .with_timeout(Duration::from_millis(100)),
        );
    let other = Scenario::new("other")
        .without_baseline()
        .then(Command::assert(loc(".carousel"), Expectation::Visible));

    let summary = runner()
        .with_fail_fast(true)
        .run(&[failing, other])
        .await;
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.skipped_count(), 1);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmocked_wallet_fails_baseline() {
    let runner = ScenarioRunner::new(
        Arc::new(Marketplace::with_timing(SandboxTiming::fast())),
        "http://localhost:3000",
    )
    .with_baseline(connect_baseline());
    let summary = runner.run(&[Scenario::new("anything")]).await;

    let failure = summary.results[0].failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Baseline);
    assert_eq!(failure.command_index, 1);
    assert!(failure.elapsed_ms >= 4000);
}
