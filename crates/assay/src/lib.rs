//! Assay: command-queue and retry-assertion engine for asynchronously
//! rendering UIs.
//!
//! Scenarios are ordered lists of commands (navigate, find, act, assert).
//! The queue runs them strictly in order against a [`TargetHandle`]; element
//! lookups wait for actionability and assertions retry until they hold or
//! their timeout elapses. External capabilities (a wallet provider, say) are
//! answered from per-scenario mock tables.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Scenario     │   │ Command      │   │ Target       │
//! │ Runner       │──►│ Queue        │──►│ Handle       │──► Application
//! │ (isolation)  │   │ (ordering)   │   │ (page state) │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!                    ┌──────▼───────┐   ┌──────▼───────┐
//!                    │ Retry        │   │ Mock         │
//!                    │ Assertions   │   │ Layer        │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let suite = Suite::from_path("scenarios/mobile_marketplace.yaml")?;
//! let (runner, scenarios) = suite.into_runner(Arc::new(Marketplace::new()))?;
//! let summary = runner.run(&scenarios).await;
//! println!("{}", summary.summary());
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Commands and their script records
pub mod command;
/// Engine settings
pub mod config;
/// In-memory element tree
pub mod dom;
/// User actions and the events they expand to
pub mod event;
/// Assertion predicates
pub mod expect;
/// Element locators
pub mod locator;
/// Capability mocks
pub mod mock;
/// Ordered command execution
pub mod queue;
/// Run summary rendering
#[allow(clippy::cast_precision_loss)]
pub mod reporter;
mod result;
/// Retry-until-timeout assertions
pub mod retry;
/// Scenario isolation and suite execution
pub mod runner;
/// Suite files
pub mod script;
/// The surface under test
pub mod target;
/// Viewports and device presets
pub mod viewport;

/// Reference marketplace application
#[cfg(feature = "sandbox")]
pub mod sandbox;

/// Proptest strategies
#[cfg(feature = "proptest")]
#[allow(clippy::missing_const_for_fn)]
pub mod strategies;

pub use command::{Command, CommandKind, CommandRecord, Step};
pub use config::{Settings, SettingsOverrides};
pub use dom::{Document, Element, ElementRef, ElementSpec, ElementView, NodeId};
pub use event::{Action, DomEvent, ScrollTarget, TouchPoint};
pub use expect::{CountExpectation, Expectation};
pub use locator::{Locator, LocatorSpec, NamedPosition, Point, Position, Selector};
pub use mock::{
    behaviors, Behavior, BehaviorTable, CallSource, Capability, CapabilityDescriptor,
    CapabilityError, MockCall, MockLayer, MockTables,
};
pub use queue::{CommandFailure, CommandQueue, Phase, QueueOutcome, StepTrace};
pub use reporter::ReportFormat;
pub use result::{AssayError, AssayResult};
pub use retry::{
    retry_contains, retry_eq, retry_true, wait_for, AssertionOutcome, CheckResult, Mismatch,
    RetryAssertion, RetryConfig, RetryError, RetryLoop, RetryResult,
};
pub use runner::{
    FailureDetail, Outcome, RunSummary, Scenario, ScenarioResult, ScenarioRunner, Stage,
};
pub use script::{from_yaml_str, CompiledSuite, ScenarioRecord, Suite};
pub use target::{
    Application, CapabilityClient, Page, PageState, ScrollPosition, TargetHandle,
};
pub use viewport::{DevicePreset, DeviceRegistry, Viewport, ViewportSpec};

#[cfg(feature = "sandbox")]
pub use sandbox::{CatalogItem, Marketplace, SandboxTiming};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::command::*;
    pub use super::config::*;
    pub use super::event::*;
    pub use super::expect::*;
    pub use super::locator::*;
    pub use super::mock::*;
    pub use super::queue::*;
    pub use super::retry::*;
    pub use super::runner::*;
    pub use super::script::*;
    pub use super::target::*;
    pub use super::viewport::*;
    pub use super::{AssayError, AssayResult};
}
