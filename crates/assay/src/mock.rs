//! Mock Injection Layer
//!
//! Replaces named external capabilities (e.g. a wallet provider) on a target
//! surface with scripted stand-ins. The layer is owned by one
//! [`TargetHandle`](crate::target::TargetHandle) and reset between scenarios.
//!
//! Behaviors are looked up when the application calls the capability, not
//! when they are installed, so re-installing a method mid-scenario changes
//! every later call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::result::{AssayError, AssayResult};

/// Scripted response of one mocked method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Resolve with a value
    ResolvesWith(Value),
    /// Reject with an error message
    RejectsWith(String),
    /// Forward to the real implementation
    Delegate,
}

impl Behavior {
    /// Resolve with a value
    #[must_use]
    pub fn resolves_with(value: impl Into<Value>) -> Self {
        Self::ResolvesWith(value.into())
    }

    /// Reject with an error
    #[must_use]
    pub fn rejects_with(message: impl Into<String>) -> Self {
        Self::RejectsWith(message.into())
    }
}

/// Method name → behavior
pub type BehaviorTable = BTreeMap<String, Behavior>;

/// Capability name → behavior table
pub type MockTables = BTreeMap<String, BehaviorTable>;

/// Build a behavior table from pairs
#[must_use]
pub fn behaviors<const N: usize>(entries: [(&str, Behavior); N]) -> BehaviorTable {
    entries
        .into_iter()
        .map(|(method, behavior)| (method.to_string(), behavior))
        .collect()
}

/// Error returned to the application by a capability call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// The call was rejected (scripted or real)
    #[error("{0}")]
    Rejected(String),
    /// Nothing is installed and no real implementation exists
    #[error("capability `{capability}` is unavailable")]
    Unavailable {
        /// Capability name
        capability: String,
    },
}

/// A real implementation of a capability, used for `delegate` behaviors
#[async_trait]
pub trait Capability: Send + Sync {
    /// Invoke `method` with `args`
    async fn call(&self, method: &str, args: Value) -> Result<Value, CapabilityError>;
}

/// Declaration of a capability an application consumes
#[derive(Clone)]
pub struct CapabilityDescriptor {
    name: String,
    methods: BTreeSet<String>,
    real: Option<Arc<dyn Capability>>,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("has_real", &self.real.is_some())
            .finish()
    }
}

impl CapabilityDescriptor {
    /// Declare a capability with its method names
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            real: None,
        }
    }

    /// Attach the real implementation
    #[must_use]
    pub fn with_real(mut self, real: Arc<dyn Capability>) -> Self {
        self.real = Some(real);
        self
    }

    /// Capability name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods
    #[must_use]
    pub const fn methods(&self) -> &BTreeSet<String> {
        &self.methods
    }
}

/// Where a call was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    /// Answered by an installed behavior
    Mock,
    /// Forwarded to the real implementation
    Real,
    /// No behavior and no real implementation
    Unavailable,
}

/// Record of one capability invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockCall {
    /// Capability name
    pub capability: String,
    /// Method name
    pub method: String,
    /// Arguments
    pub args: Value,
    /// Where the answer came from
    pub source: CallSource,
    /// Whether the call resolved
    pub resolved: bool,
}

#[derive(Debug, Default)]
struct MockState {
    known: BTreeMap<String, CapabilityDescriptor>,
    installed: MockTables,
    calls: Vec<MockCall>,
}

enum Resolution {
    Scripted(Result<Value, CapabilityError>),
    Real(Arc<dyn Capability>),
    Unavailable,
}

/// The injected-capability table of one target surface
#[derive(Debug, Clone, Default)]
pub struct MockLayer {
    state: Arc<Mutex<MockState>>,
}

impl MockLayer {
    /// Create an empty layer with no known capabilities
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a capability so mocks for it can be installed
    pub fn register(&self, descriptor: CapabilityDescriptor) {
        let _ = self
            .lock()
            .known
            .insert(descriptor.name.clone(), descriptor);
    }

    /// Check a behavior table against the registry without installing it
    pub fn validate(&self, capability: &str, table: &BehaviorTable) -> AssayResult<()> {
        let state = self.lock();
        validate_against(&state.known, capability, table)
    }

    /// Install behaviors for `capability`, merging per method.
    ///
    /// # Errors
    ///
    /// `MockConfiguration` if the capability or any method is unknown. Nothing
    /// is installed in that case.
    pub fn install(&self, capability: &str, table: BehaviorTable) -> AssayResult<()> {
        let mut state = self.lock();
        validate_against(&state.known, capability, &table)?;
        tracing::debug!(
            capability,
            methods = ?table.keys().collect::<Vec<_>>(),
            "installing mock"
        );
        state
            .installed
            .entry(capability.to_string())
            .or_default()
            .extend(table);
        Ok(())
    }

    /// Install several tables; stops at the first invalid one
    pub fn install_all(&self, tables: &MockTables) -> AssayResult<()> {
        for (capability, table) in tables {
            self.install(capability, table.clone())?;
        }
        Ok(())
    }

    /// Revert `capability` to its real implementation. Returns whether a mock was installed.
    pub fn restore(&self, capability: &str) -> bool {
        let restored = self.lock().installed.remove(capability).is_some();
        if restored {
            tracing::debug!(capability, "restored capability");
        }
        restored
    }

    /// Remove every installed mock and forget recorded calls
    pub fn reset(&self) {
        let mut state = self.lock();
        state.installed.clear();
        state.calls.clear();
    }

    /// Whether any behavior is installed for `capability`
    #[must_use]
    pub fn is_installed(&self, capability: &str) -> bool {
        self.lock().installed.contains_key(capability)
    }

    /// Currently installed behavior for `capability.method`
    #[must_use]
    pub fn behavior(&self, capability: &str, method: &str) -> Option<Behavior> {
        self.lock()
            .installed
            .get(capability)
            .and_then(|t| t.get(method))
            .cloned()
    }

    /// Names of all registered capabilities
    #[must_use]
    pub fn known(&self) -> Vec<String> {
        self.lock().known.keys().cloned().collect()
    }

    /// Recorded invocations, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Invoke `capability.method`, resolving the behavior now
    pub async fn invoke(
        &self,
        capability: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, CapabilityError> {
        let resolution = {
            let state = self.lock();
            let real = state.known.get(capability).and_then(|d| d.real.clone());
            match state.installed.get(capability).and_then(|t| t.get(method)) {
                Some(Behavior::ResolvesWith(value)) => Resolution::Scripted(Ok(value.clone())),
                Some(Behavior::RejectsWith(message)) => {
                    Resolution::Scripted(Err(CapabilityError::Rejected(message.clone())))
                }
                Some(Behavior::Delegate) | None => real.map_or(Resolution::Unavailable, Resolution::Real),
            }
        };

        let (source, outcome) = match resolution {
            Resolution::Scripted(outcome) => (CallSource::Mock, outcome),
            Resolution::Real(real) => (CallSource::Real, real.call(method, args.clone()).await),
            Resolution::Unavailable => (
                CallSource::Unavailable,
                Err(CapabilityError::Unavailable {
                    capability: capability.to_string(),
                }),
            ),
        };

        tracing::debug!(
            capability,
            method,
            ?source,
            resolved = outcome.is_ok(),
            "capability invoked"
        );
        self.lock().calls.push(MockCall {
            capability: capability.to_string(),
            method: method.to_string(),
            args,
            source,
            resolved: outcome.is_ok(),
        });
        outcome
    }
}

fn validate_against(
    known: &BTreeMap<String, CapabilityDescriptor>,
    capability: &str,
    table: &BehaviorTable,
) -> AssayResult<()> {
    let descriptor = known.get(capability).ok_or_else(|| {
        AssayError::mock_configuration(
            capability,
            format!(
                "unknown capability (known: {})",
                known.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        )
    })?;
    if let Some(method) = table.keys().find(|m| !descriptor.methods.contains(*m)) {
        return Err(AssayError::mock_configuration(
            capability,
            format!(
                "unknown method `{method}` (known: {})",
                descriptor.methods.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        ));
    }
    Ok(())
}
