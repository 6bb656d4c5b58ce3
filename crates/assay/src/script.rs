//! Scenario scripts.
//!
//! A suite file is YAML (`.yaml`, `.yml`) or JSON (`.json`):
//!
//! ```yaml
//! name: mobile marketplace
//! base_url: http://localhost:3000
//! viewport: iphone-x
//! settings: { timeout_ms: 4000 }
//! mocks:
//!   wallet:
//!     connect: { resolves_with: { publicKey: mockWalletAddress123 } }
//! baseline:
//!   - { kind: click, locator: { css: button, text: Connect Wallet } }
//! scenarios:
//!   - name: shows the hero section
//!     commands:
//!       - { kind: assert, locator: .hero-section, expected: visible }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::command::{Command, CommandRecord, Step};
use crate::config::Settings;
use crate::mock::{MockLayer, MockTables};
use crate::result::{AssayError, AssayResult};
use crate::runner::{Scenario, ScenarioRunner};
use crate::target::Application;
use crate::viewport::ViewportSpec;

/// Parse YAML with enum variants written as single-key maps
///
/// `{ count: 3 }` and `{ rejects_with: ... }` read as enum variants at any
/// depth, matching the JSON form of the same script.
pub fn from_yaml_str<T: DeserializeOwned>(content: &str) -> AssayResult<T> {
    let de = serde_yaml_ng::Deserializer::from_str(content);
    Ok(serde_yaml_ng::with::singleton_map_recursive::deserialize(de)?)
}

/// One scenario as written in a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioRecord {
    /// Scenario name
    pub name: String,
    /// Do not run the suite baseline
    #[serde(default)]
    pub skip_baseline: bool,
    /// Scenario-specific mocks
    #[serde(default, skip_serializing_if = "MockTables::is_empty")]
    pub mocks: MockTables,
    /// Body commands
    pub commands: Vec<CommandRecord>,
}

/// A whole suite file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    /// Suite name
    pub name: String,
    /// Base URL for relative navigation
    pub base_url: String,
    /// Starting viewport
    #[serde(default)]
    pub viewport: ViewportSpec,
    /// Engine settings
    #[serde(default)]
    pub settings: Settings,
    /// Mocks installed before every scenario
    #[serde(default, skip_serializing_if = "MockTables::is_empty")]
    pub mocks: MockTables,
    /// Commands run after the initial navigation of every scenario
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub baseline: Vec<CommandRecord>,
    /// Scenarios in execution order
    pub scenarios: Vec<ScenarioRecord>,
}

/// A validated suite
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSuite {
    /// Baseline commands
    pub baseline: Vec<Command>,
    /// Scenarios
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Load a suite, choosing the format from the file extension
    pub fn from_path(path: impl AsRef<Path>) -> AssayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(AssayError::script(format!(
                "unsupported suite format {:?} for {} (expected .yaml, .yml or .json)",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Parse a YAML suite
    pub fn from_yaml(content: &str) -> AssayResult<Self> {
        from_yaml_str(content)
    }

    /// Parse a JSON suite
    pub fn from_json(content: &str) -> AssayResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validate every command record
    pub fn compile(&self) -> AssayResult<CompiledSuite> {
        let baseline = compile_commands("baseline", &self.baseline)?;
        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        for (i, record) in self.scenarios.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(AssayError::script(format!("scenario #{i} has no name")));
            }
            if self.scenarios[..i].iter().any(|s| s.name == record.name) {
                return Err(AssayError::script(format!(
                    "duplicate scenario name `{}`",
                    record.name
                )));
            }
            let label = format!("scenario `{}`", record.name);
            scenarios.push(Scenario {
                name: record.name.clone(),
                commands: compile_commands(&label, &record.commands)?,
                mocks: record.mocks.clone(),
                skip_baseline: record.skip_baseline,
            });
        }
        Ok(CompiledSuite {
            baseline,
            scenarios,
        })
    }

    /// Check every mock table against the capabilities `app` declares
    pub fn validate(&self, app: &dyn Application) -> AssayResult<CompiledSuite> {
        let compiled = self.compile()?;
        let registry = MockLayer::new();
        for descriptor in app.capabilities() {
            registry.register(descriptor);
        }

        let check = |tables: &MockTables, context: &str| -> AssayResult<()> {
            for (capability, table) in tables {
                registry.validate(capability, table).map_err(|e| {
                    AssayError::script(format!("{context}: {e}"))
                })?;
            }
            Ok(())
        };

        check(&self.mocks, "suite mocks")?;
        check_mock_commands(&compiled.baseline, "baseline", &check)?;
        for scenario in &compiled.scenarios {
            let context = format!("scenario `{}`", scenario.name);
            check(&scenario.mocks, &context)?;
            check_mock_commands(&scenario.commands, &context, &check)?;
        }
        Ok(compiled)
    }

    /// Build a runner and the scenarios to feed it
    pub fn into_runner(
        self,
        app: Arc<dyn Application>,
    ) -> AssayResult<(ScenarioRunner, Vec<Scenario>)> {
        let compiled = self.validate(app.as_ref())?;
        let runner = ScenarioRunner::new(app, self.base_url)
            .with_name(self.name)
            .with_viewport(self.viewport)
            .with_settings(self.settings)
            .with_mocks(self.mocks)
            .with_baseline(compiled.baseline);
        Ok((runner, compiled.scenarios))
    }
}

fn compile_commands(context: &str, records: &[CommandRecord]) -> AssayResult<Vec<Command>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            Command::from_record(record).map_err(|e| match e {
                AssayError::InvalidLocator {
                    expression,
                    message,
                } => AssayError::InvalidLocator {
                    expression,
                    message: format!("{context}, command {i}: {message}"),
                },
                other => AssayError::script(format!("{context}, command {i}: {other}")),
            })
        })
        .collect()
}

fn check_mock_commands(
    commands: &[Command],
    context: &str,
    check: &dyn Fn(&MockTables, &str) -> AssayResult<()>,
) -> AssayResult<()> {
    for (i, command) in commands.iter().enumerate() {
        if let Step::Mock(tables) = command.step() {
            check(tables, &format!("{context}, command {i}"))?;
        }
    }
    Ok(())
}
