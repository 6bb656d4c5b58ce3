//! Commands executed by the [`CommandQueue`](crate::queue::CommandQueue).
//!
//! [`CommandRecord`] is the portable form found in scenario scripts;
//! [`Command`] is the validated, typed form. A command is immutable once
//! built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::event::{Action, ScrollTarget, TouchPoint};
use crate::expect::Expectation;
use crate::locator::{Locator, LocatorSpec};
use crate::mock::{BehaviorTable, MockTables};
use crate::result::{AssayError, AssayResult};
use crate::viewport::ViewportSpec;

/// Command kinds accepted in scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Load a URL
    Navigate,
    /// Reload the current URL
    Reload,
    /// Wait for an element to exist
    #[serde(alias = "find_element", alias = "find-element")]
    Find,
    /// Click an element
    Click,
    /// Type text into an element
    Type,
    /// Fire an event on an element
    #[serde(alias = "trigger_event", alias = "trigger-event")]
    Trigger,
    /// Swipe across an element
    Swipe,
    /// Scroll the page
    Scroll,
    /// Retrying assertion
    Assert,
    /// Change the viewport
    Viewport,
    /// Install capability mocks
    Mock,
    /// Restore a capability
    Restore,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Navigate => "navigate",
            Self::Reload => "reload",
            Self::Find => "find",
            Self::Click => "click",
            Self::Type => "type",
            Self::Trigger => "trigger",
            Self::Swipe => "swipe",
            Self::Scroll => "scroll",
            Self::Assert => "assert",
            Self::Viewport => "viewport",
            Self::Mock => "mock",
            Self::Restore => "restore",
        };
        f.write_str(name)
    }
}

/// A command as written in a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRecord {
    /// Command kind
    pub kind: CommandKind,
    /// Target element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<LocatorSpec>,
    /// Kind-specific argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Predicate for `assert` and `find`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expectation>,
    /// Timeout override in milliseconds
    #[serde(
        default,
        alias = "timeoutOverride",
        alias = "timeout_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<u64>,
}

/// What a command does
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Load a URL
    Navigate {
        /// Absolute or base-relative URL
        url: String,
    },
    /// Reload the current URL
    Reload,
    /// Wait until the locator matches
    Find {
        /// Element to wait for
        locator: Locator,
    },
    /// Dispatch actions on one element, after it is actionable
    Act {
        /// Target element
        locator: Locator,
        /// Actions in dispatch order
        actions: Vec<Action>,
    },
    /// Scroll the page
    Scroll(ScrollTarget),
    /// Wait for a predicate
    Assert {
        /// Element(s) the predicate applies to
        locator: Option<Locator>,
        /// The predicate
        expectation: Expectation,
    },
    /// Change the viewport
    Viewport(ViewportSpec),
    /// Install mocks
    Mock(MockTables),
    /// Restore a capability to its real implementation
    Restore {
        /// Capability name
        capability: String,
    },
}

/// A validated command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    step: Step,
    timeout: Option<Duration>,
}

impl Command {
    /// Wrap a step
    #[must_use]
    pub const fn new(step: Step) -> Self {
        Self { step, timeout: None }
    }

    /// Navigate to `url`
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(Step::Navigate { url: url.into() })
    }

    /// Reload the current page
    #[must_use]
    pub const fn reload() -> Self {
        Self::new(Step::Reload)
    }

    /// Wait until `locator` matches
    #[must_use]
    pub const fn find(locator: Locator) -> Self {
        Self::new(Step::Find { locator })
    }

    /// Click `locator`
    #[must_use]
    pub fn click(locator: Locator) -> Self {
        Self::act(locator, Action::Click)
    }

    /// Type `text` into `locator`
    #[must_use]
    pub fn type_text(locator: Locator, text: impl Into<String>) -> Self {
        Self::act(locator, Action::type_text(text))
    }

    /// Fire `event` on `locator`
    #[must_use]
    pub fn trigger(locator: Locator, event: impl Into<String>, touches: Vec<TouchPoint>) -> Self {
        Self::act(
            locator,
            Action::Trigger {
                event: event.into(),
                touches,
            },
        )
    }

    /// Swipe across `locator`
    #[must_use]
    pub fn swipe(locator: Locator, from: TouchPoint, to: TouchPoint) -> Self {
        Self::act(locator, Action::Swipe { from, to })
    }

    /// Dispatch one action on `locator`
    #[must_use]
    pub fn act(locator: Locator, action: Action) -> Self {
        Self::new(Step::Act {
            locator,
            actions: vec![action],
        })
    }

    /// Scroll the page
    #[must_use]
    pub const fn scroll(target: ScrollTarget) -> Self {
        Self::new(Step::Scroll(target))
    }

    /// Assert a predicate on `locator`
    #[must_use]
    pub const fn assert(locator: Locator, expectation: Expectation) -> Self {
        Self::new(Step::Assert {
            locator: Some(locator),
            expectation,
        })
    }

    /// Assert a location predicate
    #[must_use]
    pub const fn assert_page(expectation: Expectation) -> Self {
        Self::new(Step::Assert {
            locator: None,
            expectation,
        })
    }

    /// Change the viewport
    #[must_use]
    pub const fn viewport(spec: ViewportSpec) -> Self {
        Self::new(Step::Viewport(spec))
    }

    /// Install behaviors for one capability
    #[must_use]
    pub fn mock(capability: impl Into<String>, table: BehaviorTable) -> Self {
        let mut tables = MockTables::new();
        let _ = tables.insert(capability.into(), table);
        Self::new(Step::Mock(tables))
    }

    /// Restore `capability`
    #[must_use]
    pub fn restore(capability: impl Into<String>) -> Self {
        Self::new(Step::Restore {
            capability: capability.into(),
        })
    }

    /// Override the wait timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// What the command does
    #[must_use]
    pub const fn step(&self) -> &Step {
        &self.step
    }

    /// Timeout override
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Kind of the command
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match &self.step {
            Step::Navigate { .. } => CommandKind::Navigate,
            Step::Reload => CommandKind::Reload,
            Step::Find { .. } => CommandKind::Find,
            Step::Act { actions, .. } => match actions.first() {
                Some(Action::Type { .. } | Action::Clear) => CommandKind::Type,
                Some(Action::Trigger { .. }) => CommandKind::Trigger,
                Some(Action::Swipe { .. }) => CommandKind::Swipe,
                Some(Action::Click) | None => CommandKind::Click,
            },
            Step::Scroll(_) => CommandKind::Scroll,
            Step::Assert { .. } => CommandKind::Assert,
            Step::Viewport(_) => CommandKind::Viewport,
            Step::Mock(_) => CommandKind::Mock,
            Step::Restore { .. } => CommandKind::Restore,
        }
    }

    /// Target element, if any
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match &self.step {
            Step::Find { locator } | Step::Act { locator, .. } => Some(locator),
            Step::Assert { locator, .. } => locator.as_ref(),
            _ => None,
        }
    }

    /// Validate a script record
    pub fn from_record(record: &CommandRecord) -> AssayResult<Self> {
        let kind = record.kind;
        let locator = record.locator.as_ref().map(Locator::try_from).transpose()?;
        let require_locator = || {
            locator
                .clone()
                .ok_or_else(|| AssayError::script(format!("`{kind}` requires a locator")))
        };
        let payload = record.payload.clone();

        let step = match kind {
            CommandKind::Navigate => Step::Navigate {
                url: payload_string(kind, payload)?,
            },
            CommandKind::Reload => Step::Reload,
            CommandKind::Find => match record.expected.clone() {
                None | Some(Expectation::Exists) => Step::Find {
                    locator: require_locator()?,
                },
                Some(expectation) => Step::Assert {
                    locator: Some(require_locator()?),
                    expectation,
                },
            },
            CommandKind::Click => Step::Act {
                locator: require_locator()?,
                actions: vec![Action::Click],
            },
            CommandKind::Type => Step::Act {
                locator: require_locator()?,
                actions: type_actions(payload)?,
            },
            CommandKind::Trigger => Step::Act {
                locator: require_locator()?,
                actions: vec![trigger_action(payload)?],
            },
            CommandKind::Swipe => {
                let SwipePayload { from, to } = parse_payload(kind, payload)?;
                Step::Act {
                    locator: require_locator()?,
                    actions: vec![Action::Swipe { from, to }],
                }
            }
            CommandKind::Scroll => Step::Scroll(scroll_target(payload)?),
            CommandKind::Assert => {
                let expectation = record
                    .expected
                    .clone()
                    .ok_or_else(|| AssayError::script("`assert` requires `expected`"))?;
                if expectation.needs_locator() && locator.is_none() {
                    return Err(AssayError::script(format!(
                        "`assert` {expectation} requires a locator"
                    )));
                }
                Step::Assert {
                    locator,
                    expectation,
                }
            }
            CommandKind::Viewport => Step::Viewport(ViewportSpec::parse(&payload_string(kind, payload)?)?),
            CommandKind::Mock => Step::Mock(parse_payload(kind, payload)?),
            CommandKind::Restore => Step::Restore {
                capability: payload_string(kind, payload)?,
            },
        };

        Ok(Self {
            step,
            timeout: record.timeout.map(Duration::from_millis),
        })
    }
}

impl TryFrom<&CommandRecord> for Command {
    type Error = AssayError;

    fn try_from(record: &CommandRecord) -> Result<Self, Self::Error> {
        Self::from_record(record)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Step::Navigate { url } => write!(f, "navigate {url}"),
            Step::Reload => write!(f, "reload"),
            Step::Find { locator } => write!(f, "find `{locator}`"),
            Step::Act { locator, actions } => {
                let actions: Vec<String> = actions.iter().map(ToString::to_string).collect();
                write!(f, "{} on `{locator}`", actions.join(" + "))
            }
            Step::Scroll(target) => write!(f, "scroll to {target}"),
            Step::Assert {
                locator,
                expectation,
            } => write!(f, "assert {}", expectation.describe(locator.as_ref())),
            Step::Viewport(spec) => write!(f, "viewport {spec}"),
            Step::Mock(tables) => {
                let names: Vec<&str> = tables.keys().map(String::as_str).collect();
                write!(f, "mock {}", names.join(", "))
            }
            Step::Restore { capability } => write!(f, "restore {capability}"),
        }
    }
}

#[derive(Deserialize)]
struct SwipePayload {
    from: TouchPoint,
    to: TouchPoint,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TypePayload {
    Text(String),
    Record {
        text: String,
        #[serde(default)]
        clear: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerPayload {
    Event(String),
    Record {
        event: String,
        #[serde(default)]
        touches: Vec<TouchPoint>,
    },
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    kind: CommandKind,
    payload: Option<Value>,
) -> AssayResult<T> {
    let payload = payload.ok_or_else(|| AssayError::script(format!("`{kind}` requires a payload")))?;
    serde_json::from_value(payload)
        .map_err(|e| AssayError::script(format!("invalid `{kind}` payload: {e}")))
}

fn payload_string(kind: CommandKind, payload: Option<Value>) -> AssayResult<String> {
    parse_payload(kind, payload)
}

fn type_actions(payload: Option<Value>) -> AssayResult<Vec<Action>> {
    Ok(match parse_payload(CommandKind::Type, payload)? {
        TypePayload::Text(text) => vec![Action::type_text(text)],
        TypePayload::Record { text, clear } => {
            let mut actions = Vec::with_capacity(2);
            if clear {
                actions.push(Action::Clear);
            }
            actions.push(Action::type_text(text));
            actions
        }
    })
}

fn trigger_action(payload: Option<Value>) -> AssayResult<Action> {
    Ok(match parse_payload(CommandKind::Trigger, payload)? {
        TriggerPayload::Event(event) => Action::trigger(event),
        TriggerPayload::Record { event, touches } => Action::Trigger { event, touches },
    })
}

fn scroll_target(payload: Option<Value>) -> AssayResult<ScrollTarget> {
    match payload {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|y| u32::try_from(y).ok())
            .map(ScrollTarget::Offset)
            .ok_or_else(|| AssayError::script(format!("invalid scroll offset {n}"))),
        None => Ok(ScrollTarget::Bottom),
        payload => parse_payload(CommandKind::Scroll, payload),
    }
}
