//! Predicates evaluated by assertion commands.
//!
//! An element expectation needs at least one match, and every matched
//! element must satisfy it. `hidden` and `absent` are the exceptions: they
//! also hold when nothing matches.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dom::ElementView;
use crate::locator::Locator;
use crate::retry::CheckResult;
use crate::target::{path_of, TargetHandle};

/// Count comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountExpectation {
    /// Exactly `n`
    Eq(usize),
    /// More than `n`
    GreaterThan(usize),
    /// `n` or more
    AtLeast(usize),
    /// Fewer than `n`
    LessThan(usize),
}

impl CountExpectation {
    /// Whether `count` satisfies the comparison
    #[must_use]
    pub const fn holds(self, count: usize) -> bool {
        match self {
            Self::Eq(n) => count == n,
            Self::GreaterThan(n) => count > n,
            Self::AtLeast(n) => count >= n,
            Self::LessThan(n) => count < n,
        }
    }
}

impl fmt::Display for CountExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(n) => write!(f, "exactly {n}"),
            Self::GreaterThan(n) => write!(f, "more than {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::LessThan(n) => write!(f, "fewer than {n}"),
        }
    }
}

/// A predicate over the target's current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Matches exist and are all visible
    Visible,
    /// No match is visible
    Hidden,
    /// At least one match
    Exists,
    /// No match
    Absent,
    /// Number of matches
    Count(CountExpectation),
    /// Text content equals (trimmed)
    Text(String),
    /// Text content contains
    ContainsText(String),
    /// Form control value equals
    Value(String),
    /// Computed style equals
    Css {
        /// Property name
        property: String,
        /// Expected value
        value: String,
    },
    /// Attribute present, optionally with a value
    Attribute {
        /// Attribute name
        name: String,
        /// Expected value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Location contains
    UrlIncludes(String),
    /// Location (full URL or path) equals
    UrlEquals(String),
}

impl Expectation {
    /// Whether this predicate is evaluated against located elements
    #[must_use]
    pub const fn needs_locator(&self) -> bool {
        !matches!(self, Self::UrlIncludes(_) | Self::UrlEquals(_))
    }

    /// Human-readable expected value
    #[must_use]
    pub fn expected(&self) -> String {
        match self {
            Self::Visible => "visible".to_string(),
            Self::Hidden => "hidden".to_string(),
            Self::Exists => "at least one element".to_string(),
            Self::Absent => "no elements".to_string(),
            Self::Count(count) => format!("{count} element(s)"),
            Self::Text(text) => format!("text {text:?}"),
            Self::ContainsText(text) => format!("text containing {text:?}"),
            Self::Value(value) => format!("value {value:?}"),
            Self::Css { property, value } => format!("{property}: {value}"),
            Self::Attribute { name, value: None } => format!("attribute `{name}`"),
            Self::Attribute {
                name,
                value: Some(value),
            } => format!("{name}={value:?}"),
            Self::UrlIncludes(part) => format!("url including {part:?}"),
            Self::UrlEquals(url) => format!("url {url:?}"),
        }
    }

    /// Describe the assertion for diagnostics
    #[must_use]
    pub fn describe(&self, locator: Option<&Locator>) -> String {
        match locator {
            Some(locator) if self.needs_locator() => format!("`{locator}` {self}"),
            _ => self.to_string(),
        }
    }

    /// Evaluate once against the current state. Never blocks.
    #[must_use]
    pub fn check(&self, target: &TargetHandle, locator: Option<&Locator>) -> CheckResult {
        match self {
            Self::UrlIncludes(part) => {
                let location = target.location();
                if location.contains(part.as_str()) {
                    CheckResult::Pass
                } else {
                    CheckResult::fail(self.expected(), location)
                }
            }
            Self::UrlEquals(url) => {
                let location = target.location();
                if location == *url || path_of(&location) == *url {
                    CheckResult::Pass
                } else {
                    CheckResult::fail(self.expected(), location)
                }
            }
            _ => {
                let Some(locator) = locator else {
                    return CheckResult::fail(self.expected(), "no locator given");
                };
                let views: Vec<ElementView> = target.page().with_document(|doc| {
                    doc.query(locator)
                        .iter()
                        .filter_map(|r| doc.view(r.node()))
                        .collect()
                });
                self.check_views(&views)
            }
        }
    }

    fn check_views(&self, views: &[ElementView]) -> CheckResult {
        let expected = self.expected();
        let matched = views.len();
        match self {
            Self::Exists | Self::Absent | Self::Count(_) => {
                let holds = match self {
                    Self::Exists => matched > 0,
                    Self::Absent => matched == 0,
                    Self::Count(count) => count.holds(matched),
                    _ => false,
                };
                if holds {
                    CheckResult::Pass
                } else {
                    CheckResult::fail(expected, format!("{matched} element(s)"))
                }
            }
            Self::Hidden => match views.iter().filter(|v| v.visible).count() {
                0 => CheckResult::Pass,
                shown => CheckResult::fail(expected, format!("{shown} of {matched} visible")),
            },
            _ if views.is_empty() => CheckResult::fail(expected, "no matching element"),
            _ => views
                .iter()
                .find_map(|view| self.mismatch(view))
                .map_or(CheckResult::Pass, |actual| CheckResult::fail(expected, actual)),
        }
    }

    /// What `view` shows instead, if it does not satisfy the expectation
    fn mismatch(&self, view: &ElementView) -> Option<String> {
        match self {
            Self::Visible => (!view.visible).then(|| "hidden".to_string()),
            Self::Text(text) => (view.text.trim() != text).then(|| format!("{:?}", view.text)),
            Self::ContainsText(text) => {
                (!view.text.contains(text.as_str())).then(|| format!("{:?}", view.text))
            }
            Self::Value(value) => (view.value != *value).then(|| format!("{:?}", view.value)),
            Self::Css { property, value } => match view.styles.get(property) {
                Some(actual) if actual == value => None,
                Some(actual) => Some(format!("{property}: {actual}")),
                None => Some(format!("{property} unset")),
            },
            Self::Attribute { name, value } => match (view.attrs.get(name), value) {
                (Some(_), None) => None,
                (Some(actual), Some(value)) if actual == value => None,
                (Some(actual), Some(_)) => Some(format!("{name}={actual:?}")),
                (None, _) => Some(format!("no attribute `{name}`")),
            },
            _ => None,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visible => write!(f, "to be visible"),
            Self::Hidden => write!(f, "to be hidden"),
            Self::Exists => write!(f, "to exist"),
            Self::Absent => write!(f, "to be absent"),
            Self::Count(count) => write!(f, "to match {count} element(s)"),
            Self::Text(text) => write!(f, "to have text {text:?}"),
            Self::ContainsText(text) => write!(f, "to contain {text:?}"),
            Self::Value(value) => write!(f, "to have value {value:?}"),
            Self::Css { property, value } => write!(f, "to have css {property}: {value}"),
            Self::Attribute { name, value: None } => write!(f, "to have attribute `{name}`"),
            Self::Attribute {
                name,
                value: Some(value),
            } => write!(f, "to have {name}={value:?}"),
            Self::UrlIncludes(part) => write!(f, "url to include {part:?}"),
            Self::UrlEquals(url) => write!(f, "url to equal {url:?}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, NodeId};
    use crate::event::DomEvent;
    use crate::target::{Application, Page};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Listing;

    #[async_trait]
    impl Application for Listing {
        fn name(&self) -> &str {
            "listing"
        }

        async fn load(&self, page: &Page) -> Result<(), String> {
            page.with_document(|doc| {
                let grid = doc
                    .append(
                        NodeId::ROOT,
                        ElementSpec::new("div")
                            .class("listing-grid")
                            .style("grid-template-columns", "1fr"),
                    )
                    .ok_or("no root")?;
                for i in 0..3 {
                    doc.append(
                        grid,
                        ElementSpec::new("div")
                            .class("listing-card")
                            .style("width", "100%")
                            .text(format!("Agent {i}")),
                    );
                }
                doc.append(NodeId::ROOT, ElementSpec::new("div").class("error-message").hidden());
                doc.append(NodeId::ROOT, ElementSpec::new("input").id("price").value("0.5"));
                Ok(())
            })
        }

        fn on_event(&self, _page: &Page, _target: NodeId, _event: &DomEvent) {}
    }

    async fn target() -> TargetHandle {
        let handle = TargetHandle::new(Arc::new(Listing), "http://localhost:3000");
        handle.navigate("/marketplace").await.unwrap();
        handle
    }

    fn loc(s: &str) -> Locator {
        Locator::parse(s).unwrap()
    }

    mod elements {
        use super::*;

        #[tokio::test]
        async fn test_visible_requires_a_match() {
            let t = target().await;
            assert!(Expectation::Visible.check(&t, Some(&loc(".listing-card"))).is_pass());
            let result = Expectation::Visible.check(&t, Some(&loc(".carousel")));
            assert_eq!(result, CheckResult::fail("visible", "no matching element"));
        }

        #[tokio::test]
        async fn test_hidden_and_absent() {
            let t = target().await;
            assert!(Expectation::Hidden.check(&t, Some(&loc(".error-message"))).is_pass());
            assert!(Expectation::Hidden.check(&t, Some(&loc(".nothing"))).is_pass());
            assert!(Expectation::Absent.check(&t, Some(&loc(".nothing"))).is_pass());
            assert!(Expectation::Absent.check(&t, Some(&loc(".listing-card"))).is_fail());
        }

        #[tokio::test]
        async fn test_count() {
            let t = target().await;
            let cards = loc(".listing-card");
            assert!(Expectation::Count(CountExpectation::Eq(3)).check(&t, Some(&cards)).is_pass());
            let result = Expectation::Count(CountExpectation::GreaterThan(5)).check(&t, Some(&cards));
            assert_eq!(result, CheckResult::fail("more than 5 element(s)", "3 element(s)"));
        }

        #[tokio::test]
        async fn test_css_applies_to_every_match() {
            let t = target().await;
            let width = Expectation::Css {
                property: "width".into(),
                value: "100%".into(),
            };
            assert!(width.check(&t, Some(&loc(".listing-card"))).is_pass());
            let flex = Expectation::Css {
                property: "flex-direction".into(),
                value: "column".into(),
            };
            assert_eq!(
                flex.check(&t, Some(&loc(".listing-grid"))),
                CheckResult::fail("flex-direction: column", "flex-direction unset")
            );
        }

        #[tokio::test]
        async fn test_text_value_attribute() {
            let t = target().await;
            assert!(Expectation::ContainsText("Agent".into())
                .check(&t, Some(&loc(".listing-card")))
                .is_pass());
            assert!(Expectation::Text("Agent 1".into())
                .check(&t, Some(&loc(".listing-card:eq(1)")))
                .is_pass());
            assert!(Expectation::Value("0.5".into()).check(&t, Some(&loc("#price"))).is_pass());
            let attr = Expectation::Attribute {
                name: "id".into(),
                value: Some("price".into()),
            };
            assert!(attr.check(&t, Some(&loc("input"))).is_pass());
        }
    }

    mod location {
        use super::*;

        #[tokio::test]
        async fn test_url_predicates() {
            let t = target().await;
            assert!(Expectation::UrlIncludes("/marketplace".into()).check(&t, None).is_pass());
            assert!(Expectation::UrlEquals("/marketplace".into()).check(&t, None).is_pass());
            assert!(Expectation::UrlIncludes("/orders".into()).check(&t, None).is_fail());
        }
    }

    #[test]
    fn test_serde_shapes() {
        let e: Expectation = crate::script::from_yaml_str("visible").unwrap();
        assert_eq!(e, Expectation::Visible);
        let e: Expectation = crate::script::from_yaml_str("count: {greater_than: 5}").unwrap();
        assert_eq!(e, Expectation::Count(CountExpectation::GreaterThan(5)));
        let e: Expectation = crate::script::from_yaml_str("css: {property: width, value: 100%}").unwrap();
        assert!(matches!(e, Expectation::Css { .. }));
        let e: Expectation = serde_json::from_str(r#"{"url_includes": "/orders"}"#).unwrap();
        assert_eq!(e, Expectation::UrlIncludes("/orders".into()));
    }

    #[test]
    fn test_describe() {
        let text = Locator::parse("div").unwrap().with_text("Purchase successful!");
        let description = Expectation::Visible.describe(Some(&text));
        assert!(description.ends_with("to be visible"));
        assert_eq!(
            Expectation::UrlIncludes("/orders".into()).describe(Some(&text)),
            "url to include \"/orders\""
        );
    }
}
