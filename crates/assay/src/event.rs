//! Simulated user input.
//!
//! An [`Action`] is what a command asks for; it expands into one or more
//! [`DomEvent`]s that are delivered to the application in a single dispatch,
//! so composite gestures stay atomic with respect to the command queue.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::locator::Point;

/// A single touch point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    /// Client X coordinate
    #[serde(rename = "clientX", alias = "x")]
    pub client_x: f32,
    /// Client Y coordinate
    #[serde(rename = "clientY", alias = "y")]
    pub client_y: f32,
}

impl TouchPoint {
    /// Create a touch point
    #[must_use]
    pub const fn new(client_x: f32, client_y: f32) -> Self {
        Self { client_x, client_y }
    }
}

impl From<Point> for TouchPoint {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// A low-level event delivered to the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    /// Event type (`click`, `input`, `touchstart`, ...)
    pub name: String,
    /// Active touches (touch events only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub touches: Vec<TouchPoint>,
    /// Text payload (`input` events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl DomEvent {
    /// Create a bare event
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            touches: Vec::new(),
            data: None,
        }
    }

    /// Attach touches
    #[must_use]
    pub fn with_touches(mut self, touches: Vec<TouchPoint>) -> Self {
        self.touches = touches;
        self
    }

    /// Attach text data
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// A user action dispatched against one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Single click / tap
    Click,
    /// Type text, appending to the current value
    Type {
        /// Text to type
        text: String,
    },
    /// Clear a form control
    Clear,
    /// Fire an arbitrary event
    Trigger {
        /// Event name
        event: String,
        /// Touch points
        touches: Vec<TouchPoint>,
    },
    /// Horizontal or vertical swipe (touchstart + touchmove + touchend)
    Swipe {
        /// Start point
        from: TouchPoint,
        /// End point
        to: TouchPoint,
    },
}

impl Action {
    /// Create a type action
    #[must_use]
    pub fn type_text(text: impl Into<String>) -> Self {
        Self::Type { text: text.into() }
    }

    /// Create a trigger action without touches
    #[must_use]
    pub fn trigger(event: impl Into<String>) -> Self {
        Self::Trigger {
            event: event.into(),
            touches: Vec::new(),
        }
    }

    /// Create a swipe between two points
    #[must_use]
    pub fn swipe(from: impl Into<TouchPoint>, to: impl Into<TouchPoint>) -> Self {
        Self::Swipe {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Expand into the events delivered to the application, in order
    #[must_use]
    pub fn events(&self) -> Vec<DomEvent> {
        match self {
            Self::Click => vec![DomEvent::new("click")],
            Self::Type { text } => vec![DomEvent::new("input").with_data(text.clone())],
            Self::Clear => vec![DomEvent::new("input").with_data(String::new())],
            Self::Trigger { event, touches } => {
                vec![DomEvent::new(event.clone()).with_touches(touches.clone())]
            }
            Self::Swipe { from, to } => vec![
                DomEvent::new("touchstart").with_touches(vec![*from]),
                DomEvent::new("touchmove").with_touches(vec![*to]),
                DomEvent::new("touchend"),
            ],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Type { text } => write!(f, "type {text:?}"),
            Self::Clear => write!(f, "clear"),
            Self::Trigger { event, .. } => write!(f, "trigger {event}"),
            Self::Swipe { from, to } => write!(
                f,
                "swipe ({}, {}) -> ({}, {})",
                from.client_x, from.client_y, to.client_x, to.client_y
            ),
        }
    }
}

/// Where a page scroll should end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTarget {
    /// Top of the page
    Top,
    /// Bottom of the page
    Bottom,
    /// Absolute offset in pixels
    Offset(u32),
}

impl fmt::Display for ScrollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
            Self::Offset(y) => write!(f, "{y}px"),
        }
    }
}
