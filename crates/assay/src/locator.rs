//! Locator abstraction for element selection.
//!
//! A locator is a CSS-like selector chain plus optional text and position
//! filters. Locators are pure descriptions: resolving one against a surface
//! is done by [`crate::dom::Document::query`] and never blocks.
//!
//! # Grammar
//!
//! ```text
//! expression := compound (WS compound)* [pseudo]*
//! compound   := [tag | '*'] ('#' ident | '.' ident | '[' ident ['=' value] ']')*
//! pseudo     := ':first' | ':last' | ':eq(' N ')' | ':contains(' text ')'
//! ```
//!
//! Whitespace is the descendant combinator. Pseudo filters may only follow
//! the last compound. Attribute values and `:contains` text may be quoted
//! with `"` or `'`; inside quotes `\` escapes the next character.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{AssayError, AssayResult};

/// A point in 2D space (client coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Attribute filter inside a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrFilter {
    /// Attribute name
    pub name: String,
    /// Required value (`None` = presence only)
    pub value: Option<String>,
}

/// One compound selector, e.g. `input#name` or `a.nav[href="/sell"]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Tag name (`None` matches any tag)
    pub tag: Option<String>,
    /// Required id
    pub id: Option<String>,
    /// Required classes
    pub classes: Vec<String>,
    /// Required attributes
    pub attrs: Vec<AttrFilter>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{tag}")?,
            None if self.is_empty() => write!(f, "*")?,
            None => {}
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for attr in &self.attrs {
            match &attr.value {
                Some(v) => {
                    write!(f, "[{}=", attr.name)?;
                    write_quoted(f, v)?;
                    write!(f, "]")?;
                }
                None => write!(f, "[{}]", attr.name)?,
            }
        }
        Ok(())
    }
}

/// A descendant chain of compound selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    chain: Vec<Compound>,
}

impl Selector {
    /// Parse a selector chain (no pseudo filters)
    pub fn parse(expression: &str) -> AssayResult<Self> {
        let chain = split_compounds(expression)
            .into_iter()
            .map(|part| parse_compound(part, expression))
            .collect::<AssayResult<Vec<_>>>()?;
        if chain.is_empty() {
            return Err(invalid(expression, "empty selector"));
        }
        Ok(Self { chain })
    }

    /// The compound selectors, outermost first
    #[must_use]
    pub fn chain(&self) -> &[Compound] {
        &self.chain
    }

    /// The compound the matched element itself must satisfy
    #[must_use]
    pub fn subject(&self) -> &Compound {
        // parse() guarantees a non-empty chain
        &self.chain[self.chain.len() - 1]
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, compound) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{compound}")?;
        }
        Ok(())
    }
}

/// Which of the matched elements a locator targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    /// Zero-based index
    Nth(usize),
    /// First or last
    Named(NamedPosition),
}

/// Named positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedPosition {
    /// First match in document order
    First,
    /// Last match in document order
    Last,
}

impl Position {
    /// First match
    pub const FIRST: Self = Self::Named(NamedPosition::First);
    /// Last match
    pub const LAST: Self = Self::Named(NamedPosition::Last);

    /// Pick an index out of `len` matches
    #[must_use]
    pub const fn pick(self, len: usize) -> Option<usize> {
        match self {
            Self::Nth(n) if n < len => Some(n),
            Self::Nth(_) => None,
            Self::Named(_) if len == 0 => None,
            Self::Named(NamedPosition::First) => Some(0),
            Self::Named(NamedPosition::Last) => Some(len - 1),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nth(n) => write!(f, ":eq({n})"),
            Self::Named(NamedPosition::First) => write!(f, ":first"),
            Self::Named(NamedPosition::Last) => write!(f, ":last"),
        }
    }
}

/// A locator for finding elements on a target surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    selector: Selector,
    text: Option<String>,
    position: Option<Position>,
}

impl Locator {
    /// Parse a locator expression, including pseudo filters
    pub fn parse(expression: &str) -> AssayResult<Self> {
        let trimmed = expression.trim();
        let (base, pseudos) = split_pseudos(trimmed)?;
        let mut locator = Self {
            selector: Selector::parse(base)?,
            text: None,
            position: None,
        };
        for pseudo in pseudos {
            locator = apply_pseudo(locator, pseudo.trim(), expression)?;
        }
        Ok(locator)
    }

    /// Create a locator from an already parsed selector
    #[must_use]
    pub const fn from_selector(selector: Selector) -> Self {
        Self {
            selector,
            text: None,
            position: None,
        }
    }

    /// Keep only elements whose text content contains `text`
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Target the first match
    #[must_use]
    pub const fn first(self) -> Self {
        self.at(Position::FIRST)
    }

    /// Target the last match
    #[must_use]
    pub const fn last(self) -> Self {
        self.at(Position::LAST)
    }

    /// Target the n-th match (zero-based)
    #[must_use]
    pub const fn nth(self, n: usize) -> Self {
        self.at(Position::Nth(n))
    }

    /// Target a specific position
    #[must_use]
    pub const fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// The selector chain
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// The text filter, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The position filter, if any
    #[must_use]
    pub const fn position(&self) -> Option<Position> {
        self.position
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector)?;
        if let Some(text) = &self.text {
            write!(f, ":contains(")?;
            write_quoted(f, text)?;
            write!(f, ")")?;
        }
        if let Some(position) = self.position {
            write!(f, "{position}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Locator {
    type Err = AssayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Portable locator representation used in scenario scripts
///
/// Either a bare expression (`".listing-card:first"`) or a structured record
/// (`{css: "button", text: "Buy Now"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocatorSpec {
    /// Bare expression
    Expression(String),
    /// Structured record
    Structured {
        /// Selector chain
        css: String,
        /// Text filter
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Position filter
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Position>,
    },
}

impl TryFrom<&LocatorSpec> for Locator {
    type Error = AssayError;

    fn try_from(spec: &LocatorSpec) -> Result<Self, Self::Error> {
        match spec {
            LocatorSpec::Expression(expr) => Self::parse(expr),
            LocatorSpec::Structured { css, text, index } => {
                let mut locator = Self::parse(css)?;
                if let Some(text) = text {
                    locator = locator.with_text(text.clone());
                }
                if let Some(index) = index {
                    locator = locator.at(*index);
                }
                Ok(locator)
            }
        }
    }
}

fn invalid(expression: &str, message: impl Into<String>) -> AssayError {
    AssayError::InvalidLocator {
        expression: expression.to_string(),
        message: message.into(),
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            write!(f, "\\")?;
        }
        write!(f, "{c}")?;
    }
    write!(f, "\"")
}

/// Nesting state while scanning an expression left to right
///
/// Quotes only open right after `(` or `=`, so apostrophes in unquoted
/// text stay literal.
#[derive(Debug, Default)]
struct Scanner {
    depth: usize,
    quote: Option<char>,
    escaped: bool,
    prev: Option<char>,
}

impl Scanner {
    /// Feed one character; returns true when it sits outside brackets and quotes
    fn feed(&mut self, c: char) -> bool {
        if let Some(quote) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == quote {
                self.quote = None;
                self.prev = Some(c);
            }
            return false;
        }
        if c.is_whitespace() {
            return self.depth == 0;
        }
        let prev = self.prev.replace(c);
        match c {
            '"' | '\'' if self.depth > 0 && matches!(prev, Some('(' | '=')) => {
                self.quote = Some(c);
                false
            }
            '(' | '[' => {
                self.depth += 1;
                false
            }
            ')' | ']' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }

    const fn is_balanced(&self) -> bool {
        self.depth == 0 && self.quote.is_none()
    }
}

/// Split a selector chain on top-level whitespace
fn split_compounds(expression: &str) -> Vec<&str> {
    let mut scanner = Scanner::default();
    let mut parts = Vec::new();
    let mut start = None;
    for (i, c) in expression.char_indices() {
        let top = scanner.feed(c);
        if top && c.is_whitespace() {
            if let Some(from) = start.take() {
                parts.push(&expression[from..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(from) = start {
        parts.push(&expression[from..]);
    }
    parts
}

/// Read an attribute value or pseudo argument, unquoting it when quoted
fn unquote(raw: &str, expression: &str) -> AssayResult<String> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Ok(raw.to_string()),
    };
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => break,
            },
            c if c == quote => {
                if chars.next().is_some() {
                    return Err(invalid(expression, "unexpected text after closing quote"));
                }
                return Ok(value);
            }
            c => value.push(c),
        }
    }
    Err(invalid(expression, "unterminated string"))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        let _ = chars.next();
    }
    ident
}

fn parse_compound(part: &str, expression: &str) -> AssayResult<Compound> {
    let mut compound = Compound::default();
    let mut chars = part.chars().peekable();

    if chars.peek() == Some(&'*') {
        let _ = chars.next();
    } else {
        let tag = take_ident(&mut chars);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let id = take_ident(&mut chars);
                if id.is_empty() {
                    return Err(invalid(expression, "expected identifier after '#'"));
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = take_ident(&mut chars);
                if class.is_empty() {
                    return Err(invalid(expression, "expected class name after '.'"));
                }
                compound.classes.push(class);
            }
            '[' => {
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(invalid(expression, "expected attribute name after '['"));
                }
                let mut value = None;
                if chars.peek() == Some(&'=') {
                    let _ = chars.next();
                    let mut scanner = Scanner {
                        depth: 1,
                        prev: Some('='),
                        ..Scanner::default()
                    };
                    let mut raw = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        let _ = scanner.feed(c);
                        if scanner.depth == 0 {
                            closed = true;
                            break;
                        }
                        raw.push(c);
                    }
                    if !closed {
                        return Err(invalid(expression, "unterminated attribute filter"));
                    }
                    value = Some(unquote(&raw, expression)?);
                } else if chars.next() != Some(']') {
                    return Err(invalid(expression, "unterminated attribute filter"));
                }
                compound.attrs.push(AttrFilter { name, value });
            }
            other => {
                return Err(invalid(
                    expression,
                    format!("unexpected character {other:?} in `{part}`"),
                ));
            }
        }
    }

    if compound.tag.is_none() && compound.is_empty() && !part.starts_with('*') {
        return Err(invalid(expression, format!("empty compound `{part}`")));
    }
    Ok(compound)
}

/// Split trailing `:pseudo` filters off an expression.
///
/// Colons inside brackets, parentheses or quotes are not separators.
fn split_pseudos(expression: &str) -> AssayResult<(&str, Vec<&str>)> {
    let mut scanner = Scanner::default();
    let mut base_end = None;
    let mut pseudos = Vec::new();
    let mut current = None;
    for (i, c) in expression.char_indices() {
        if scanner.feed(c) && c == ':' {
            match current.replace(i + 1) {
                Some(from) => pseudos.push(&expression[from..i]),
                None => base_end = Some(i),
            }
        }
    }
    if !scanner.is_balanced() {
        return Err(invalid(expression, "unbalanced parentheses or quotes"));
    }
    let Some(base_end) = base_end else {
        return Ok((expression, Vec::new()));
    };
    if let Some(from) = current {
        pseudos.push(&expression[from..]);
    }
    pseudos.retain(|p| !p.is_empty());
    Ok((expression[..base_end].trim_end(), pseudos))
}

fn apply_pseudo(locator: Locator, pseudo: &str, expression: &str) -> AssayResult<Locator> {
    match pseudo {
        "first" => return Ok(locator.first()),
        "last" => return Ok(locator.last()),
        _ => {}
    }
    let (name, arg) = pseudo
        .strip_suffix(')')
        .and_then(|p| p.split_once('('))
        .ok_or_else(|| invalid(expression, format!("unknown pseudo filter `:{pseudo}`")))?;
    match name {
        "eq" => {
            let n = arg
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid(expression, format!("bad index in `:eq({arg})`")))?;
            Ok(locator.nth(n))
        }
        "contains" => Ok(locator.with_text(unquote(arg, expression)?)),
        other => Err(invalid(expression, format!("unknown pseudo filter `:{other}`"))),
    }
}
