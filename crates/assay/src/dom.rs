//! In-memory document tree rendered by an [`Application`](crate::target::Application).
//!
//! Node slots are never reused: removing a subtree leaves tombstones, so an
//! [`ElementRef`] obtained before the removal can be detected as stale.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::locator::{Compound, Locator};

/// Stable identifier of a node slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// The document root
    pub const ROOT: Self = Self(0);

    /// Raw slot index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Reference to an element, remembering the locator that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    node: NodeId,
    locator: Arc<str>,
}

impl ElementRef {
    /// Create a reference to `node` described by `locator`
    #[must_use]
    pub fn new(node: NodeId, locator: impl Into<Arc<str>>) -> Self {
        Self {
            node,
            locator: locator.into(),
        }
    }

    /// The referenced node
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// The locator this reference was resolved from
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// Declarative description of an element to insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSpec {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
    text: String,
    value: String,
    styles: BTreeMap<String, String>,
    hidden: bool,
}

impl ElementSpec {
    /// Create a spec for `tag`
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set the id
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a class
    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the initial form control value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Set a computed style property
    #[must_use]
    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.styles.insert(property.into(), value.into());
        self
    }

    /// Start hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// A live element in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name (lowercase)
    pub tag: String,
    /// Id attribute
    pub id: Option<String>,
    /// Class list
    pub classes: Vec<String>,
    /// Other attributes
    pub attrs: BTreeMap<String, String>,
    /// Own text (not including descendants)
    pub text: String,
    /// Form control value
    pub value: String,
    /// Computed style properties
    pub styles: BTreeMap<String, String>,
    /// Explicitly hidden
    pub hidden: bool,
}

impl Element {
    fn from_spec(spec: ElementSpec) -> Self {
        Self {
            tag: spec.tag,
            id: spec.id,
            classes: spec.classes,
            attrs: spec.attrs,
            text: spec.text,
            value: spec.value,
            styles: spec.styles,
            hidden: spec.hidden,
        }
    }

    /// Whether this element has `class`
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn self_hidden(&self) -> bool {
        self.hidden || self.styles.get("display").is_some_and(|d| d == "none")
    }

    fn matches(&self, compound: &Compound) -> bool {
        if compound.tag.as_ref().is_some_and(|t| *t != self.tag) {
            return false;
        }
        if compound.id.is_some() && compound.id != self.id {
            return false;
        }
        if !compound.classes.iter().all(|c| self.has_class(c)) {
            return false;
        }
        compound.attrs.iter().all(|filter| {
            let actual = match filter.name.as_str() {
                "id" => self.id.as_deref(),
                "value" => Some(self.value.as_str()),
                name => self.attrs.get(name).map(String::as_str),
            };
            match (&filter.value, actual) {
                (None, Some(_)) => true,
                (Some(expected), Some(actual)) => expected == actual,
                (_, None) => false,
            }
        })
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    element: Element,
}

/// Read-only view of an element, with derived properties resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementView {
    /// Tag name
    pub tag: String,
    /// Full text content (own text plus descendants, space-joined)
    pub text: String,
    /// Form control value
    pub value: String,
    /// Effective visibility (self and every ancestor shown)
    pub visible: bool,
    /// Computed styles
    pub styles: BTreeMap<String, String>,
    /// Attributes (including `id`)
    pub attrs: BTreeMap<String, String>,
}

/// The document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<Node>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a `body` root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                parent: None,
                children: Vec::new(),
                element: Element::from_spec(ElementSpec::new("body")),
            })],
        }
    }

    /// Remove every node below the root
    pub fn clear(&mut self) {
        let children = self.children(NodeId::ROOT);
        for child in children {
            self.remove(child);
        }
    }

    /// Append a new element under `parent`; returns `None` if `parent` is gone
    pub fn append(&mut self, parent: NodeId, spec: ElementSpec) -> Option<NodeId> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            parent: Some(parent),
            children: Vec::new(),
            element: Element::from_spec(spec),
        }));
        if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        Some(id)
    }

    /// Remove `node` and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, node: NodeId) {
        if node == NodeId::ROOT {
            return;
        }
        let Some(removed) = self.nodes.get_mut(node.0).and_then(Option::take) else {
            return;
        };
        if let Some(parent) = removed.parent {
            if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
                p.children.retain(|c| *c != node);
            }
        }
        for child in removed.children {
            self.remove_detached(child);
        }
    }

    fn remove_detached(&mut self, node: NodeId) {
        if let Some(removed) = self.nodes.get_mut(node.0).and_then(Option::take) {
            for child in removed.children {
                self.remove_detached(child);
            }
        }
    }

    /// Remove every child of `node`
    pub fn clear_children(&mut self, node: NodeId) {
        for child in self.children(node) {
            self.remove(child);
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Whether `node` is still attached
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    /// Borrow an element
    #[must_use]
    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.node(node).map(|n| &n.element)
    }

    /// Mutably borrow an element
    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.nodes
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .map(|n| &mut n.element)
    }

    /// Children of `node` in order
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    /// Parent of `node`
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// First attached element with the given id
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .find(|n| self.element(*n).is_some_and(|e| e.id.as_deref() == Some(id)))
    }

    /// Number of attached elements (excluding the root)
    #[must_use]
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Whether the document has no elements below the root
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children(NodeId::ROOT).is_empty()
    }

    /// All attached nodes below the root, in document order
    fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(NodeId::ROOT).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).into_iter().rev());
        }
        out
    }

    /// Full text content of `node`
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(node, &mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, node: NodeId, parts: &mut Vec<String>) {
        let Some(n) = self.node(node) else {
            return;
        };
        if !n.element.text.is_empty() {
            parts.push(n.element.text.clone());
        }
        for child in &n.children {
            self.collect_text(*child, parts);
        }
    }

    /// Effective visibility: the node and all its ancestors are shown
    #[must_use]
    pub fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.node(id) else {
                return false;
            };
            if n.element.self_hidden() {
                return false;
            }
            current = n.parent;
        }
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn matches_chain(&self, node: NodeId, chain: &[Compound]) -> bool {
        let Some((subject, ancestors)) = chain.split_last() else {
            return false;
        };
        if !self.element(node).is_some_and(|e| e.matches(subject)) {
            return false;
        }
        // Right-to-left: each remaining compound must match some ancestor,
        // nearer compounds matching nearer ancestors.
        let mut remaining = ancestors;
        let mut current = self.parent(node);
        while let Some((compound, rest)) = remaining.split_last() {
            loop {
                let Some(id) = current else {
                    return false;
                };
                current = self.parent(id);
                if id != NodeId::ROOT && self.element(id).is_some_and(|e| e.matches(compound)) {
                    break;
                }
            }
            remaining = rest;
        }
        true
    }

    /// Resolve `locator` to the currently matching elements. Never blocks.
    ///
    /// With a text filter only the deepest matching elements are kept, so a
    /// wrapper `div` does not shadow the `div` that actually holds the text.
    #[must_use]
    pub fn query(&self, locator: &Locator) -> Vec<ElementRef> {
        let chain = locator.selector().chain();
        let mut matched: Vec<NodeId> = self
            .walk()
            .into_iter()
            .filter(|n| self.matches_chain(*n, chain))
            .collect();

        if let Some(text) = locator.text() {
            matched.retain(|n| self.text_content(*n).contains(text));
            let snapshot = matched.clone();
            matched.retain(|n| !snapshot.iter().any(|other| self.is_ancestor(*n, *other)));
        }

        if let Some(position) = locator.position() {
            matched = position
                .pick(matched.len())
                .map(|i| vec![matched[i]])
                .unwrap_or_default();
        }

        let description: Arc<str> = locator.to_string().into();
        matched
            .into_iter()
            .map(|n| ElementRef::new(n, Arc::clone(&description)))
            .collect()
    }

    /// Resolved view of an attached element
    #[must_use]
    pub fn view(&self, node: NodeId) -> Option<ElementView> {
        let element = self.element(node)?;
        let mut attrs = element.attrs.clone();
        if let Some(id) = &element.id {
            let _ = attrs.insert("id".to_string(), id.clone());
        }
        if !element.classes.is_empty() {
            let _ = attrs.insert("class".to_string(), element.classes.join(" "));
        }
        Some(ElementView {
            tag: element.tag.clone(),
            text: self.text_content(node),
            value: element.value.clone(),
            visible: self.is_visible(node),
            styles: element.styles.clone(),
            attrs,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn nav_document() -> (Document, NodeId) {
        let mut doc = Document::new();
        let menu = doc
            .append(NodeId::ROOT, ElementSpec::new("nav").class("mobile-nav-menu").hidden())
            .unwrap();
        let _ = doc
            .append(menu, ElementSpec::new("a").attr("href", "/marketplace").text("Marketplace"))
            .unwrap();
        let _ = doc
            .append(menu, ElementSpec::new("a").attr("href", "/dashboard").text("Dashboard"))
            .unwrap();
        (doc, menu)
    }

    mod query {
        use super::*;

        #[test]
        fn test_descendant_and_text() {
            let (doc, _) = nav_document();
            let loc = Locator::parse(".mobile-nav-menu a")
                .unwrap()
                .with_text("Dashboard");
            let found = doc.query(&loc);
            assert_eq!(found.len(), 1);
            assert_eq!(
                doc.element(found[0].node()).unwrap().attrs["href"],
                "/dashboard"
            );
        }

        #[test]
        fn test_attribute_selector() {
            let (doc, _) = nav_document();
            let loc = Locator::parse("a[href=/marketplace]").unwrap();
            assert_eq!(doc.query(&loc).len(), 1);
        }

        #[test]
        fn test_deepest_text_match_wins() {
            let mut doc = Document::new();
            let outer = doc.append(NodeId::ROOT, ElementSpec::new("div")).unwrap();
            let inner = doc
                .append(outer, ElementSpec::new("div").text("Purchase successful!"))
                .unwrap();
            let loc = Locator::parse("div").unwrap().with_text("Purchase successful!");
            let found = doc.query(&loc);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].node(), inner);
        }

        #[test]
        fn test_position() {
            let (doc, _) = nav_document();
            let last = doc.query(&Locator::parse("a:last").unwrap());
            assert_eq!(doc.text_content(last[0].node()), "Dashboard");
            assert!(doc.query(&Locator::parse("a:eq(7)").unwrap()).is_empty());
        }

        #[test]
        fn test_ref_remembers_locator() {
            let (doc, _) = nav_document();
            let found = doc.query(&Locator::parse("a:first").unwrap());
            assert_eq!(found[0].locator(), "a:first");
        }
    }

    mod visibility {
        use super::*;

        #[test]
        fn test_hidden_ancestor_hides_children() {
            let (mut doc, menu) = nav_document();
            let link = doc.query(&Locator::parse("a:first").unwrap())[0].node();
            assert!(!doc.is_visible(link));
            doc.element_mut(menu).unwrap().hidden = false;
            assert!(doc.is_visible(link));
        }

        #[test]
        fn test_display_none_style() {
            let mut doc = Document::new();
            let node = doc
                .append(NodeId::ROOT, ElementSpec::new("div").style("display", "none"))
                .unwrap();
            assert!(!doc.is_visible(node));
        }
    }

    mod removal {
        use super::*;

        #[test]
        fn test_removed_subtree_is_detached() {
            let (mut doc, menu) = nav_document();
            let link = doc.query(&Locator::parse("a:first").unwrap())[0].node();
            doc.remove(menu);
            assert!(!doc.contains(menu));
            assert!(!doc.contains(link));
            assert!(doc.is_empty());
        }

        #[test]
        fn test_slots_are_not_reused() {
            let (mut doc, menu) = nav_document();
            doc.remove(menu);
            let fresh = doc.append(NodeId::ROOT, ElementSpec::new("nav")).unwrap();
            assert_ne!(fresh, menu);
            assert!(!doc.contains(menu));
        }

        #[test]
        fn test_clear_keeps_root() {
            let (mut doc, _) = nav_document();
            doc.clear();
            assert!(doc.contains(NodeId::ROOT));
            assert_eq!(doc.len(), 0);
        }
    }

    #[test]
    fn test_view_resolves_text_and_attrs() {
        let (doc, menu) = nav_document();
        let view = doc.view(menu).unwrap();
        assert_eq!(view.text, "Marketplace Dashboard");
        assert_eq!(view.attrs["class"], "mobile-nav-menu");
        assert!(!view.visible);
    }
}
