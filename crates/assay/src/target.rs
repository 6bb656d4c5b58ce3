//! Target Handle
//!
//! The engine's view of one live surface under test: the current location,
//! the viewport, the rendered document, a per-page session store and the
//! injected-capability table.
//!
//! The surface itself is an [`Application`]. It renders into a shared
//! [`Page`] and reacts to dispatched events; deferred renders (network
//! responses, animations) run as tokio tasks spawned through the page so a
//! reset can abort them.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::dom::{Document, ElementRef, ElementView, NodeId};
use crate::event::{Action, DomEvent, ScrollTarget};
use crate::locator::Locator;
use crate::mock::{CapabilityDescriptor, CapabilityError, MockLayer};
use crate::result::{AssayError, AssayResult};
use crate::viewport::Viewport;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default navigation timeout (10 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 10_000;

/// Location of a freshly reset handle
pub const BLANK: &str = "about:blank";

/// Estimated layout height of one element, used for scroll geometry
pub const ROW_HEIGHT_PX: u32 = 48;

/// Estimated content height of a document with `rows` elements
#[must_use]
pub fn content_height(rows: usize) -> u32 {
    u32::try_from(rows)
        .unwrap_or(u32::MAX)
        .saturating_mul(ROW_HEIGHT_PX)
}

// =============================================================================
// APPLICATION SEAM
// =============================================================================

/// Scroll state reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPosition {
    /// Vertical offset in pixels
    pub y: u32,
    /// Whether the viewport reaches the end of the content
    pub at_bottom: bool,
}

/// A UI under test
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Capabilities this application consumes (e.g. a wallet provider)
    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        Vec::new()
    }

    /// Render the page at `page.location()`. An `Err` refuses the route.
    async fn load(&self, page: &Page) -> Result<(), String>;

    /// React to an event dispatched on `target`
    fn on_event(&self, page: &Page, target: NodeId, event: &DomEvent);

    /// React to a scroll
    fn on_scroll(&self, _page: &Page, _position: ScrollPosition) {}
}

/// Mutable state of one page
#[derive(Debug, Clone)]
pub struct PageState {
    /// Rendered elements
    pub document: Document,
    /// Current URL
    pub location: String,
    /// Current viewport
    pub viewport: Viewport,
    /// Vertical scroll offset
    pub scroll_y: u32,
    /// Application state that survives in-app navigation but not a full load
    pub session: BTreeMap<String, Value>,
}

struct PageInner {
    base_url: String,
    state: Mutex<PageState>,
    tasks: Mutex<Vec<AbortHandle>>,
    mocks: MockLayer,
}

/// Cloneable handle the application renders through
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("base_url", &self.inner.base_url)
            .field("location", &self.location())
            .finish()
    }
}

impl Page {
    fn new(base_url: &str, viewport: Viewport) -> Self {
        Self {
            inner: Arc::new(PageInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                state: Mutex::new(PageState {
                    document: Document::new(),
                    location: BLANK.to_string(),
                    viewport,
                    scroll_y: 0,
                    session: BTreeMap::new(),
                }),
                tasks: Mutex::new(Vec::new()),
                mocks: MockLayer::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the document
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.state().document)
    }

    /// Run `f` against the whole page state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        f(&mut self.state())
    }

    /// Current URL
    #[must_use]
    pub fn location(&self) -> String {
        self.state().location.clone()
    }

    /// Path component of the current URL (always starts with `/`)
    #[must_use]
    pub fn path(&self) -> String {
        path_of(&self.location())
    }

    /// Current viewport
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.state().viewport
    }

    /// Resolve `url` against the base URL
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        resolve_url(&self.inner.base_url, url)
    }

    /// In-app navigation: change location and clear the document without a reload.
    ///
    /// Pending background renders from the previous route are aborted; the
    /// session store is kept.
    pub fn route(&self, url: &str) {
        let url = self.resolve(url);
        tracing::debug!(%url, "in-app navigation");
        self.abort_tasks();
        let mut state = self.state();
        state.location = url;
        state.scroll_y = 0;
        state.document.clear();
    }

    /// Read a session value
    #[must_use]
    pub fn session(&self, key: &str) -> Option<Value> {
        self.state().session.get(key).cloned()
    }

    /// Write a session value
    pub fn set_session(&self, key: impl Into<String>, value: impl Into<Value>) {
        let _ = self.state().session.insert(key.into(), value.into());
    }

    /// Remove a session value
    pub fn remove_session(&self, key: &str) -> Option<Value> {
        self.state().session.remove(key)
    }

    /// Spawn a background render task, aborted on reset or navigation
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future).abort_handle();
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Number of background tasks still running
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }

    fn abort_tasks(&self) {
        let tasks: Vec<AbortHandle> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
    }

    /// Client for an injected capability
    #[must_use]
    pub fn capability(&self, name: &str) -> CapabilityClient {
        CapabilityClient {
            name: name.to_string(),
            mocks: self.inner.mocks.clone(),
        }
    }

    /// The page's capability table
    #[must_use]
    pub fn mocks(&self) -> &MockLayer {
        &self.inner.mocks
    }
}

/// Handle for calling one capability from application code
#[derive(Debug, Clone)]
pub struct CapabilityClient {
    name: String,
    mocks: MockLayer,
}

impl CapabilityClient {
    /// Invoke `method`; the installed behavior is resolved at this moment
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, CapabilityError> {
        self.mocks.invoke(&self.name, method, args).await
    }
}

// =============================================================================
// TARGET HANDLE
// =============================================================================

/// Handle to one surface under test. Never shared across scenarios.
pub struct TargetHandle {
    app: Arc<dyn Application>,
    page: Page,
    navigation_timeout: Duration,
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetHandle")
            .field("app", &self.app.name())
            .field("page", &self.page)
            .field("navigation_timeout", &self.navigation_timeout)
            .finish()
    }
}

impl TargetHandle {
    /// Create a handle for `app` with relative URLs resolved against `base_url`
    #[must_use]
    pub fn new(app: Arc<dyn Application>, base_url: &str) -> Self {
        let page = Page::new(base_url, Viewport::default());
        for descriptor in app.capabilities() {
            page.mocks().register(descriptor);
        }
        Self {
            app,
            page,
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
        }
    }

    /// Set the navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the initial viewport
    #[must_use]
    pub fn with_viewport(self, viewport: Viewport) -> Self {
        self.set_viewport(viewport);
        self
    }

    /// The application under test
    #[must_use]
    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    /// The page the application renders into
    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to `url` (absolute, or relative to the base URL) and wait for load.
    ///
    /// This is a full load: the session store is cleared, unlike in-app
    /// navigation through [`Page::route`].
    ///
    /// # Errors
    ///
    /// `NavigationError` if the application refuses the route or does not
    /// finish loading within the navigation timeout.
    pub async fn navigate(&self, url: &str) -> AssayResult<()> {
        let url = self.page.resolve(url);
        tracing::debug!(%url, app = self.app.name(), "navigate");
        self.page.with_state(|state| state.session.clear());
        self.page.route(&url);
        match tokio::time::timeout(self.navigation_timeout, self.app.load(&self.page)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(AssayError::NavigationError { url, message }),
            Err(_) => Err(AssayError::NavigationError {
                url,
                message: format!(
                    "load did not complete within {}ms",
                    self.navigation_timeout.as_millis()
                ),
            }),
        }
    }

    /// Reload the current location
    pub async fn reload(&self) -> AssayResult<()> {
        let location = self.page.location();
        if location == BLANK {
            return Err(AssayError::InvalidState {
                message: "cannot reload before the first navigation".to_string(),
            });
        }
        self.navigate(&location).await
    }

    /// Elements currently matching `locator`. Never blocks.
    #[must_use]
    pub fn query(&self, locator: &Locator) -> Vec<ElementRef> {
        self.page.with_document(|doc| doc.query(locator))
    }

    /// Dispatch `action` on `element`.
    ///
    /// Composite actions are delivered as one uninterrupted batch of events.
    ///
    /// # Errors
    ///
    /// `TargetUnavailable` if the element was removed since it was queried.
    pub fn mutate(&self, element: &ElementRef, action: &Action) -> AssayResult<()> {
        let node = element.node();
        let attached = self.page.with_document(|doc| {
            let Some(el) = doc.element_mut(node) else {
                return false;
            };
            match action {
                Action::Type { text } => el.value.push_str(text),
                Action::Clear => el.value.clear(),
                _ => {}
            }
            true
        });
        if !attached {
            return Err(AssayError::TargetUnavailable {
                locator: element.locator().to_string(),
            });
        }

        tracing::debug!(locator = element.locator(), %action, "dispatch");
        for event in action.events() {
            self.app.on_event(&self.page, node, &event);
        }
        Ok(())
    }

    /// Scroll the page and notify the application
    pub fn scroll(&self, target: ScrollTarget) -> ScrollPosition {
        let position = self.page.with_state(|state| {
            let content = content_height(state.document.len());
            let max = content.saturating_sub(state.viewport.height);
            let y = match target {
                ScrollTarget::Top => 0,
                ScrollTarget::Bottom => max,
                ScrollTarget::Offset(y) => y.min(max),
            };
            state.scroll_y = y;
            ScrollPosition {
                y,
                at_bottom: y >= max,
            }
        });
        tracing::debug!(%target, y = position.y, "scroll");
        self.app.on_scroll(&self.page, position);
        position
    }

    /// Current URL
    #[must_use]
    pub fn location(&self) -> String {
        self.page.location()
    }

    /// Current viewport
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.page.viewport()
    }

    /// Change the viewport; takes effect on the next render
    pub fn set_viewport(&self, viewport: Viewport) {
        self.page.with_state(|state| state.viewport = viewport);
    }

    /// Resolved view of `element`
    pub fn inspect(&self, element: &ElementRef) -> AssayResult<ElementView> {
        self.page
            .with_document(|doc| doc.view(element.node()))
            .ok_or_else(|| AssayError::TargetUnavailable {
                locator: element.locator().to_string(),
            })
    }

    /// Return to a blank state: no document, no session, no mocks, no tasks
    pub fn reset(&self, viewport: Viewport) {
        self.page.abort_tasks();
        self.page.with_state(|state| {
            state.document.clear();
            state.location = BLANK.to_string();
            state.viewport = viewport;
            state.scroll_y = 0;
            state.session.clear();
        });
        self.page.mocks().reset();
        tracing::trace!(%viewport, "target reset");
    }

    /// The injected-capability table
    #[must_use]
    pub fn mocks(&self) -> &MockLayer {
        self.page.mocks()
    }
}

fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url == BLANK {
        url.to_string()
    } else if url.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{}", url.trim_start_matches('/'))
    }
}

/// Path component of `url`
#[must_use]
pub fn path_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    if url.contains("://") {
        rest.find('/').map_or_else(|| "/".to_string(), |i| rest[i..].to_string())
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::ElementSpec;
    use crate::mock::{behaviors, Behavior};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Renders a counter button; clicking removes it after 100ms
    struct Counter {
        clicks: AtomicUsize,
        load_delay: Duration,
    }

    #[async_trait]
    impl Application for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn capabilities(&self) -> Vec<CapabilityDescriptor> {
            vec![CapabilityDescriptor::new("clock", ["now"])]
        }

        async fn load(&self, page: &Page) -> Result<(), String> {
            tokio::time::sleep(self.load_delay).await;
            if page.path() == "/forbidden" {
                return Err("route refused".to_string());
            }
            page.with_document(|doc| {
                doc.append(NodeId::ROOT, ElementSpec::new("button").id("inc").text("+"))
            });
            Ok(())
        }

        fn on_event(&self, page: &Page, target: NodeId, event: &DomEvent) {
            if event.name != "click" {
                return;
            }
            self.clicks.fetch_add(1, Ordering::SeqCst);
            let task_page = page.clone();
            page.spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                task_page.with_document(|doc| doc.remove(target));
            });
        }
    }

    fn handle(load_delay: Duration) -> (Arc<Counter>, TargetHandle) {
        let app = Arc::new(Counter {
            clicks: AtomicUsize::new(0),
            load_delay,
        });
        let handle = TargetHandle::new(app.clone(), "http://localhost:3000/");
        (app, handle)
    }

    mod urls {
        use super::*;

        #[test]
        fn test_resolve() {
            assert_eq!(resolve_url("http://h", "/item/1"), "http://h/item/1");
            assert_eq!(resolve_url("http://h", "sell"), "http://h/sell");
            assert_eq!(resolve_url("http://h", "https://x/y"), "https://x/y");
            assert_eq!(resolve_url("http://h", ""), "http://h/");
        }

        #[test]
        fn test_path_of() {
            assert_eq!(path_of("http://localhost:3000/orders"), "/orders");
            assert_eq!(path_of("http://localhost:3000"), "/");
            assert_eq!(path_of("dashboard"), "/dashboard");
        }
    }

    mod navigation {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_navigate_renders() {
            let (_, handle) = handle(Duration::from_millis(200));
            handle.navigate("/").await.unwrap();
            assert_eq!(handle.location(), "http://localhost:3000/");
            assert_eq!(handle.query(&Locator::parse("#inc").unwrap()).len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_timeout() {
            let (_, handle) = handle(Duration::from_secs(30));
            let handle = handle.with_navigation_timeout(Duration::from_millis(500));
            let err = handle.navigate("/").await.unwrap_err();
            assert!(matches!(err, AssayError::NavigationError { .. }));
            assert!(err.to_string().contains("500ms"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_refused_route() {
            let (_, handle) = handle(Duration::ZERO);
            let err = handle.navigate("/forbidden").await.unwrap_err();
            assert!(err.to_string().contains("route refused"));
        }

        #[tokio::test]
        async fn test_reload_requires_location() {
            let (_, handle) = handle(Duration::ZERO);
            assert!(matches!(
                handle.reload().await.unwrap_err(),
                AssayError::InvalidState { .. }
            ));
        }
    }

    mod mutation {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_click_then_stale() {
            let (app, handle) = handle(Duration::ZERO);
            handle.navigate("/").await.unwrap();
            let button = handle.query(&Locator::parse("#inc").unwrap()).remove(0);
            handle.mutate(&button, &Action::Click).unwrap();
            assert_eq!(app.clicks.load(Ordering::SeqCst), 1);
            // removal is deferred; the element is still attached right after dispatch
            assert!(handle.inspect(&button).is_ok());

            tokio::time::sleep(Duration::from_millis(150)).await;
            let err = handle.mutate(&button, &Action::Click).unwrap_err();
            assert!(matches!(err, AssayError::TargetUnavailable { ref locator } if locator == "#inc"));
            assert_eq!(app.clicks.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_type_appends_value() {
            let (_, handle) = handle(Duration::ZERO);
            handle.navigate("/").await.unwrap();
            let button = handle.query(&Locator::parse("#inc").unwrap()).remove(0);
            handle.mutate(&button, &Action::type_text("ab")).unwrap();
            handle.mutate(&button, &Action::type_text("c")).unwrap();
            assert_eq!(handle.inspect(&button).unwrap().value, "abc");
            handle.mutate(&button, &Action::Clear).unwrap();
            assert_eq!(handle.inspect(&button).unwrap().value, "");
        }
    }

    mod reset {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_reset_clears_everything() {
            let (_, handle) = handle(Duration::ZERO);
            handle.navigate("/").await.unwrap();
            handle.page().set_session("wallet", "abc");
            handle
                .mocks()
                .install("clock", behaviors([("now", Behavior::resolves_with(1))]))
                .unwrap();
            let button = handle.query(&Locator::parse("#inc").unwrap()).remove(0);
            handle.mutate(&button, &Action::Click).unwrap();
            assert_eq!(handle.page().pending_tasks(), 1);

            handle.reset(Viewport::new(1920, 1080));
            assert_eq!(handle.location(), BLANK);
            assert!(handle.page().session("wallet").is_none());
            assert!(!handle.mocks().is_installed("clock"));
            assert_eq!(handle.viewport(), Viewport::new(1920, 1080));
            assert_eq!(handle.page().pending_tasks(), 0);
            assert_eq!(handle.mocks().known(), vec!["clock".to_string()]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_geometry() {
        let (_, handle) = handle(Duration::ZERO);
        handle.navigate("/").await.unwrap();
        // one element never exceeds the viewport
        let position = handle.scroll(ScrollTarget::Bottom);
        assert_eq!(position, ScrollPosition { y: 0, at_bottom: true });
    }

    #[test]
    fn test_content_height_saturates() {
        assert_eq!(content_height(0), 0);
        assert_eq!(content_height(10), 10 * ROW_HEIGHT_PX);
        assert_eq!(content_height(usize::MAX), u32::MAX);
        assert_eq!(content_height(u32::MAX as usize / 2), u32::MAX);
    }
}
