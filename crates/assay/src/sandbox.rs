//! Reference marketplace application.
//!
//! A small mobile-first storefront that renders asynchronously the way a
//! single-page app does: pages load after a delay, purchases wait on a wallet
//! signature and a confirmation, and the listing grid grows when the user
//! scrolls to the bottom. The `wallet` capability has no real provider, so
//! every wallet call has to be mocked.
//!
//! Interactive elements carry a `data-action` attribute; clicks bubble up
//! from the dispatched node to the nearest element that has one.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::dom::{Document, ElementSpec, NodeId};
use crate::event::DomEvent;
use crate::mock::{Capability, CapabilityDescriptor, CapabilityError};
use crate::target::{Application, Page, ScrollPosition};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Name of the wallet capability
pub const WALLET: &str = "wallet";

/// Methods of the wallet capability
pub const WALLET_METHODS: [&str; 3] = ["connect", "disconnect", "signTransaction"];

/// Message shown when the wallet refuses to connect
pub const WALLET_ERROR: &str = "Wallet connection failed. Please try again.";

/// Message shown when the listing form is incomplete
pub const LISTING_INVALID: &str = "Please provide a name and a valid price.";

/// Cards rendered per page of the listing grid
pub const PAGE_SIZE: usize = 5;

/// Number of listings in the catalog
pub const CATALOG_SIZE: u32 = 20;

const CAROUSEL_SLIDES: usize = 3;
const SWIPE_THRESHOLD_PX: f64 = 50.0;
const CATEGORIES: [&str; 3] = ["AI Agent", "Dataset", "Model"];
const NAV_LINKS: [(&str, &str); 3] = [
    ("Marketplace", "/marketplace"),
    ("Dashboard", "/dashboard"),
    ("Sell Item", "/sell"),
];

const SESSION_WALLET: &str = "wallet";
const SESSION_ORDERS: &str = "orders";
const SESSION_LISTINGS: &str = "listings";
const SESSION_LOADING: &str = "marketplace.loading";
const SESSION_QUERY: &str = "marketplace.query";
const SESSION_TOUCH_START: &str = "carousel.start";
const SESSION_TOUCH_LAST: &str = "carousel.last";
const SESSION_SLIDE: &str = "carousel.slide";

// =============================================================================
// TIMING AND CATALOG
// =============================================================================

/// Simulated latencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxTiming {
    /// Delay before a full page load renders
    pub page_load: Duration,
    /// Round trip of a backend or wallet request
    pub network: Duration,
    /// Time for a signed transaction to confirm
    pub confirmation: Duration,
    /// Delay between a successful purchase and the redirect to `/orders`
    pub redirect: Duration,
}

impl Default for SandboxTiming {
    fn default() -> Self {
        Self {
            page_load: Duration::from_millis(300),
            network: Duration::from_millis(400),
            confirmation: Duration::from_millis(5000),
            redirect: Duration::from_millis(1500),
        }
    }
}

impl SandboxTiming {
    /// Millisecond-scale latencies for unit tests
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            page_load: Duration::from_millis(10),
            network: Duration::from_millis(20),
            confirmation: Duration::from_millis(50),
            redirect: Duration::from_millis(50),
        }
    }
}

/// One listing in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    /// Listing id, used in `/item/{id}`
    pub id: u32,
    /// Display name
    pub name: String,
    /// Category label
    pub category: String,
    /// Price in SOL
    pub price: f64,
}

fn default_catalog() -> Vec<CatalogItem> {
    (1..=CATALOG_SIZE)
        .map(|id| {
            let category = CATEGORIES[(id as usize - 1) % CATEGORIES.len()];
            let name = if id == 1 {
                "Test AI Agent".to_string()
            } else {
                format!("{category} #{id}")
            };
            CatalogItem {
                id,
                name,
                category: category.to_string(),
                price: 0.5 + f64::from(id - 1) * 0.25,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Home,
    Marketplace,
    Item(u32),
    Sell,
    Dashboard,
    Orders,
}

impl Route {
    fn parse(path: &str) -> Option<Self> {
        let path = path.split(|c| c == '?' || c == '#').next().unwrap_or(path);
        match path.trim_end_matches('/') {
            "" => Some(Self::Home),
            "/marketplace" => Some(Self::Marketplace),
            "/sell" => Some(Self::Sell),
            "/dashboard" => Some(Self::Dashboard),
            "/orders" => Some(Self::Orders),
            other => other
                .strip_prefix("/item/")
                .and_then(|id| id.parse().ok())
                .map(Self::Item),
        }
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Wallet provider of a browser without a wallet extension
#[derive(Debug)]
struct MissingProvider;

#[async_trait]
impl Capability for MissingProvider {
    async fn call(&self, _method: &str, _args: Value) -> Result<Value, CapabilityError> {
        Err(CapabilityError::Rejected(
            "wallet provider not installed".to_string(),
        ))
    }
}

/// The marketplace application
#[derive(Debug, Clone)]
pub struct Marketplace {
    shop: Arc<Shop>,
}

#[derive(Debug)]
struct Shop {
    timing: SandboxTiming,
    catalog: Vec<CatalogItem>,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl Marketplace {
    /// Marketplace with realistic latencies
    #[must_use]
    pub fn new() -> Self {
        Self::with_timing(SandboxTiming::default())
    }

    /// Marketplace with custom latencies
    #[must_use]
    pub fn with_timing(timing: SandboxTiming) -> Self {
        Self {
            shop: Arc::new(Shop {
                timing,
                catalog: default_catalog(),
            }),
        }
    }

    /// Configured latencies
    #[must_use]
    pub fn timing(&self) -> SandboxTiming {
        self.shop.timing
    }

    /// All listings
    #[must_use]
    pub fn catalog(&self) -> &[CatalogItem] {
        &self.shop.catalog
    }
}

#[async_trait]
impl Application for Marketplace {
    fn name(&self) -> &str {
        "marketplace"
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        vec![CapabilityDescriptor::new(WALLET, WALLET_METHODS).with_real(Arc::new(MissingProvider))]
    }

    async fn load(&self, page: &Page) -> Result<(), String> {
        tokio::time::sleep(self.shop.timing.page_load).await;
        self.shop.render(page)
    }

    fn on_event(&self, page: &Page, target: NodeId, event: &DomEvent) {
        match event.name.as_str() {
            "click" => {
                if let Some(clicked) = page.with_document(|doc| Clicked::find(doc, target)) {
                    self.shop.click(page, clicked);
                }
            }
            "touchstart" | "touchmove" | "touchend" => self.shop.touch(page, target, event),
            _ => {}
        }
    }

    fn on_scroll(&self, page: &Page, position: ScrollPosition) {
        if position.at_bottom && Route::parse(&page.path()) == Some(Route::Marketplace) {
            self.shop.load_more(page);
        }
    }
}

/// The element a click resolved to
#[derive(Debug)]
struct Clicked {
    action: String,
    href: Option<String>,
    item: Option<u32>,
}

impl Clicked {
    fn find(doc: &Document, node: NodeId) -> Option<Self> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(element) = doc.element(id) {
                if let Some(action) = element.attrs.get("data-action") {
                    return Some(Self {
                        action: action.clone(),
                        href: element.attrs.get("href").cloned(),
                        item: element.attrs.get("data-item").and_then(|v| v.parse().ok()),
                    });
                }
            }
            current = doc.parent(id);
        }
        None
    }
}

// =============================================================================
// BEHAVIOR
// =============================================================================

impl Shop {
    fn item(&self, id: u32) -> Option<&CatalogItem> {
        self.catalog.iter().find(|item| item.id == id)
    }

    fn click(self: &Arc<Self>, page: &Page, clicked: Clicked) {
        tracing::debug!(action = %clicked.action, "click");
        match clicked.action.as_str() {
            "toggle-menu" => toggle(page, "nav-menu"),
            "toggle-search" => toggle(page, "search-form"),
            "navigate" => {
                if let Some(href) = clicked.href {
                    self.navigate(page, &href);
                }
            }
            "open-item" => {
                if let Some(id) = clicked.item {
                    self.navigate(page, &format!("/item/{id}"));
                }
            }
            "connect-wallet" => self.connect_wallet(page),
            "search" => self.search(page),
            "buy" => {
                if let Some(id) = clicked.item {
                    self.buy(page, id);
                }
            }
            "create-listing" => self.create_listing(page),
            other => tracing::trace!(action = other, "unhandled action"),
        }
    }

    /// In-app navigation: no load delay, session kept
    fn navigate(&self, page: &Page, href: &str) {
        page.route(href);
        if let Err(message) = self.render(page) {
            tracing::warn!(%href, %message, "route refused");
        }
    }

    async fn connect(&self, page: &Page) -> Result<String, CapabilityError> {
        let response = page.capability(WALLET).call("connect", json!({})).await?;
        let address = response
            .get("publicKey")
            .and_then(Value::as_str)
            .map_or_else(|| response.to_string(), str::to_string);
        page.set_session(SESSION_WALLET, address.clone());
        page.with_document(|doc| {
            if let Some(area) = doc.by_id("wallet-area") {
                wallet_widget(doc, area, Some(&address));
            }
            hide(doc, "error");
        });
        Ok(address)
    }

    /// The connected address, connecting first if needed
    async fn wallet(&self, page: &Page) -> Result<String, CapabilityError> {
        match page.session(SESSION_WALLET).and_then(|v| v.as_str().map(str::to_string)) {
            Some(address) => Ok(address),
            None => self.connect(page).await,
        }
    }

    fn connect_wallet(self: &Arc<Self>, page: &Page) {
        let shop = Arc::clone(self);
        let task_page = page.clone();
        page.spawn(async move {
            if let Err(e) = shop.connect(&task_page).await {
                tracing::warn!(error = %e, "wallet connection failed");
                set_text(&task_page, "error", WALLET_ERROR);
            }
        });
    }

    fn buy(self: &Arc<Self>, page: &Page, id: u32) {
        let Some(item) = self.item(id).cloned() else {
            return;
        };
        set_text(page, "tx-status", "Transaction in progress...");
        let shop = Arc::clone(self);
        let task_page = page.clone();
        page.spawn(async move {
            let page = task_page;
            let timing = shop.timing;
            let signed: Result<Value, CapabilityError> = async {
                let buyer = shop.wallet(&page).await?;
                tokio::time::sleep(timing.network).await;
                page.capability(WALLET)
                    .call(
                        "signTransaction",
                        json!({ "buyer": buyer, "item": item.id, "amount": item.price }),
                    )
                    .await
            }
            .await;

            match signed {
                Ok(receipt) => {
                    tokio::time::sleep(timing.confirmation).await;
                    push_session(
                        &page,
                        SESSION_ORDERS,
                        json!({
                            "item": item.id,
                            "name": item.name,
                            "signature": receipt.get("signature").cloned().unwrap_or(Value::Null),
                        }),
                    );
                    set_text(&page, "tx-status", "Purchase successful!");
                    tokio::time::sleep(timing.redirect).await;
                    shop.navigate(&page, "/orders");
                }
                Err(e) => {
                    tracing::warn!(item = item.id, error = %e, "purchase failed");
                    set_text(&page, "tx-status", &format!("Transaction failed: {e}"));
                }
            }
        });
    }

    fn create_listing(self: &Arc<Self>, page: &Page) {
        let [name, price, description] =
            page.with_document(|doc| ["name", "price", "description"].map(|id| value_of(doc, id)));
        let price = match price.parse::<f64>() {
            Ok(price) if price > 0.0 && !name.is_empty() => price,
            _ => {
                set_text(page, "error", LISTING_INVALID);
                return;
            }
        };
        page.with_document(|doc| hide(doc, "error"));
        set_text(page, "listing-status", "Creating listing...");

        let shop = Arc::clone(self);
        let task_page = page.clone();
        page.spawn(async move {
            let page = task_page;
            let timing = shop.timing;
            let signed: Result<Value, CapabilityError> = async {
                let seller = shop.wallet(&page).await?;
                tokio::time::sleep(timing.network).await;
                page.capability(WALLET)
                    .call(
                        "signTransaction",
                        json!({ "seller": seller, "listing": name, "amount": price }),
                    )
                    .await
            }
            .await;

            match signed {
                Ok(_) => {
                    tokio::time::sleep(timing.confirmation).await;
                    push_session(
                        &page,
                        SESSION_LISTINGS,
                        json!({ "name": name, "price": price, "description": description }),
                    );
                    set_text(&page, "listing-status", "Listing created successfully!");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "listing failed");
                    set_text(&page, "listing-status", &format!("Listing failed: {e}"));
                }
            }
        });
    }

    fn search(self: &Arc<Self>, page: &Page) {
        let query = page.with_document(|doc| value_of(doc, "search"));
        if query.is_empty() {
            let _ = page.remove_session(SESSION_QUERY);
        } else {
            page.set_session(SESSION_QUERY, query.clone());
        }
        set_hidden(page, "loading", false);

        let shop = Arc::clone(self);
        let task_page = page.clone();
        page.spawn(async move {
            tokio::time::sleep(shop.timing.network).await;
            let needle = query.to_lowercase();
            let results: Vec<&CatalogItem> = if needle.is_empty() {
                shop.catalog.iter().take(PAGE_SIZE).collect()
            } else {
                shop.catalog
                    .iter()
                    .filter(|item| {
                        item.name.to_lowercase().contains(&needle)
                            || item.category.to_lowercase().contains(&needle)
                    })
                    .collect()
            };
            tracing::debug!(%query, results = results.len(), "search");
            task_page.with_state(|state| {
                let mobile = state.viewport.is_mobile();
                let doc = &mut state.document;
                if let Some(grid) = doc.by_id("listing-grid") {
                    doc.clear_children(grid);
                    for item in results {
                        card(doc, grid, item, mobile);
                    }
                }
                hide(doc, "loading");
            });
        });
    }

    /// Append the next page of cards after a network round trip
    fn load_more(self: &Arc<Self>, page: &Page) {
        if page.session(SESSION_LOADING).is_some() || page.session(SESSION_QUERY).is_some() {
            return;
        }
        let shown = page.with_document(|doc| {
            doc.by_id("listing-grid")
                .map_or(0, |grid| doc.children(grid).len())
        });
        if shown >= self.catalog.len() {
            return;
        }
        page.set_session(SESSION_LOADING, true);
        set_hidden(page, "loading", false);

        let shop = Arc::clone(self);
        let task_page = page.clone();
        page.spawn(async move {
            tokio::time::sleep(shop.timing.network).await;
            let next = &shop.catalog[shown..(shown + PAGE_SIZE).min(shop.catalog.len())];
            tracing::debug!(from = shown, count = next.len(), "lazy load");
            task_page.with_state(|state| {
                let mobile = state.viewport.is_mobile();
                let doc = &mut state.document;
                if let Some(grid) = doc.by_id("listing-grid") {
                    for item in next {
                        card(doc, grid, item, mobile);
                    }
                }
                hide(doc, "loading");
                let _ = state.session.remove(SESSION_LOADING);
            });
        });
    }

    fn touch(&self, page: &Page, target: NodeId, event: &DomEvent) {
        if !page.with_document(|doc| within_class(doc, target, "carousel")) {
            return;
        }
        let x = event.touches.first().map(|t| f64::from(t.client_x));
        match (event.name.as_str(), x) {
            ("touchstart", Some(x)) => {
                page.set_session(SESSION_TOUCH_START, x);
                let _ = page.remove_session(SESSION_TOUCH_LAST);
            }
            ("touchmove", Some(x)) => page.set_session(SESSION_TOUCH_LAST, x),
            ("touchend", _) => {
                let start = page.remove_session(SESSION_TOUCH_START).and_then(|v| v.as_f64());
                let last = page.remove_session(SESSION_TOUCH_LAST).and_then(|v| v.as_f64());
                let (Some(start), Some(last)) = (start, last) else {
                    return;
                };
                let slide = page
                    .session(SESSION_SLIDE)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize;
                let delta = start - last;
                let next = if delta > SWIPE_THRESHOLD_PX {
                    (slide + 1).min(CAROUSEL_SLIDES - 1)
                } else if delta < -SWIPE_THRESHOLD_PX {
                    slide.saturating_sub(1)
                } else {
                    slide
                };
                tracing::debug!(delta, slide = next, "swipe");
                page.set_session(SESSION_SLIDE, next as u64);
                page.with_document(|doc| {
                    if let Some(carousel) = doc.by_id("carousel") {
                        for (i, node) in doc.children(carousel).into_iter().enumerate() {
                            if let Some(el) = doc.element_mut(node) {
                                el.hidden = i != next;
                            }
                        }
                    }
                });
            }
            _ => {}
        }
    }

    // ===== RENDERING =====

    fn render(&self, page: &Page) -> Result<(), String> {
        let path = page.path();
        let route = Route::parse(&path).ok_or_else(|| format!("404: no route for {path}"))?;
        if let Route::Item(id) = route {
            if self.item(id).is_none() {
                return Err(format!("404: no listing with id {id}"));
            }
        }

        page.with_state(|state| {
            let mobile = state.viewport.is_mobile();
            for key in [SESSION_LOADING, SESSION_QUERY, SESSION_SLIDE] {
                let _ = state.session.remove(key);
            }
            let wallet = state
                .session
                .get(SESSION_WALLET)
                .and_then(Value::as_str)
                .map(str::to_string);
            let orders = names(&state.session, SESSION_ORDERS);
            let listings = names(&state.session, SESSION_LISTINGS);

            let doc = &mut state.document;
            doc.clear();
            let main = header(doc, mobile, wallet.as_deref());
            match route {
                Route::Home => self.home(doc, main, mobile),
                Route::Marketplace => self.marketplace(doc, main, mobile),
                Route::Item(id) => {
                    if let Some(item) = self.item(id) {
                        item_details(doc, main, item, mobile);
                    }
                }
                Route::Sell => sell_form(doc, main),
                Route::Dashboard => dashboard(doc, main, mobile, &orders, &listings),
                Route::Orders => {
                    add(doc, main, ElementSpec::new("h2").text("My Orders"));
                    name_list(doc, main, &orders, "No orders yet");
                }
            }
        });
        tracing::debug!(%path, "rendered");
        Ok(())
    }

    fn home(&self, doc: &mut Document, main: NodeId, mobile: bool) {
        let hero = add(
            doc,
            main,
            ElementSpec::new("section")
                .class("hero-section")
                .style("display", "flex")
                .style("flex-direction", direction(mobile)),
        );
        add(doc, hero, ElementSpec::new("h2").text("Trade AI agents on-chain"));
        add(
            doc,
            hero,
            ElementSpec::new("p").text("Buy and sell autonomous agents, datasets and models."),
        );
        add(
            doc,
            hero,
            ElementSpec::new("a")
                .class("cta")
                .attr("href", "/marketplace")
                .attr("data-action", "navigate")
                .text("Browse Marketplace"),
        );

        let carousel = add(doc, main, ElementSpec::new("div").id("carousel").class("carousel"));
        for (i, item) in self.catalog.iter().take(CAROUSEL_SLIDES).enumerate() {
            let mut slide = ElementSpec::new("div")
                .class("carousel-item")
                .text(format!("Featured: {}", item.name));
            if i != 0 {
                slide = slide.hidden();
            }
            add(doc, carousel, slide);
        }
    }

    fn marketplace(&self, doc: &mut Document, main: NodeId, mobile: bool) {
        add(doc, main, ElementSpec::new("h2").text("Marketplace"));
        add(
            doc,
            main,
            ElementSpec::new("button")
                .class("search-toggle")
                .attr("aria-label", "Search")
                .attr("data-action", "toggle-search"),
        );
        let form = add(
            doc,
            main,
            ElementSpec::new("form").id("search-form").class("search-form").hidden(),
        );
        add(
            doc,
            form,
            ElementSpec::new("input").id("search").attr("type", "search"),
        );
        add(
            doc,
            form,
            ElementSpec::new("button").attr("data-action", "search").text("Search"),
        );

        let grid = add(
            doc,
            main,
            ElementSpec::new("div")
                .id("listing-grid")
                .class("listing-grid")
                .style("display", "grid")
                .style(
                    "grid-template-columns",
                    if mobile { "1fr" } else { "repeat(3, 1fr)" },
                ),
        );
        for item in self.catalog.iter().take(PAGE_SIZE) {
            card(doc, grid, item, mobile);
        }
        add(
            doc,
            main,
            ElementSpec::new("p")
                .id("loading")
                .class("loading")
                .text("Loading more...")
                .hidden(),
        );
    }
}

// =============================================================================
// VIEWS
// =============================================================================

fn add(doc: &mut Document, parent: NodeId, spec: ElementSpec) -> NodeId {
    doc.append(parent, spec).unwrap_or(parent)
}

const fn direction(mobile: bool) -> &'static str {
    if mobile {
        "column"
    } else {
        "row"
    }
}

/// `mockWalletAddress123` -> `mockWa...s123`
fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn header(doc: &mut Document, mobile: bool, wallet: Option<&str>) -> NodeId {
    let bar = add(
        doc,
        NodeId::ROOT,
        ElementSpec::new("header").class("app-header"),
    );
    add(doc, bar, ElementSpec::new("h1").text("Fabeon AI"));

    let mut toggle = ElementSpec::new("button")
        .class("mobile-menu-toggle")
        .attr("aria-label", "Menu")
        .attr("data-action", "toggle-menu");
    let mut menu = ElementSpec::new("nav").id("nav-menu").class("mobile-nav-menu");
    if mobile {
        menu = menu.hidden();
    } else {
        toggle = toggle.style("display", "none");
    }
    add(doc, bar, toggle);
    let menu = add(doc, bar, menu);
    for (label, href) in NAV_LINKS {
        add(
            doc,
            menu,
            ElementSpec::new("a")
                .attr("href", href)
                .attr("data-action", "navigate")
                .text(label),
        );
    }

    let area = add(doc, bar, ElementSpec::new("div").id("wallet-area"));
    wallet_widget(doc, area, wallet);

    add(
        doc,
        NodeId::ROOT,
        ElementSpec::new("div")
            .id("error")
            .class("error-message")
            .style("font-size", if mobile { "14px" } else { "16px" })
            .hidden(),
    );
    add(doc, NodeId::ROOT, ElementSpec::new("main").id("content"))
}

fn wallet_widget(doc: &mut Document, area: NodeId, wallet: Option<&str>) {
    doc.clear_children(area);
    let widget = match wallet {
        Some(address) => ElementSpec::new("span")
            .class("wallet-address")
            .attr("title", address)
            .text(short_address(address)),
        None => ElementSpec::new("button")
            .class("connect-wallet")
            .attr("data-action", "connect-wallet")
            .text("Connect Wallet"),
    };
    add(doc, area, widget);
}

fn card(doc: &mut Document, grid: NodeId, item: &CatalogItem, mobile: bool) {
    let card = add(
        doc,
        grid,
        ElementSpec::new("div")
            .class("listing-card")
            .attr("data-action", "open-item")
            .attr("data-item", item.id.to_string())
            .style("width", if mobile { "100%" } else { "calc(33% - 16px)" }),
    );
    add(doc, card, ElementSpec::new("h3").text(item.name.clone()));
    add(
        doc,
        card,
        ElementSpec::new("span").class("category").text(item.category.clone()),
    );
    add(
        doc,
        card,
        ElementSpec::new("span")
            .class("price")
            .text(format!("{:.2} SOL", item.price)),
    );
}

fn item_details(doc: &mut Document, main: NodeId, item: &CatalogItem, mobile: bool) {
    let details = add(
        doc,
        main,
        ElementSpec::new("div")
            .class("item-details")
            .style("display", "flex")
            .style("flex-direction", direction(mobile)),
    );
    add(doc, details, ElementSpec::new("h2").text(item.name.clone()));
    add(
        doc,
        details,
        ElementSpec::new("p")
            .class("description")
            .text(format!("{} listed on Fabeon AI.", item.category)),
    );
    add(
        doc,
        details,
        ElementSpec::new("span")
            .class("price")
            .text(format!("{:.2} SOL", item.price)),
    );
    add(
        doc,
        details,
        ElementSpec::new("button")
            .class("buy-button")
            .attr("data-action", "buy")
            .attr("data-item", item.id.to_string())
            .text("Buy Now"),
    );
    add(
        doc,
        details,
        ElementSpec::new("div").id("tx-status").class("transaction-status"),
    );
}

fn sell_form(doc: &mut Document, main: NodeId) {
    add(doc, main, ElementSpec::new("h2").text("Sell Item"));
    let form = add(doc, main, ElementSpec::new("form").class("listing-form"));
    for (id, tag, label) in [
        ("name", "input", "Name"),
        ("price", "input", "Price (SOL)"),
        ("description", "textarea", "Description"),
    ] {
        add(doc, form, ElementSpec::new("label").attr("for", id).text(label));
        add(doc, form, ElementSpec::new(tag).id(id));
    }
    add(
        doc,
        form,
        ElementSpec::new("button")
            .attr("data-action", "create-listing")
            .text("Create Listing"),
    );
    add(
        doc,
        main,
        ElementSpec::new("div").id("listing-status").class("listing-status"),
    );
}

fn dashboard(doc: &mut Document, main: NodeId, mobile: bool, orders: &[String], listings: &[String]) {
    add(doc, main, ElementSpec::new("h2").text("Dashboard"));
    let sections = add(
        doc,
        main,
        ElementSpec::new("div")
            .class("dashboard-sections")
            .style("display", "flex")
            .style("flex-direction", direction(mobile)),
    );
    for (title, class, entries, empty) in [
        ("My Orders", "dashboard-orders", orders, "No orders yet"),
        ("My Listings", "dashboard-listings", listings, "No listings yet"),
    ] {
        let section = add(doc, sections, ElementSpec::new("section").class(class));
        add(doc, section, ElementSpec::new("h3").text(title));
        name_list(doc, section, entries, empty);
    }
}

fn name_list(doc: &mut Document, parent: NodeId, entries: &[String], empty: &str) {
    if entries.is_empty() {
        add(doc, parent, ElementSpec::new("p").class("empty").text(empty));
        return;
    }
    let list = add(doc, parent, ElementSpec::new("ul"));
    for entry in entries {
        add(doc, list, ElementSpec::new("li").text(entry.clone()));
    }
}

// ===== PAGE HELPERS =====

fn value_of(doc: &Document, id: &str) -> String {
    doc.by_id(id)
        .and_then(|node| doc.element(node))
        .map(|el| el.value.trim().to_string())
        .unwrap_or_default()
}

fn hide(doc: &mut Document, id: &str) {
    if let Some(el) = doc.by_id(id).and_then(|node| doc.element_mut(node)) {
        el.hidden = true;
    }
}

fn set_hidden(page: &Page, id: &str, hidden: bool) {
    page.with_document(|doc| {
        if let Some(el) = doc.by_id(id).and_then(|node| doc.element_mut(node)) {
            el.hidden = hidden;
        }
    });
}

fn toggle(page: &Page, id: &str) {
    page.with_document(|doc| {
        if let Some(el) = doc.by_id(id).and_then(|node| doc.element_mut(node)) {
            el.hidden = !el.hidden;
        }
    });
}

/// Set the text of `id` and show it
fn set_text(page: &Page, id: &str, text: &str) {
    page.with_document(|doc| {
        if let Some(el) = doc.by_id(id).and_then(|node| doc.element_mut(node)) {
            el.text = text.to_string();
            el.hidden = false;
        }
    });
}

fn within_class(doc: &Document, node: NodeId, class: &str) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if doc.element(id).is_some_and(|el| el.has_class(class)) {
            return true;
        }
        current = doc.parent(id);
    }
    false
}

fn push_session(page: &Page, key: &str, entry: Value) {
    page.with_state(|state| {
        let list = state
            .session
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = list {
            items.push(entry);
        }
    });
}

fn names(session: &BTreeMap<String, Value>, key: &str) -> Vec<String> {
    session
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
