//! Scriptable in-memory driver for tests.
//!
//! `MockPage` serves a flat set of [`MockElement`]s and records every
//! input primitive it receives, so higher layers can assert on the
//! exact gesture sequence without a real browser.

use crate::driver::{BrowserOps, IdentityState, PageOps, TextScope};
use crate::errors::DriverError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webpilot_core_types::{BoundingBox, ElementId, PageId, Size};

/// One fake DOM node.
#[derive(Clone, Debug)]
pub struct MockElement {
    pub uid: String,
    pub tag: String,
    /// Extra CSS selectors this element answers to, besides the ones
    /// derived from its attributes.
    pub selectors: Vec<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub enabled: bool,
    pub bbox: Option<BoundingBox>,
}

impl MockElement {
    pub fn new(uid: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            tag: tag.into(),
            selectors: Vec::new(),
            role: None,
            name: None,
            text: None,
            attributes: HashMap::new(),
            visible: true,
            enabled: true,
            bbox: Some(BoundingBox::new(10.0, 10.0, 100.0, 24.0)),
        }
    }

    pub fn selector(mut self, sel: impl Into<String>) -> Self {
        self.selectors.push(sel.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = Some(BoundingBox::new(x, y, width, height));
        self
    }

    pub fn no_bbox(mut self) -> Self {
        self.bbox = None;
        self
    }

    fn element_id(&self) -> ElementId {
        ElementId(format!("[data-wp-uid=\"{}\"]", self.uid))
    }

    fn matches_selector(&self, selector: &str) -> bool {
        if self.selectors.iter().any(|s| s == selector) {
            return true;
        }
        if selector == self.element_id().0 {
            return true;
        }
        if let Some(id) = selector.strip_prefix('#') {
            return self.attributes.get("id").map(String::as_str) == Some(id);
        }
        for attr in ["data-testid", "aria-label", "name"] {
            let prefix = format!("[{attr}=\"");
            if let Some(rest) = selector.strip_prefix(&prefix) {
                if let Some(value) = rest.strip_suffix("\"]") {
                    return self.attributes.get(attr).map(String::as_str) == Some(value);
                }
            }
        }
        selector == self.tag
    }
}

/// A recorded input primitive.
#[derive(Clone, Debug, PartialEq)]
pub enum MockAction {
    Navigate(String),
    MouseMove { x: f64, y: f64 },
    MouseClick { x: f64, y: f64 },
    ElementClick(String),
    Focus(String),
    InsertText(String),
    PressKey(String),
    Scroll { dx: f64, dy: f64 },
}

#[derive(Default)]
struct PageState {
    url: String,
    title: String,
    elements: Vec<MockElement>,
    actions: Vec<MockAction>,
    screenshot: Vec<u8>,
    identity: Option<serde_json::Value>,
    imported: Option<IdentityState>,
    fail_mouse: bool,
}

/// In-memory page double.
pub struct MockPage {
    id: PageId,
    state: Mutex<PageState>,
    viewport: Size,
    closed: AtomicBool,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            id: PageId::new(),
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..PageState::default()
            }),
            viewport: Size::new(1280, 800),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_viewport(mut self, size: Size) -> Self {
        self.viewport = size;
        self
    }

    pub fn with_elements(self, elements: Vec<MockElement>) -> Self {
        self.state.lock().elements = elements;
        self
    }

    pub fn with_screenshot(self, png: Vec<u8>) -> Self {
        self.state.lock().screenshot = png;
        self
    }

    pub fn with_identity(self, blob: serde_json::Value) -> Self {
        self.state.lock().identity = Some(blob);
        self
    }

    /// Make raw mouse primitives fail, to exercise degraded paths.
    pub fn fail_mouse_input(self) -> Self {
        self.state.lock().fail_mouse = true;
        self
    }

    pub fn add_element(&self, element: MockElement) {
        self.state.lock().elements.push(element);
    }

    pub fn remove_element(&self, uid: &str) {
        self.state.lock().elements.retain(|el| el.uid != uid);
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.state.lock().title = title.into();
    }

    pub fn actions(&self) -> Vec<MockAction> {
        self.state.lock().actions.clone()
    }

    pub fn imported_identity(&self) -> Option<IdentityState> {
        self.state.lock().imported.clone()
    }

    pub fn close_page(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn find(&self, el: &ElementId) -> Result<MockElement, DriverError> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| e.element_id() == *el)
            .cloned()
            .ok_or_else(|| DriverError::ElementGone(el.0.clone()))
    }

    fn record(&self, action: MockAction) {
        self.state.lock().actions.push(action);
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageOps for MockPage {
    fn id(&self) -> PageId {
        self.id.clone()
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.actions.push(MockAction::Navigate(url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().title.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.state.lock().screenshot.clone())
    }

    async fn viewport_size(&self) -> Result<Size, DriverError> {
        Ok(self.viewport)
    }

    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementId>, DriverError> {
        Ok(self
            .state
            .lock()
            .elements
            .iter()
            .filter(|el| el.matches_selector(selector))
            .map(MockElement::element_id)
            .collect())
    }

    async fn query_role(
        &self,
        role: &str,
        name: Option<&str>,
    ) -> Result<Vec<ElementId>, DriverError> {
        let role = role.to_lowercase();
        let name = name.map(str::to_lowercase);
        Ok(self
            .state
            .lock()
            .elements
            .iter()
            .filter(|el| el.role.as_deref() == Some(role.as_str()))
            .filter(|el| match &name {
                Some(needle) => el
                    .name
                    .as_deref()
                    .map(|n| n.to_lowercase().contains(needle))
                    .unwrap_or(false),
                None => true,
            })
            .map(MockElement::element_id)
            .collect())
    }

    async fn query_text(
        &self,
        text: &str,
        scope: TextScope,
        exact: bool,
    ) -> Result<Vec<ElementId>, DriverError> {
        let tags = scope.tags();
        let needle = text.to_lowercase();
        Ok(self
            .state
            .lock()
            .elements
            .iter()
            .filter(|el| tags.is_empty() || tags.contains(&el.tag.as_str()))
            .filter(|el| match &el.text {
                Some(t) if exact => t.trim() == text,
                Some(t) => t.to_lowercase().contains(&needle),
                None => false,
            })
            .map(MockElement::element_id)
            .collect())
    }

    async fn bounding_box(&self, el: &ElementId) -> Result<Option<BoundingBox>, DriverError> {
        Ok(self.find(el)?.bbox)
    }

    async fn is_visible(&self, el: &ElementId) -> Result<bool, DriverError> {
        Ok(self.find(el)?.visible)
    }

    async fn is_enabled(&self, el: &ElementId) -> Result<bool, DriverError> {
        Ok(self.find(el)?.enabled)
    }

    async fn attribute(
        &self,
        el: &ElementId,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.find(el)?.attributes.get(name).cloned())
    }

    async fn tag_name(&self, el: &ElementId) -> Result<String, DriverError> {
        Ok(self.find(el)?.tag)
    }

    async fn focus(&self, el: &ElementId) -> Result<(), DriverError> {
        let element = self.find(el)?;
        self.record(MockAction::Focus(element.uid));
        Ok(())
    }

    async fn click_element(&self, el: &ElementId) -> Result<(), DriverError> {
        let element = self.find(el)?;
        self.record(MockAction::ElementClick(element.uid));
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        if self.state.lock().fail_mouse {
            return Err(DriverError::Cdp("mouse input unavailable".into()));
        }
        self.record(MockAction::MouseMove { x, y });
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        if self.state.lock().fail_mouse {
            return Err(DriverError::Cdp("mouse input unavailable".into()));
        }
        self.record(MockAction::MouseClick { x, y });
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), DriverError> {
        self.record(MockAction::InsertText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.record(MockAction::PressKey(key.to_string()));
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), DriverError> {
        self.record(MockAction::Scroll { dx, dy });
        Ok(())
    }

    async fn export_identity(&self) -> Result<IdentityState, DriverError> {
        let blob = self
            .state
            .lock()
            .identity
            .clone()
            .unwrap_or_else(|| json!({ "cookies": [] }));
        Ok(IdentityState(blob))
    }

    async fn import_identity(&self, state: &IdentityState) -> Result<(), DriverError> {
        self.state.lock().imported = Some(state.clone());
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory browser double holding pages in creation order.
pub struct MockBrowser {
    pages: Mutex<Vec<Arc<MockPage>>>,
    fixed_page: Mutex<Option<Arc<MockPage>>>,
    alive: AtomicBool,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            fixed_page: Mutex::new(None),
            alive: AtomicBool::new(true),
        }
    }

    /// Browser pre-seeded with one page.
    pub fn with_page(page: MockPage) -> (Self, Arc<MockPage>) {
        let page = Arc::new(page);
        let browser = Self::new();
        browser.pages.lock().push(Arc::clone(&page));
        (browser, page)
    }

    /// Browser whose `new_page` always hands out the given page, so a
    /// test can script the page the session manager will focus.
    pub fn with_fixed_page(page: MockPage) -> (Self, Arc<MockPage>) {
        let page = Arc::new(page);
        let browser = Self::new();
        *browser.fixed_page.lock() = Some(Arc::clone(&page));
        (browser, page)
    }

    pub fn push_page(&self, page: MockPage) -> Arc<MockPage> {
        let page = Arc::new(page);
        self.pages.lock().push(Arc::clone(&page));
        page
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserOps for MockBrowser {
    async fn new_page(&self) -> Result<Arc<dyn PageOps>, DriverError> {
        if !self.is_alive() {
            return Err(DriverError::PageClosed);
        }
        let page = match self.fixed_page.lock().clone() {
            Some(fixed) => fixed,
            None => Arc::new(MockPage::new()),
        };
        let mut pages = self.pages.lock();
        if !pages.iter().any(|p| Arc::ptr_eq(p, &page)) {
            pages.push(Arc::clone(&page));
        }
        Ok(page)
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn PageOps>>, DriverError> {
        let pages = self.pages.lock().clone();
        let mut out: Vec<Arc<dyn PageOps>> = Vec::with_capacity(pages.len());
        for page in pages {
            if !page.is_closed().await {
                out.push(page);
            }
        }
        Ok(out)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.alive.store(false, Ordering::SeqCst);
        for page in self.pages.lock().iter() {
            page.close_page();
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn selector_matching_covers_attribute_forms() {
        let page = MockPage::new().with_elements(vec![MockElement::new("w1", "input")
            .attr("id", "email")
            .attr("data-testid", "email-field")
            .attr("aria-label", "Email address")]);

        for sel in [
            "#email",
            "[data-testid=\"email-field\"]",
            "[aria-label=\"Email address\"]",
            "[data-wp-uid=\"w1\"]",
            "input",
        ] {
            let hits = page.query_selector(sel).await.map_err(|e| e.to_string()).unwrap();
            assert_eq!(hits.len(), 1, "selector {sel} should match");
        }
        assert!(page.query_selector("#other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_query_respects_scope_and_exactness() {
        let page = MockPage::new().with_elements(vec![
            MockElement::new("w1", "button").text("Sign in"),
            MockElement::new("w2", "div").text("Sign in to continue"),
        ]);

        let clickable = page
            .query_text("Sign in", TextScope::Clickable, true)
            .await
            .unwrap();
        assert_eq!(clickable.len(), 1);

        let anywhere = page
            .query_text("sign in", TextScope::Any, false)
            .await
            .unwrap();
        assert_eq!(anywhere.len(), 2);
    }

    #[tokio::test]
    async fn browser_filters_closed_pages() {
        let browser = MockBrowser::new();
        let first = browser.push_page(MockPage::new());
        let second = browser.push_page(MockPage::new());
        second.close_page();

        let pages = browser.pages().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id(), first.id());
    }

    #[tokio::test]
    async fn actions_are_recorded_in_order() {
        let page = MockPage::new();
        page.mouse_move(1.0, 2.0).await.unwrap();
        page.mouse_click(1.0, 2.0).await.unwrap();
        page.insert_text("x").await.unwrap();
        assert_eq!(
            page.actions(),
            vec![
                MockAction::MouseMove { x: 1.0, y: 2.0 },
                MockAction::MouseClick { x: 1.0, y: 2.0 },
                MockAction::InsertText("x".into()),
            ]
        );
    }
}
