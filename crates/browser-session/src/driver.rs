//! Generic browser driver interface.
//!
//! The engine never talks to a CDP client directly; everything above
//! this crate works against `BrowserOps`/`PageOps` trait objects so
//! the concrete client can be swapped or mocked. The chromiumoxide
//! implementation lives in [`crate::chromium`], the scriptable test
//! double in [`crate::testing`].

use crate::errors::DriverError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use webpilot_core_types::{BoundingBox, ElementId, PageId, Size};

/// Element kinds a text query may be scoped to. The driver maps each
/// kind to the tag set it searches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextScope {
    /// Buttons and things that behave like them.
    Clickable,
    /// Links only.
    Links,
    /// Form fields.
    Fields,
    /// Any element.
    Any,
}

impl TextScope {
    /// Tag names searched for this scope.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            TextScope::Clickable => &["button", "a", "input", "summary", "label"],
            TextScope::Links => &["a"],
            TextScope::Fields => &["input", "textarea", "select"],
            TextScope::Any => &[],
        }
    }
}

/// Opaque identity state blob: whatever the driver's native export
/// produces. The engine persists it without inspecting it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityState(pub serde_json::Value);

/// Browser-level operations: page lifecycle and teardown.
#[async_trait]
pub trait BrowserOps: Send + Sync {
    /// Open a new blank page.
    async fn new_page(&self) -> Result<Arc<dyn PageOps>, DriverError>;

    /// Currently open pages in creation order. Closed targets are
    /// filtered out, so the last entry is the most recently opened
    /// live page.
    async fn pages(&self) -> Result<Vec<Arc<dyn PageOps>>, DriverError>;

    /// Close the browser process. Idempotent.
    async fn close(&self) -> Result<(), DriverError>;

    /// Whether the underlying process is still reachable.
    fn is_alive(&self) -> bool;
}

/// Page-level operations used by the resolver, stealth layer, and
/// orchestrator. Element references are driver-issued ids that go
/// stale on navigation.
#[async_trait]
pub trait PageOps: Send + Sync {
    fn id(&self) -> PageId;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;
    async fn current_url(&self) -> Result<String, DriverError>;
    async fn title(&self) -> Result<String, DriverError>;

    /// PNG capture of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;
    async fn viewport_size(&self) -> Result<Size, DriverError>;

    /// All elements matching a CSS selector, tagged for later access.
    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementId>, DriverError>;

    /// Elements matching an accessible role (explicit `role=` or the
    /// implicit role of the tag), optionally filtered by accessible
    /// name.
    async fn query_role(
        &self,
        role: &str,
        name: Option<&str>,
    ) -> Result<Vec<ElementId>, DriverError>;

    /// Elements whose visible text matches, scoped by tag set.
    /// `exact` compares trimmed text verbatim; otherwise the search is
    /// a case-insensitive substring match.
    async fn query_text(
        &self,
        text: &str,
        scope: TextScope,
        exact: bool,
    ) -> Result<Vec<ElementId>, DriverError>;

    async fn bounding_box(&self, el: &ElementId) -> Result<Option<BoundingBox>, DriverError>;
    async fn is_visible(&self, el: &ElementId) -> Result<bool, DriverError>;
    async fn is_enabled(&self, el: &ElementId) -> Result<bool, DriverError>;
    async fn attribute(&self, el: &ElementId, name: &str)
        -> Result<Option<String>, DriverError>;
    async fn tag_name(&self, el: &ElementId) -> Result<String, DriverError>;
    async fn focus(&self, el: &ElementId) -> Result<(), DriverError>;

    /// Driver-native click on the element itself; the degraded path
    /// when humanized pointer input fails.
    async fn click_element(&self, el: &ElementId) -> Result<(), DriverError>;

    // Raw input primitives. The stealth layer composes these into
    // humanized gestures.
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn insert_text(&self, text: &str) -> Result<(), DriverError>;
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;
    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), DriverError>;

    /// Export the page's identity state (cookies and friends) as an
    /// opaque blob.
    async fn export_identity(&self) -> Result<IdentityState, DriverError>;

    /// Restore a previously exported blob into the current context.
    async fn import_identity(&self, state: &IdentityState) -> Result<(), DriverError>;

    /// Whether this page handle still refers to a live target.
    async fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_scope_tags() {
        assert!(TextScope::Links.tags().contains(&"a"));
        assert!(TextScope::Fields.tags().contains(&"textarea"));
        assert!(TextScope::Any.tags().is_empty());
    }
}
