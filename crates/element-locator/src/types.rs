//! Query and result types for element resolution.

use browser_session::TextScope;
use serde::{Deserialize, Serialize};
use webpilot_core_types::{ElementId, Point};

/// Declarative description of the element an action wants. Strategies
/// consume whichever fields are present; at least one of `selector`,
/// `role`, `text`, or `description` must be set for resolution to have
/// anything to work with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementQuery {
    /// Structural CSS selector.
    pub selector: Option<String>,
    /// Accessible role, e.g. `button` or `textbox`.
    pub role: Option<String>,
    /// Accessible name to filter role matches by.
    pub name: Option<String>,
    /// Visible text to match.
    pub text: Option<String>,
    /// Tag scope for text matching.
    pub scope: TextScope,
    /// Natural-language description for the vision fallback.
    pub description: Option<String>,
}

impl ElementQuery {
    pub fn by_selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::empty()
        }
    }

    pub fn by_role(role: impl Into<String>, name: Option<String>) -> Self {
        Self {
            role: Some(role.into()),
            name,
            ..Self::empty()
        }
    }

    pub fn by_text(text: impl Into<String>, scope: TextScope) -> Self {
        Self {
            text: Some(text.into()),
            scope,
            ..Self::empty()
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn empty() -> Self {
        Self {
            selector: None,
            role: None,
            name: None,
            text: None,
            scope: TextScope::Any,
            description: None,
        }
    }

    /// Stable key for the healing cache: every discriminating field in
    /// a fixed order, so semantically equal queries share an entry.
    pub fn cache_key(&self) -> String {
        format!(
            "sel={}|role={}|name={}|text={}|scope={:?}|desc={}",
            self.selector.as_deref().unwrap_or(""),
            self.role.as_deref().unwrap_or(""),
            self.name.as_deref().unwrap_or(""),
            self.text.as_deref().unwrap_or(""),
            self.scope,
            self.description.as_deref().unwrap_or(""),
        )
    }

    /// Human-readable form for errors and logs.
    pub fn describe(&self) -> String {
        if let Some(sel) = &self.selector {
            return format!("selector {sel:?}");
        }
        if let Some(role) = &self.role {
            return match &self.name {
                Some(name) => format!("role {role:?} named {name:?}"),
                None => format!("role {role:?}"),
            };
        }
        if let Some(text) = &self.text {
            return format!("text {text:?}");
        }
        if let Some(desc) = &self.description {
            return format!("described as {desc:?}");
        }
        "empty query".to_string()
    }
}

/// Strategies in fallback order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Selector,
    Aria,
    Text,
    Vision,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Selector => "selector",
            LocatorStrategy::Aria => "aria",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Vision => "vision",
        }
    }
}

/// What a resolution produced: a live handle, or bare coordinates when
/// only the vision fallback could find the target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ResolvedTarget {
    Handle(ElementId),
    Coordinates(Point),
}

/// A successful resolution with its provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedElement {
    pub target: ResolvedTarget,
    pub strategy: LocatorStrategy,
    pub confidence: f64,
    /// A durable selector synthesized from the matched element's
    /// attributes, used to short-circuit the next resolution of the
    /// same query. Coordinate results never carry one.
    pub durable_selector: Option<String>,
}

impl ResolvedElement {
    pub fn element_id(&self) -> Option<&ElementId> {
        match &self.target {
            ResolvedTarget::Handle(id) => Some(id),
            ResolvedTarget::Coordinates(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_across_clones() {
        let q = ElementQuery::by_role("button", Some("Submit".into()));
        assert_eq!(q.cache_key(), q.clone().cache_key());
    }

    #[test]
    fn cache_key_distinguishes_queries() {
        let a = ElementQuery::by_text("Submit", TextScope::Clickable);
        let b = ElementQuery::by_text("Submit", TextScope::Any);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn describe_prefers_selector() {
        let mut q = ElementQuery::by_selector("#go");
        q.text = Some("Go".into());
        assert!(q.describe().contains("#go"));
    }
}
