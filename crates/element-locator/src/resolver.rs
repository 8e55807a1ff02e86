//! Fallback-chain resolver.

use crate::errors::LocatorError;
use crate::strategies;
use crate::types::{ElementQuery, LocatorStrategy, ResolvedElement, ResolvedTarget};
use crate::vision::{rescale_to_viewport, VisionLocator};
use async_trait::async_trait;
use browser_session::PageOps;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolver tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Vision hits below this confidence are discarded.
    pub min_vision_confidence: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            min_vision_confidence: 0.7,
        }
    }
}

/// Resolves a query to an actionable target.
#[async_trait]
pub trait ElementResolver: Send + Sync {
    async fn resolve(
        &self,
        page: &dyn PageOps,
        query: &ElementQuery,
    ) -> Result<ResolvedElement, LocatorError>;
}

/// Default resolver: structural selector, then accessibility, then
/// visible text, then (when a vision locator is wired in) model-guided
/// coordinates.
pub struct FallbackResolver {
    config: LocatorConfig,
    vision: Option<Arc<dyn VisionLocator>>,
}

impl FallbackResolver {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            vision: None,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionLocator>) -> Self {
        self.vision = Some(vision);
        self
    }

    async fn resolve_handle(
        &self,
        page: &dyn PageOps,
        query: &ElementQuery,
    ) -> Result<Option<ResolvedElement>, LocatorError> {
        let hit = if let Some(hit) = strategies::by_selector(page, query).await? {
            Some((LocatorStrategy::Selector, hit))
        } else if let Some(hit) = strategies::by_aria(page, query).await? {
            Some((LocatorStrategy::Aria, hit))
        } else {
            strategies::by_text(page, query)
                .await?
                .map(|hit| (LocatorStrategy::Text, hit))
        };

        let Some((strategy, (el, confidence))) = hit else {
            return Ok(None);
        };
        debug!(strategy = strategy.name(), confidence, "strategy matched");
        let durable = strategies::durable_selector(page, &el).await?;
        Ok(Some(ResolvedElement {
            target: ResolvedTarget::Handle(el),
            strategy,
            confidence,
            durable_selector: durable,
        }))
    }

    async fn resolve_vision(
        &self,
        page: &dyn PageOps,
        query: &ElementQuery,
    ) -> Result<Option<ResolvedElement>, LocatorError> {
        let (Some(vision), Some(description)) = (&self.vision, &query.description) else {
            return Ok(None);
        };
        let screenshot = page.screenshot().await?;
        let Some(hit) = vision.locate(&screenshot, description).await? else {
            return Ok(None);
        };
        if hit.confidence < self.config.min_vision_confidence {
            warn!(
                confidence = hit.confidence,
                floor = self.config.min_vision_confidence,
                "vision hit below confidence floor; discarding"
            );
            return Ok(None);
        }
        let viewport = page.viewport_size().await?;
        let point = rescale_to_viewport(&hit, viewport);
        Ok(Some(ResolvedElement {
            target: ResolvedTarget::Coordinates(point),
            strategy: LocatorStrategy::Vision,
            confidence: hit.confidence,
            durable_selector: None,
        }))
    }
}

#[async_trait]
impl ElementResolver for FallbackResolver {
    async fn resolve(
        &self,
        page: &dyn PageOps,
        query: &ElementQuery,
    ) -> Result<ResolvedElement, LocatorError> {
        if let Some(resolved) = self.resolve_handle(page, query).await? {
            info!(
                strategy = resolved.strategy.name(),
                confidence = resolved.confidence,
                "resolved {}",
                query.describe()
            );
            return Ok(resolved);
        }
        if let Some(resolved) = self.resolve_vision(page, query).await? {
            info!(
                confidence = resolved.confidence,
                "resolved {} via vision", query.describe()
            );
            return Ok(resolved);
        }
        Err(LocatorError::NotFound {
            query: query.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::VisionHit;
    use browser_session::testing::{MockElement, MockPage};
    use browser_session::TextScope;
    use webpilot_core_types::{Point, Size};

    struct FixedVision {
        hit: Option<VisionHit>,
    }

    #[async_trait]
    impl VisionLocator for FixedVision {
        async fn locate(
            &self,
            _screenshot_png: &[u8],
            _description: &str,
        ) -> Result<Option<VisionHit>, LocatorError> {
            Ok(self.hit)
        }
    }

    fn resolver() -> FallbackResolver {
        FallbackResolver::new(LocatorConfig::default())
    }

    #[tokio::test]
    async fn selector_outranks_text() {
        let page = MockPage::new().with_elements(vec![
            MockElement::new("w1", "button").text("Submit"),
            MockElement::new("w2", "button").selector("#go").text("Submit"),
        ]);
        let mut query = ElementQuery::by_selector("#go");
        query.text = Some("Submit".into());
        query.scope = TextScope::Clickable;

        let resolved = resolver().resolve(&page, &query).await.unwrap();
        assert_eq!(resolved.strategy, LocatorStrategy::Selector);
        assert_eq!(resolved.confidence, 1.0);
        assert_eq!(resolved.element_id().unwrap().0, "[data-wp-uid=\"w2\"]");
    }

    #[tokio::test]
    async fn falls_through_selector_to_aria() {
        let page = MockPage::new().with_elements(vec![MockElement::new("w1", "button")
            .role("button")
            .name("Checkout")]);
        let mut query = ElementQuery::by_role("button", Some("Checkout".into()));
        query.selector = Some("#missing".into());

        let resolved = resolver().resolve(&page, &query).await.unwrap();
        assert_eq!(resolved.strategy, LocatorStrategy::Aria);
    }

    #[tokio::test]
    async fn vision_rescales_to_viewport() {
        let page = MockPage::new().with_viewport(Size::new(1280, 800));
        let vision = Arc::new(FixedVision {
            hit: Some(VisionHit {
                point: Point::new(320.0, 100.0),
                confidence: 0.85,
                image_size: Size::new(640, 400),
            }),
        });
        let query = ElementQuery::by_selector("#gone").described("the blue button");

        let resolved = resolver()
            .with_vision(vision)
            .resolve(&page, &query)
            .await
            .unwrap();
        assert_eq!(resolved.strategy, LocatorStrategy::Vision);
        match resolved.target {
            ResolvedTarget::Coordinates(point) => {
                assert_eq!(point.x, 640.0);
                assert_eq!(point.y, 200.0);
            }
            ResolvedTarget::Handle(_) => panic!("expected coordinates"),
        }
        assert!(resolved.durable_selector.is_none());
    }

    #[tokio::test]
    async fn vision_below_floor_is_not_found() {
        let page = MockPage::new();
        let vision = Arc::new(FixedVision {
            hit: Some(VisionHit {
                point: Point::new(1.0, 1.0),
                confidence: 0.5,
                image_size: Size::new(1280, 800),
            }),
        });
        let query = ElementQuery::by_selector("#gone").described("anything");

        let err = resolver()
            .with_vision(vision)
            .resolve(&page, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_not_found() {
        let page = MockPage::new();
        let query = ElementQuery::by_text("Nothing here", TextScope::Any);
        let err = resolver().resolve(&page, &query).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Nothing here"));
    }
}
