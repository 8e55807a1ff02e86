//! Vision fallback: locate a target by natural-language description
//! against a screenshot, reporting image-space coordinates.

use crate::errors::LocatorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use webpilot_core_types::{Point, Size};

/// A point reported by the vision model, in the pixel space of the
/// image it was shown.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VisionHit {
    pub point: Point,
    /// Model-reported confidence in [0, 1].
    pub confidence: f64,
    /// Dimensions of the image the point is relative to. Captures are
    /// often downscaled before being sent, so this rarely equals the
    /// viewport size.
    pub image_size: Size,
}

/// Model-backed coordinate locator. Implemented by the reasoning layer
/// and injected here so this crate stays free of HTTP concerns.
#[async_trait]
pub trait VisionLocator: Send + Sync {
    /// Find the described target in the screenshot. `Ok(None)` means
    /// the model looked and found nothing; `Err` means the lookup
    /// itself failed.
    async fn locate(
        &self,
        screenshot_png: &[u8],
        description: &str,
    ) -> Result<Option<VisionHit>, LocatorError>;
}

/// Map an image-space point back to viewport coordinates with a linear
/// rescale on each axis.
pub fn rescale_to_viewport(hit: &VisionHit, viewport: Size) -> Point {
    let sx = if hit.image_size.width > 0 {
        viewport.width as f64 / hit.image_size.width as f64
    } else {
        1.0
    };
    let sy = if hit.image_size.height > 0 {
        viewport.height as f64 / hit.image_size.height as f64
    } else {
        1.0
    };
    Point::new(hit.point.x * sx, hit.point.y * sy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_is_linear_per_axis() {
        let hit = VisionHit {
            point: Point::new(100.0, 50.0),
            confidence: 0.9,
            image_size: Size::new(640, 400),
        };
        let point = rescale_to_viewport(&hit, Size::new(1280, 800));
        assert_eq!(point.x, 200.0);
        assert_eq!(point.y, 100.0);
    }

    #[test]
    fn identity_when_sizes_match() {
        let hit = VisionHit {
            point: Point::new(33.0, 44.0),
            confidence: 0.8,
            image_size: Size::new(1280, 800),
        };
        let point = rescale_to_viewport(&hit, Size::new(1280, 800));
        assert_eq!(point.x, 33.0);
        assert_eq!(point.y, 44.0);
    }

    #[test]
    fn degenerate_image_size_does_not_divide_by_zero() {
        let hit = VisionHit {
            point: Point::new(10.0, 10.0),
            confidence: 0.8,
            image_size: Size::new(0, 0),
        };
        let point = rescale_to_viewport(&hit, Size::new(1280, 800));
        assert_eq!(point.x, 10.0);
    }
}
