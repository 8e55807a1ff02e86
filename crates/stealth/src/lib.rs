//! Human-behavior input layer.
//!
//! Wraps the raw driver primitives in gestures paced and shaped like a
//! person at a keyboard: delays drawn as the mean of three uniform
//! samples, pointer moves along a perturbed cubic Bezier, typing one
//! character at a time with occasional thinking pauses, and scrolls
//! split into increments.

pub mod config;

pub use config::{ConfigError, DelayWindow, HumanizerConfig};

use browser_session::{DriverError, PageOps};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use webpilot_core_types::{ElementId, Point};

/// Punctuation that earns a short extra pause while typing.
const PAUSE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Stateful gesture generator. Tracks the pointer position between
/// gestures so each path starts where the last one ended.
pub struct Humanizer {
    config: HumanizerConfig,
    pointer: Mutex<Point>,
    actions: AtomicU64,
}

impl Humanizer {
    pub fn new(config: HumanizerConfig) -> Self {
        Self {
            config,
            pointer: Mutex::new(Point::new(0.0, 0.0)),
            actions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HumanizerConfig {
        &self.config
    }

    /// Gestures performed since construction.
    pub fn actions_performed(&self) -> u64 {
        self.actions.load(Ordering::Relaxed)
    }

    /// Mean of three uniform draws over the window.
    fn sample_delay(window: &DelayWindow) -> Duration {
        if window.max_ms <= window.min_ms {
            return Duration::from_millis(window.min_ms);
        }
        let mut rng = rand::thread_rng();
        let sum: u64 = (0..3)
            .map(|_| rng.gen_range(window.min_ms..=window.max_ms))
            .sum();
        Duration::from_millis(sum / 3)
    }

    /// Sleep for a humanized delay drawn from the window.
    pub async fn pause(&self, window: &DelayWindow) {
        let delay = Self::sample_delay(window);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Cubic Bezier from `from` to `to` with both control points
    /// perturbed off the straight line. Returns `pointer_steps` points
    /// ending exactly on the target.
    fn plan_path(&self, from: Point, to: Point) -> Vec<Point> {
        let steps = self.config.pointer_steps.max(2) as usize;
        let distance = from.distance_to(&to);
        if distance < 1.0 {
            return vec![to];
        }

        let mut rng = rand::thread_rng();
        let jitter = distance * self.config.curve_jitter;
        let perturb = |rng: &mut rand::rngs::ThreadRng| -> (f64, f64) {
            (
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
            )
        };
        let (j1x, j1y) = perturb(&mut rng);
        let (j2x, j2y) = perturb(&mut rng);
        let c1 = Point::new(
            from.x + (to.x - from.x) / 3.0 + j1x,
            from.y + (to.y - from.y) / 3.0 + j1y,
        );
        let c2 = Point::new(
            from.x + (to.x - from.x) * 2.0 / 3.0 + j2x,
            from.y + (to.y - from.y) * 2.0 / 3.0 + j2y,
        );

        (1..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                let u = 1.0 - t;
                let x = u * u * u * from.x
                    + 3.0 * u * u * t * c1.x
                    + 3.0 * u * t * t * c2.x
                    + t * t * t * to.x;
                let y = u * u * u * from.y
                    + 3.0 * u * u * t * c1.y
                    + 3.0 * u * t * t * c2.y
                    + t * t * t * to.y;
                Point::new(x, y)
            })
            .collect()
    }

    /// Move the pointer along a curved path to the target.
    pub async fn move_pointer(
        &self,
        page: &dyn PageOps,
        to: Point,
    ) -> Result<(), DriverError> {
        let from = *self.pointer.lock();
        let path = self.plan_path(from, to);
        debug!(points = path.len(), "pointer path planned");
        for point in &path {
            page.mouse_move(point.x, point.y).await?;
            self.pause(&self.config.pointer_dwell).await;
        }
        *self.pointer.lock() = to;
        Ok(())
    }

    /// Humanized click at a point. When the raw pointer pipeline fails
    /// and a fallback element is available, degrades to the driver's
    /// native element click instead of failing the action.
    pub async fn click(
        &self,
        page: &dyn PageOps,
        target: Point,
        fallback: Option<&ElementId>,
    ) -> Result<(), DriverError> {
        self.pause(&self.config.before_click).await;
        let humanized = async {
            self.move_pointer(page, target).await?;
            self.pause(&self.config.hover).await;
            page.mouse_click(target.x, target.y).await
        };
        match humanized.await {
            Ok(()) => {
                self.actions.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => match fallback {
                Some(el) => {
                    warn!(error = %err, "humanized click failed; degrading to direct click");
                    page.click_element(el).await?;
                    self.actions.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                None => Err(err),
            },
        }
    }

    /// Type text one character at a time with paced keystrokes,
    /// punctuation micro-pauses, and occasional thinking pauses.
    pub async fn type_text(&self, page: &dyn PageOps, text: &str) -> Result<(), DriverError> {
        self.pause(&self.config.before_type).await;
        // Pre-draw the per-character schedule so no rng handle lives
        // across an await point.
        let schedule: Vec<(char, Duration, bool)> = {
            let mut rng = rand::thread_rng();
            text.chars()
                .map(|ch| {
                    let window = &self.config.between_keys;
                    let delay = if window.max_ms <= window.min_ms {
                        Duration::from_millis(window.min_ms)
                    } else {
                        let sum: u64 = (0..3)
                            .map(|_| rng.gen_range(window.min_ms..=window.max_ms))
                            .sum();
                        Duration::from_millis(sum / 3)
                    };
                    let thinking = rng.gen_bool(self.config.thinking_chance.clamp(0.0, 1.0));
                    (ch, delay, thinking)
                })
                .collect()
        };

        let mut buf = [0u8; 4];
        for (ch, delay, thinking) in schedule {
            page.insert_text(ch.encode_utf8(&mut buf)).await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if PAUSE_PUNCTUATION.contains(&ch) {
                self.pause(&self.config.between_keys).await;
            }
            if thinking {
                self.pause(&self.config.thinking).await;
            }
        }
        self.actions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Scroll the total delta in increments with dwell pauses, the way
    /// a wheel or trackpad delivers it.
    pub async fn scroll(&self, page: &dyn PageOps, dx: f64, dy: f64) -> Result<(), DriverError> {
        let increments = self.config.scroll_increments.max(1) as f64;
        let (step_x, step_y) = (dx / increments, dy / increments);
        for _ in 0..self.config.scroll_increments.max(1) {
            page.scroll_by(step_x, step_y).await?;
            self.pause(&self.config.scroll_dwell).await;
        }
        self.actions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browser_session::testing::{MockAction, MockElement, MockPage};

    fn humanizer() -> Humanizer {
        Humanizer::new(HumanizerConfig::instant())
    }

    #[test]
    fn sampled_delay_stays_inside_the_window() {
        let window = DelayWindow::new(100, 300);
        for _ in 0..200 {
            let delay = Humanizer::sample_delay(&window).as_millis() as u64;
            assert!((100..=300).contains(&delay), "delay {delay} out of window");
        }
    }

    #[test]
    fn path_ends_on_target_with_configured_steps() {
        let h = humanizer();
        let path = h.plan_path(Point::new(0.0, 0.0), Point::new(300.0, 120.0));
        assert_eq!(path.len(), h.config().pointer_steps as usize);
        let last = path.last().copied().unwrap();
        assert!((last.x - 300.0).abs() < 1e-9);
        assert!((last.y - 120.0).abs() < 1e-9);
    }

    #[test]
    fn trivial_moves_skip_the_curve() {
        let h = humanizer();
        let path = h.plan_path(Point::new(10.0, 10.0), Point::new(10.2, 10.1));
        assert_eq!(path.len(), 1);
    }

    #[tokio::test]
    async fn click_moves_then_clicks() {
        let h = humanizer();
        let page = MockPage::new();
        h.click(&page, Point::new(50.0, 60.0), None).await.unwrap();

        let actions = page.actions();
        assert!(matches!(
            actions.last(),
            Some(MockAction::MouseClick { x, y }) if *x == 50.0 && *y == 60.0
        ));
        let moves = actions
            .iter()
            .filter(|a| matches!(a, MockAction::MouseMove { .. }))
            .count();
        assert_eq!(moves, h.config().pointer_steps as usize);
        assert_eq!(h.actions_performed(), 1);
    }

    #[tokio::test]
    async fn click_degrades_to_element_click() {
        let h = humanizer();
        let page = MockPage::new()
            .with_elements(vec![MockElement::new("w1", "button")])
            .fail_mouse_input();
        let el = ElementId("[data-wp-uid=\"w1\"]".into());

        h.click(&page, Point::new(5.0, 5.0), Some(&el)).await.unwrap();
        assert_eq!(page.actions(), vec![MockAction::ElementClick("w1".into())]);
    }

    #[tokio::test]
    async fn click_without_fallback_propagates_failure() {
        let h = humanizer();
        let page = MockPage::new().fail_mouse_input();
        let err = h.click(&page, Point::new(5.0, 5.0), None).await.unwrap_err();
        assert!(matches!(err, DriverError::Cdp(_)));
    }

    #[tokio::test]
    async fn typing_is_per_character() {
        let h = humanizer();
        let page = MockPage::new();
        h.type_text(&page, "hi, ok").await.unwrap();

        let typed: Vec<String> = page
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                MockAction::InsertText(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(typed, vec!["h", "i", ",", " ", "o", "k"]);
    }

    #[tokio::test]
    async fn scroll_splits_into_increments_summing_to_total() {
        let h = humanizer();
        let page = MockPage::new();
        h.scroll(&page, 0.0, 500.0).await.unwrap();

        let deltas: Vec<f64> = page
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                MockAction::Scroll { dy, .. } => Some(dy),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 5);
        let total: f64 = deltas.iter().sum();
        assert!((total - 500.0).abs() < 1e-9);
    }
}
