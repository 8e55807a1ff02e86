//! Tempo configuration for the human-behavior layer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize tempo config: {0}")]
    Deserialize(String),
}

/// A delay window in milliseconds. Sampled as the mean of three
/// uniform draws, which clusters around the midpoint the way human
/// reaction times do.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizerConfig {
    /// Pause before a click gesture starts.
    pub before_click: DelayWindow,
    /// Hover pause between arriving at the target and pressing.
    pub hover: DelayWindow,
    /// Pause before typing begins.
    pub before_type: DelayWindow,
    /// Pause between individual keystrokes.
    pub between_keys: DelayWindow,
    /// Occasional longer pause mid-typing.
    pub thinking: DelayWindow,
    /// Per-character probability of a thinking pause.
    pub thinking_chance: f64,
    /// Points sampled along a pointer path, endpoints included.
    pub pointer_steps: u8,
    /// Pause between pointer path points.
    pub pointer_dwell: DelayWindow,
    /// Magnitude of the control-point perturbation, as a fraction of
    /// the move distance.
    pub curve_jitter: f64,
    /// Number of increments a scroll is split into.
    pub scroll_increments: u8,
    /// Pause between scroll increments.
    pub scroll_dwell: DelayWindow,
    /// Settling pause after a navigation lands.
    pub navigation: DelayWindow,
    /// Pause spent "reading" newly revealed content.
    pub reading: DelayWindow,
    /// Catch-all pause for moments with no more specific category.
    pub generic: DelayWindow,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            before_click: DelayWindow::new(150, 450),
            hover: DelayWindow::new(60, 160),
            before_type: DelayWindow::new(200, 600),
            between_keys: DelayWindow::new(60, 180),
            thinking: DelayWindow::new(300, 800),
            thinking_chance: 0.08,
            pointer_steps: 12,
            pointer_dwell: DelayWindow::new(8, 24),
            curve_jitter: 0.2,
            scroll_increments: 5,
            scroll_dwell: DelayWindow::new(80, 220),
            navigation: DelayWindow::new(500, 1500),
            reading: DelayWindow::new(700, 1800),
            generic: DelayWindow::new(100, 400),
        }
    }
}

impl HumanizerConfig {
    /// Load from a YAML or JSON file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&raw).map_err(|err| ConfigError::Deserialize(err.to_string()))
        } else {
            serde_yaml::from_str(&raw).map_err(|err| ConfigError::Deserialize(err.to_string()))
        }
    }

    /// Config with every delay collapsed to zero, for tests.
    pub fn instant() -> Self {
        Self {
            before_click: DelayWindow::new(0, 0),
            hover: DelayWindow::new(0, 0),
            before_type: DelayWindow::new(0, 0),
            between_keys: DelayWindow::new(0, 0),
            thinking: DelayWindow::new(0, 0),
            thinking_chance: 0.0,
            pointer_dwell: DelayWindow::new(0, 0),
            scroll_dwell: DelayWindow::new(0, 0),
            navigation: DelayWindow::new(0, 0),
            reading: DelayWindow::new(0, 0),
            generic: DelayWindow::new(0, 0),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "thinking_chance: 0.2\npointer_steps: 20").unwrap();
        let config = HumanizerConfig::load(file.path()).unwrap();
        assert_eq!(config.pointer_steps, 20);
        assert!((config.thinking_chance - 0.2).abs() < f64::EPSILON);
        // Untouched fields keep their defaults.
        assert_eq!(config.scroll_increments, 5);
        assert_eq!(config.navigation.min_ms, 500);
        assert_eq!(config.reading.max_ms, 1800);
        assert_eq!(config.generic.min_ms, 100);
    }

    #[test]
    fn json_config_loads_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        writeln!(file, "{{\"scroll_increments\": 8}}").unwrap();
        let config = HumanizerConfig::load(file.path()).unwrap();
        assert_eq!(config.scroll_increments, 8);
    }

    #[test]
    fn garbage_reports_deserialize_error() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "pointer_steps: [not a number]").unwrap();
        assert!(matches!(
            HumanizerConfig::load(file.path()),
            Err(ConfigError::Deserialize(_))
        ));
    }
}
