//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use webpilot_core_types::Size;

/// Configuration for launching and persisting a browser session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit path to the Chrome/Chromium binary. When unset the
    /// launcher probes `WEBPILOT_CHROME` and well-known names on PATH.
    pub executable: Option<PathBuf>,
    /// Profile directory handed to the browser. Unset means a
    /// throwaway profile.
    pub user_data_dir: Option<PathBuf>,
    /// Where the exported identity state blob is stored.
    pub state_path: PathBuf,
    /// Initial window size.
    pub window: Size,
    /// Per-navigation deadline in milliseconds.
    pub nav_timeout_ms: u64,
    /// How often a waiter re-checks while another caller is launching.
    pub launch_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_data_dir: None,
            state_path: PathBuf::from("webpilot-state/identity.json"),
            window: Size::new(1280, 800),
            nav_timeout_ms: 20_000,
            launch_poll_ms: 150,
        }
    }
}

impl SessionConfig {
    pub fn nav_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.nav_timeout_ms)
    }

    pub fn launch_poll(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.launch_poll_ms)
    }
}
