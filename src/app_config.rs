//! Application configuration: one YAML file covering every layer.

use agent_core::{AgentConfig, AnthropicConfig};
use anyhow::{Context, Result};
use browser_session::SessionConfig;
use element_locator::LocatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stealth::HumanizerConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            model: defaults.model,
            api_base: defaults.api_base,
            max_tokens: defaults.max_tokens,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub humanizer: HumanizerConfig,
    pub locator: LocatorConfig,
    pub agent: AgentConfig,
    pub model: ModelSettings,
    /// Question/answer memory location. Defaults next to the identity
    /// state under the user data directory.
    pub qa_cache_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load from an explicit path, or from the default location if it
    /// exists; otherwise fall back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };
        let Some(path) = path else {
            return Ok(Self::with_data_dir_defaults());
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.fill_path_defaults();
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("webpilot").join("config.yaml"))
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webpilot")
    }

    fn with_data_dir_defaults() -> Self {
        let mut config = Self::default();
        config.fill_path_defaults();
        config
    }

    /// Point relative state at the user data directory when the
    /// config left the defaults in place.
    fn fill_path_defaults(&mut self) {
        let data = Self::data_dir();
        if self.session.state_path == SessionConfig::default().state_path {
            self.session.state_path = data.join("identity.json");
        }
        if self.qa_cache_path.is_none() {
            self.qa_cache_path = Some(data.join("qa-cache.json"));
        }
    }

    pub fn anthropic(&self, api_key: String) -> AnthropicConfig {
        AnthropicConfig {
            api_key,
            model: self.model.model.clone(),
            api_base: self.model.api_base.clone(),
            max_tokens: self.model.max_tokens,
            timeout: std::time::Duration::from_secs(self.model.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults_with_paths_filled() {
        let config = AppConfig::load(None).unwrap();
        assert!(config.qa_cache_path.is_some());
        assert!(config.session.state_path.ends_with("identity.json"));
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "agent:\n  max_steps: 7\nsession:\n  headless: false"
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.agent.max_steps, 7);
        assert!(!config.session.headless);
        assert_eq!(config.model.max_tokens, ModelSettings::default().max_tokens);
    }
}
