use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::provider::Provider;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Overrides the Gemini endpoint host, e.g. for a proxy.
    pub gemini_base_url: Option<String>,
    pub ollama_url: Option<String>,
    pub database_path: Option<PathBuf>,
    /// Speech-to-text program and its arguments; the transcript is read from stdout.
    pub voice_command: Option<Vec<String>>,
    pub microphone_allowed: Option<bool>,
    pub theme: Option<Theme>,
    pub store_queue_capacity: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_microphone_allowed(allowed: bool) -> Result<()> {
        Self::update_at(&Self::get_config_path()?, |config| {
            config.microphone_allowed = Some(allowed)
        })
    }

    pub fn save_theme(theme: Theme) -> Result<()> {
        Self::update_at(&Self::get_config_path()?, |config| config.theme = Some(theme))
    }

    /// Change one setting in the file at `path`. A file that does not parse
    /// is left as it is.
    fn update_at(path: &Path, change: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = Self::load_from(path)?;
        change(&mut config);
        config.save_to(path)
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Gemini)
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    /// `GEMINI_API_KEY` wins over the config file.
    pub fn gemini_api_key(&self) -> Option<String> {
        resolve_api_key(std::env::var("GEMINI_API_KEY").ok(), self.gemini_api_key.as_deref())
    }

    pub fn gemini_base_url(&self) -> Option<String> {
        self.gemini_base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("charla").join("chat.db"))
            .unwrap_or_else(|| PathBuf::from("charla.db"))
    }

    pub fn store_queue_capacity(&self) -> usize {
        self.store_queue_capacity
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn theme(&self) -> Theme {
        self.theme.unwrap_or_default()
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("charla").join("config.json"))
    }
}

fn resolve_api_key(from_env: Option<String>, configured: Option<&str>) -> Option<String> {
    from_env
        .filter(|k| !k.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .filter(|k| !k.trim().is_empty())
}
