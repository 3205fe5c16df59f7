//! Persistent settings.
//!
//! Settings are stored as JSON at `{data_dir}/aitag/settings.json`. Missing
//! fields take their defaults, so older files keep loading as fields are added.
//! Connection values can be overridden from the environment (including a
//! `.env` file loaded by the CLI).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::completion::{CompletionClient, CompletionClientBuilder, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::metadata::{DEFAULT_TAG_LIMIT, clamp_tag_limit};
use crate::utils::ensure_parent_directory;

/// User-configurable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Bearer token. Empty means not configured.
    pub api_key: String,
    /// Default model.
    pub model: String,
    /// Guidance for title generation. Blank uses the built-in prompt.
    pub title_system_prompt: String,
    /// Guidance for tag generation. Blank uses the built-in prompt.
    pub tag_system_prompt: String,
    /// Maximum tags per note, clamped to `1..=10` when used.
    pub tag_limit: i64,
    /// Persisted tag pool as a JSON array string.
    pub tag_pool_storage: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            title_system_prompt: String::new(),
            tag_system_prompt: String::new(),
            tag_limit: DEFAULT_TAG_LIMIT as i64,
            tag_pool_storage: String::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Writes settings to `path` as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_directory(path)?;
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    /// Applies `AITAG_BASE_URL`, `AITAG_API_KEY` and `AITAG_MODEL` over the stored values.
    pub fn with_env_overrides(mut self) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(url) = read("AITAG_BASE_URL") {
            self.base_url = url;
        }
        if let Some(key) = read("AITAG_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = read("AITAG_MODEL") {
            self.model = model;
        }
        self
    }

    /// Returns `true` when an API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Returns the clamped tag limit.
    pub fn effective_tag_limit(&self) -> usize {
        clamp_tag_limit(self.tag_limit)
    }

    /// Builds a completion client from these settings.
    pub fn completion_client(&self) -> Result<CompletionClient> {
        let mut builder = CompletionClientBuilder::new()
            .base_url(self.base_url.trim())
            .api_key(self.api_key.trim());
        if !self.model.trim().is_empty() {
            builder = builder.model(self.model.trim());
        }
        builder.build().context("Failed to create completion client")
    }
}
