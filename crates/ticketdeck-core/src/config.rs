use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine tuning loaded from `.ticketdeck/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    /// Number of numbered page buttons shown around the current page.
    #[serde(default = "default_page_window")]
    pub page_window: u32,
    /// Quiescence delay applied to free-text filter input.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    #[serde(default = "default_push_path")]
    pub push_path: String,
    /// Statuses a ticket may be dragged to. Empty means "let the server decide".
    #[serde(default = "default_allowed_statuses")]
    pub allowed_statuses: Vec<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            page_window: default_page_window(),
            debounce_ms: default_debounce_ms(),
            cache_key: default_cache_key(),
            push_path: default_push_path(),
            allowed_statuses: default_allowed_statuses(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document, filling absent keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for this schema or
    /// fails [`EngineConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("invalid engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration before building an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.items_per_page == 0 {
            bail!("items_per_page must be > 0");
        }
        if self.page_window == 0 {
            bail!("page_window must be > 0");
        }
        if self.cache_key.trim().is_empty() {
            bail!("cache_key must not be empty");
        }
        if !self.push_path.starts_with('/') {
            bail!("push_path must start with '/'");
        }
        self.reconnect.validate()
    }
}

/// Which reconnection schedule the push channel follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicyKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub policy: ReconnectPolicyKind,
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
    /// Upper bound for the exponential policy; ignored by `fixed`.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_reconnect_factor")]
    pub factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicyKind::default(),
            delay_ms: default_reconnect_delay_ms(),
            max_delay_ms: default_reconnect_max_delay_ms(),
            factor: default_reconnect_factor(),
        }
    }
}

impl ReconnectConfig {
    fn validate(&self) -> Result<()> {
        if self.delay_ms == 0 {
            bail!("reconnect.delay_ms must be > 0");
        }
        if self.policy == ReconnectPolicyKind::Exponential {
            if self.max_delay_ms < self.delay_ms {
                bail!("reconnect.max_delay_ms must be >= reconnect.delay_ms");
            }
            if !self.factor.is_finite() || self.factor < 1.0 {
                bail!("reconnect.factor must be a finite number >= 1.0");
            }
        }
        Ok(())
    }
}

/// Load `.ticketdeck/config.toml` under `project_root`, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_engine_config(project_root: &Path) -> Result<EngineConfig> {
    let path = project_root.join(".ticketdeck/config.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    EngineConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_items_per_page() -> u32 {
    10
}

const fn default_page_window() -> u32 {
    5
}

const fn default_debounce_ms() -> u64 {
    250
}

fn default_cache_key() -> String {
    "ticketdeck.filters".to_string()
}

fn default_push_path() -> String {
    "/ws/tickets".to_string()
}

fn default_allowed_statuses() -> Vec<String> {
    ["en_attente", "en_cours", "resolu"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_reconnect_delay_ms() -> u64 {
    3_000
}

const fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

const fn default_reconnect_factor() -> f64 {
    2.0
}
