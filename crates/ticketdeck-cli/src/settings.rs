//! User-level settings for the `td` host.
//!
//! Lives next to the saved filter state under the user config directory:
//! `<config_dir>/ticketdeck/config.toml`. `TICKETDECK_CONFIG_DIR` replaces
//! `<config_dir>/ticketdeck` entirely, which keeps tests off the real home.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_ENV: &str = "TICKETDECK_CONFIG_DIR";
pub const SERVER_ENV: &str = "TICKETDECK_SERVER";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Base URL of the ticket server, e.g. `http://localhost:5000`.
    pub server: Option<String>,
    /// Preferred output mode (`pretty`, `text`, `json`).
    pub output: Option<String>,
}

/// Directory holding `config.toml` and the saved filter state.
///
/// # Errors
///
/// Returns an error when no user config directory can be determined.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let base =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(base.join("ticketdeck"))
}

/// Load the user config, or defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config(dir: &Path) -> Result<UserConfig> {
    let path = dir.join("config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pick the server URL: `--server`, then `TICKETDECK_SERVER`, then the user config.
///
/// # Errors
///
/// Returns an error when no source names a server or the URL is not http(s).
pub fn resolve_server(flag: Option<&str>, user: &UserConfig) -> Result<url::Url> {
    let env = std::env::var(SERVER_ENV).ok();
    let raw = flag
        .map(str::to_string)
        .or(env)
        .or_else(|| user.server.clone())
        .ok_or_else(|| {
            anyhow!("No ticket server configured; pass --server or set {SERVER_ENV}")
        })?;
    parse_server(&raw)
}

fn parse_server(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw).with_context(|| format!("Invalid server URL `{raw}`"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Server URL must use http or https, got `{}`", url.scheme());
    }
    Ok(url)
}
