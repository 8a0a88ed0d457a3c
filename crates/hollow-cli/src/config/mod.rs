//! Configuration management

use anyhow::{Context, Result};
use hollow_types::Bucket;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:9432";

/// Client settings stored in `~/.hollow/settings.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub bucket: Bucket,
    /// Quiet window of the save pipeline
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            project_id: 0,
            bucket: Bucket::default(),
            debounce_ms: default_debounce_ms(),
            token: None,
        }
    }
}

impl Settings {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

pub struct SettingsManager;

impl SettingsManager {
    /// Get the hollow home directory (~/.hollow)
    pub fn hollow_home() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("HOLLOW_HOME") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".hollow"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::hollow_home()?.join("settings.json"))
    }

    /// Directory holding the persisted editor session
    pub fn state_dir() -> Result<PathBuf> {
        Ok(Self::hollow_home()?.join("state"))
    }

    /// Load settings from disk
    pub fn load() -> Result<Settings> {
        let path = Self::settings_path()?;
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {:?}", path))
    }

    /// Save settings to disk
    pub fn save(settings: &Settings) -> Result<()> {
        let path = Self::settings_path()?;

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;

        // Restrict to owner only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }
}
