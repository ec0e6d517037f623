//! Settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mailbridge_core::{DEFAULT_LIMIT, Limit};
use mailbridge_script::{BridgeConfig, DEFAULT_APPLICATION, DEFAULT_PROGRAM};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "MAILBRIDGE_SETTINGS";

/// Settings read at startup. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interpreter used to run scripts.
    pub program: String,
    /// Mail client application name.
    pub application: String,
    /// Launch the client when it is not running instead of failing.
    pub launch: bool,
    /// Timeout for short scripts, in seconds.
    pub timeout_secs: u64,
    /// Timeout for listings and batches, in seconds.
    pub long_timeout_secs: u64,
    /// Limit applied when a listing request names none.
    pub default_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let bridge = BridgeConfig::new();
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            application: DEFAULT_APPLICATION.to_string(),
            launch: bridge.launch,
            timeout_secs: bridge.timeout.as_secs(),
            long_timeout_secs: bridge.long_timeout.as_secs(),
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl Settings {
    /// Settings file location: `$MAILBRIDGE_SETTINGS`, else
    /// `<config dir>/mailbridge/settings.json`.
    pub fn path() -> PathBuf {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailbridge")
            .join("settings.json")
    }

    /// Loads settings from the default location.
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::path()).await
    }

    /// Loads settings from `path`; a missing file yields defaults.
    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing settings in {}", path.display()))
    }

    /// Bridge configuration described by these settings.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::builder()
            .program(&self.program)
            .application(&self.application)
            .launch(self.launch)
            .timeout(Duration::from_secs(self.timeout_secs))
            .long_timeout(Duration::from_secs(self.long_timeout_secs))
            .build()
    }

    /// Limit used when a request names none.
    pub fn default_limit(&self) -> Limit {
        Limit::new(i64::from(self.default_limit)).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"launch": false, "default_limit": 20}"#).unwrap();
        assert!(!settings.launch);
        assert_eq!(settings.default_limit().get(), 20);
        assert_eq!(settings.program, "osascript");
        assert_eq!(settings.timeout_secs, 30);
    }

    #[test]
    fn bridge_config_follows_settings() {
        let settings = Settings {
            application: "Mail Beta".into(),
            timeout_secs: 5,
            long_timeout_secs: 60,
            ..Settings::default()
        };
        let config = settings.bridge_config();
        assert_eq!(config.application, "Mail Beta");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.long_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn missing_file_is_default() {
        let path = std::env::temp_dir().join("mailbridge-settings-that-does-not-exist.json");
        assert_eq!(Settings::load_from(&path).await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn malformed_file_is_error() {
        let name = format!("mailbridge-settings-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = Settings::load_from(&path).await.unwrap_err();
        assert!(err.to_string().contains("parsing settings"));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
