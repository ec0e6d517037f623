//! Bridge configuration types.

use std::time::Duration;

/// Default interpreter used to run scripts.
pub const DEFAULT_PROGRAM: &str = "osascript";

/// Default application scripts are addressed to.
pub const DEFAULT_APPLICATION: &str = "Mail";

/// Default timeout for short scripts (resolution, mailbox edits).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for listing, search and batch scripts.
pub const DEFAULT_LONG_TIMEOUT: Duration = Duration::from_secs(120);

/// Automation bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Script interpreter executable.
    pub program: String,
    /// Application name scripts talk to.
    pub application: String,
    /// Launch the application when it is not running. When false, scripts
    /// fail with `NotRunning` instead.
    pub launch: bool,
    /// Timeout for short scripts.
    pub timeout: Duration,
    /// Timeout for scripts marked long-running.
    pub long_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            application: DEFAULT_APPLICATION.to_string(),
            launch: true,
            timeout: DEFAULT_TIMEOUT,
            long_timeout: DEFAULT_LONG_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Sets the interpreter executable.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.config.program = program.into();
        self
    }

    /// Sets the application name.
    #[must_use]
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.config.application = application.into();
        self
    }

    /// Sets whether the application may be launched.
    #[must_use]
    pub const fn launch(mut self, launch: bool) -> Self {
        self.config.launch = launch;
        self
    }

    /// Sets the short-script timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the long-running script timeout.
    #[must_use]
    pub const fn long_timeout(mut self, timeout: Duration) -> Self {
        self.config.long_timeout = timeout;
        self
    }

    /// Builds the configuration. The long timeout never drops below the
    /// short one.
    #[must_use]
    pub fn build(self) -> BridgeConfig {
        let mut config = self.config;
        config.long_timeout = config.long_timeout.max(config.timeout);
        config
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
    fn test_defaults() {
        let config = BridgeConfig::new();
        assert_eq!(config.program, "osascript");
        assert_eq!(config.application, "Mail");
        assert!(config.launch);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.long_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::builder()
            .program("/usr/bin/osascript")
            .application("Mail Beta")
            .launch(false)
            .timeout(Duration::from_secs(5))
            .long_timeout(Duration::from_secs(60))
            .build();
        assert_eq!(config.program, "/usr/bin/osascript");
        assert_eq!(config.application, "Mail Beta");
        assert!(!config.launch);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.long_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_long_timeout_clamped() {
        let config = BridgeConfig::builder()
            .timeout(Duration::from_secs(90))
            .long_timeout(Duration::from_secs(10))
            .build();
        assert_eq!(config.long_timeout, Duration::from_secs(90));
    }
}
