//! Client-side configuration loading
//!
//! Reads the `[client]` and `[sync]` tables of the shared config file.

use std::path::Path;
use std::time::Duration;

use hostlink_protocol::{DEFAULT_HOST, DEFAULT_PORT};
use hostlink_utils::{config_file, HostlinkError, Result};
use serde::Deserialize;

/// Default debounce window for parameter change coalescing
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Client settings (subset of the shared config file)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub client: ClientConfig,
    pub sync: SyncConfig,
}

impl ClientSettings {
    /// Check merged settings (file plus command line) before connecting
    pub fn validate(&self) -> Result<()> {
        match self.problem() {
            Some(message) => Err(HostlinkError::config(message)),
            None => Ok(()),
        }
    }

    fn problem(&self) -> Option<&'static str> {
        if self.client.port == 0 {
            return Some("client.port must not be 0");
        }
        if self.sync.debounce_ms == 0 {
            return Some("sync.debounce_ms must not be 0");
        }
        None
    }
}

/// Where to reach the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parameter sync settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last raw notification before a change is reported
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SyncConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Load settings from the default config file
///
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_settings() -> ClientSettings {
    let path = config_file();

    if !path.exists() {
        return ClientSettings::default();
    }

    match load_settings_from(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load client settings, using defaults: {}", e);
            ClientSettings::default()
        }
    }
}

/// Load settings from a specific file
pub fn load_settings_from(path: &Path) -> Result<ClientSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| HostlinkError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_settings(&content, path)
}

/// Parse and validate settings
pub fn parse_settings(content: &str, path: &Path) -> Result<ClientSettings> {
    let settings: ClientSettings =
        toml::from_str(content).map_err(|e| HostlinkError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(message) = settings.problem() {
        return Err(HostlinkError::ConfigInvalid {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = ClientSettings::default();
        assert_eq!(settings.client.addr(), "127.0.0.1:9877");
        assert_eq!(settings.sync.window(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_partial() {
        let settings = parse_settings(
            r#"
            [client]
            port = 4100

            [sync]
            debounce_ms = 250

            [server]
            write_timeout_ms = 1
            "#,
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(settings.client.addr(), "127.0.0.1:4100");
        assert_eq!(settings.sync.debounce_ms, 250);
    }

    #[test]
    fn test_parse_rejects_zero_port() {
        let result = parse_settings("[client]\nport = 0\n", Path::new("test.toml"));
        assert!(matches!(result, Err(HostlinkError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_parse_rejects_zero_debounce() {
        let result = parse_settings("[sync]\ndebounce_ms = 0\n", Path::new("test.toml"));
        assert!(matches!(result, Err(HostlinkError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(parse_settings("[client", Path::new("test.toml")).is_err());
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nhost = \"10.0.0.2\"\n").unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.client.addr(), "10.0.0.2:9877");
    }

    #[test]
    fn test_load_settings_from_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_settings_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(HostlinkError::FileRead { .. })));
    }
}
