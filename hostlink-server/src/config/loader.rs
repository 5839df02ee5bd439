//! Configuration loader

use std::path::Path;

use hostlink_utils::{config_file, HostlinkError, Result};

use super::AppConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    ///
    /// Unlike [`ConfigLoader::load`], a missing file is an error here since
    /// the caller asked for it explicitly.
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(HostlinkError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| HostlinkError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| HostlinkError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        let server = &config.server;

        if server.host.trim().is_empty() {
            return Err(HostlinkError::config("server.host must not be empty"));
        }

        if server.write_timeout_ms == 0 {
            return Err(HostlinkError::config(
                "server.write_timeout_ms must be greater than 0",
            ));
        }

        if server.outbound_buffer == 0 {
            return Err(HostlinkError::config(
                "server.outbound_buffer must be greater than 0",
            ));
        }

        if server.main_queue_capacity == 0 {
            return Err(HostlinkError::config(
                "server.main_queue_capacity must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<AppConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(
            &path,
            r#"
            [server]
            port = 19877
            write_timeout_ms = 2500
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 19877);
        assert_eq!(config.server.write_timeout_ms, 2500);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_from_missing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        let result = ConfigLoader::load_from_path(&path);
        assert!(matches!(result, Err(HostlinkError::ConfigNotFound(_))));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = ConfigLoader::parse("invalid { toml", Path::new("test.toml"));
        assert!(matches!(result, Err(HostlinkError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_parse_wrong_type() {
        let result = ConfigLoader::parse("[server]\nport = \"high\"\n", Path::new("test.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_defaults() {
        assert!(ConfigLoader::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = AppConfig::default();
        config.server.write_timeout_ms = 0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_zero_buffers() {
        let mut config = AppConfig::default();
        config.server.outbound_buffer = 0;
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.server.main_queue_capacity = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = AppConfig::default();
        config.server.host = "  ".into();
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
