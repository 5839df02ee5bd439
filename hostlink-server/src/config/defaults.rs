//! Default configuration values
//!
//! These are embedded in the binary and used when no config file exists.

/// Write operations give up waiting for the main thread after this long
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

pub const DEFAULT_MAIN_QUEUE_CAPACITY: usize = 256;

/// Default configuration as TOML (for reference/documentation)
pub const DEFAULT_CONFIG_TOML: &str = r##"
# hostlink configuration

[server]
host = "127.0.0.1"
port = 9877
write_timeout_ms = 10000
outbound_buffer = 1024
main_queue_capacity = 256

[client]
host = "127.0.0.1"
port = 9877

[sync]
debounce_ms = 500
"##;

#[cfg(test)]
mod tests {
    use super::super::{AppConfig, ServerConfig};
    use super::*;

    #[test]
    fn test_default_toml_matches_defaults() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.server, ServerConfig::default());
    }
}
