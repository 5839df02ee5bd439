//! Configuration schema structs

use std::time::Duration;

use hostlink_protocol::{DEFAULT_HOST, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_MAIN_QUEUE_CAPACITY, DEFAULT_OUTBOUND_BUFFER, DEFAULT_WRITE_TIMEOUT_MS,
};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
}

/// Listener and dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (loopback by default)
    pub host: String,
    /// TCP port; 0 asks the OS for an ephemeral port
    pub port: u16,
    /// How long a write operation may wait for the host main thread
    pub write_timeout_ms: u64,
    /// Frames queued per connection before broadcasts treat it as dead
    pub outbound_buffer: usize,
    /// Tasks queued for the host main thread before callers wait
    pub main_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            main_queue_capacity: DEFAULT_MAIN_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Address string suitable for `TcpListener::bind`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
