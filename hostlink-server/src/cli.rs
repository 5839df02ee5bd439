//! Command-line argument parsing for hostlink-server

use clap::Parser;
use std::path::PathBuf;

use hostlink_server::ServerConfig;
use hostlink_utils::{LogConfig, LogOutput};

/// hostlink-server - host-side command dispatcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file to load instead of the default location
    #[arg(long, short = 'c', env = "HOSTLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(long, short = 'p', env = "HOSTLINK_PORT")]
    pub port: Option<u16>,

    /// How long write operations may wait for the main thread
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Also write logs to the state directory
    #[arg(long)]
    pub log_file: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging setup for this invocation
    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::server();
        if self.log_file {
            config.with_output(LogOutput::Both)
        } else {
            config
        }
    }

    /// Overlay command-line values on top of file configuration
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout_ms = timeout;
        }
    }
}
