//! Command-line argument parsing for the hostlink client

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hostlink_client::ClientSettings;

/// hostlink - talk to a host dispatch server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file to load instead of the default location
    #[arg(long, short = 'c', env = "HOSTLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to connect to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(long, short = 'p', env = "HOSTLINK_PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Action {
    /// Check that the host answers
    Ping,

    /// Print the full project snapshot
    State,

    /// Send an arbitrary command and print its result
    Call {
        /// Command type, e.g. `set_parameter`
        command_type: String,

        /// Params as a JSON object
        params: Option<String>,
    },

    /// Print debounced parameter changes as JSON lines until interrupted
    Watch {
        /// Quiet period before a burst of changes is reported
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Overlay command-line values on top of file settings
    pub fn apply(&self, settings: &mut ClientSettings) {
        if let Some(host) = &self.host {
            settings.client.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.client.port = port;
        }
        if let Action::Watch {
            debounce_ms: Some(ms),
        } = self.action
        {
            settings.sync.debounce_ms = ms;
        }
    }
}
