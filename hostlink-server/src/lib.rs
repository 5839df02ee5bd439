//! hostlink dispatch server
//!
//! Accepts newline-delimited JSON commands over TCP, routes them through an
//! [`dispatch::OperationRegistry`], and broadcasts host push events to every
//! connected client.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod host;
pub mod main_thread;
pub mod registry;
pub mod tcp;

use std::sync::Arc;

use tokio::sync::broadcast;

pub use config::{AppConfig, ConfigLoader, ServerConfig};
pub use connection::handle_client;
pub use dispatch::{Dispatcher, OperationError, OperationKind, OperationRegistry, ParamsExt};
pub use main_thread::{MainQueue, MainThread, MainThreadError, MainThreadHandle};
pub use registry::{ClientId, ClientRegistry};
pub use tcp::Server;

/// State shared by the accept loop and every connection task
#[derive(Clone)]
pub struct SharedState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ClientRegistry>,
    pub config: Arc<ServerConfig>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl SharedState {
    pub fn new(dispatcher: Dispatcher, registry: Arc<ClientRegistry>, config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            dispatcher: Arc::new(dispatcher),
            registry,
            config: Arc::new(config),
            shutdown_tx,
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
