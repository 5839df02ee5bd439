//! TCP listener

use std::net::SocketAddr;

use hostlink_utils::{HostlinkError, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{handle_client, SharedState};

/// A bound listener ready to accept clients
pub struct Server {
    listener: TcpListener,
    state: SharedState,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Server {
    /// Bind the configured address
    ///
    /// Failing to bind is fatal to the caller; nothing retries it.
    pub async fn bind(state: SharedState) -> Result<Self> {
        let addr = state.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| HostlinkError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!("TCP listener bound to {}", listener.local_addr()?);
        let shutdown_rx = state.subscribe_shutdown();
        Ok(Self {
            listener,
            state,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Sender that stops the accept loop and every connection when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.state.shutdown_tx.clone()
    }

    /// Accept clients until shutdown is signalled
    pub async fn run(self) {
        run_tcp_accept_loop(self.listener, self.state, self.shutdown_rx).await;
    }
}

/// Run the TCP accept loop
pub async fn run_tcp_accept_loop(
    listener: TcpListener,
    shared_state: SharedState,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP connection from {}", peer_addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                        }
                        let state_clone = shared_state.clone();
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            handle_client(reader, writer, Some(peer_addr), state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("TCP accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping TCP accept loop");
                break;
            }
        }
    }
}
