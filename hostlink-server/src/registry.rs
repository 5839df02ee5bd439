//! Client connection registry
//!
//! Tracks every live connection's outbound queue so push events can be
//! broadcast. Delivery never blocks. A connection whose queue is closed has
//! gone away and is dropped from the broadcast set; a connection whose queue
//! is momentarily full stays registered and misses only that frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use hostlink_protocol::{encode_line, PushEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Unique client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a new ClientId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

/// Entry for a connected client
pub struct ClientEntry {
    /// Encoded frames waiting for this client's writer task
    pub sender: mpsc::Sender<Bytes>,
    pub peer: Option<SocketAddr>,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("peer", &self.peer)
            .field("sender_closed", &self.sender.is_closed())
            .finish()
    }
}

/// Registry of connected clients
///
/// Safe to use from connection tasks and from the host main thread alike.
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientEntry>,
    next_client_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Register a new client connection
    pub fn register_client(&self, sender: mpsc::Sender<Bytes>, peer: Option<SocketAddr>) -> ClientId {
        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));
        self.clients.insert(id, ClientEntry { sender, peer });
        debug!("Registered client {}", id);
        id
    }

    /// Unregister a client connection
    ///
    /// Returns `false` if the client was already gone.
    pub fn unregister_client(&self, client_id: ClientId) -> bool {
        let removed = self.clients.remove(&client_id).is_some();
        if removed {
            debug!("Unregistered client {}", client_id);
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Queue an encoded frame for one client
    ///
    /// A closed queue unregisters the client. A full queue drops the frame
    /// but keeps the client, since its connection is still alive.
    pub fn send_to_client(&self, client_id: ClientId, frame: Bytes) -> bool {
        let sender = match self.clients.get(&client_id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Client {} channel closed, removing from registry", client_id);
                self.unregister_client(client_id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Client {} outbound queue full, dropping frame", client_id);
                false
            }
        }
    }

    /// Queue an encoded frame for every client
    ///
    /// Returns how many clients accepted it.
    pub fn broadcast(&self, frame: Bytes) -> usize {
        let client_ids: Vec<ClientId> = self.clients.iter().map(|entry| *entry.key()).collect();

        let delivered = client_ids
            .into_iter()
            .filter(|&client_id| self.send_to_client(client_id, frame.clone()))
            .count();

        trace!(delivered, "Broadcast frame");
        delivered
    }

    /// Encode and broadcast a push event
    pub fn push_event(&self, event_type: &str, data: Value) -> usize {
        let event = PushEvent::new(event_type, data);
        match encode_line(&event) {
            Ok(frame) => self.broadcast(frame),
            Err(e) => {
                error!(event = event_type, error = %e, "Failed to encode push event");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_unregister() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(4);

        let id = registry.register_client(tx, None);
        assert_eq!(registry.client_count(), 1);
        assert!(registry.contains(id));

        assert!(registry.unregister_client(id));
        assert!(!registry.unregister_client(id));
        assert_eq!(registry.client_count(), 0);
    }

    #[test]
    fn test_client_ids_are_unique() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(4);

        let a = registry.register_client(tx.clone(), None);
        let b = registry.register_client(tx, None);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("Client({})", a.value()));
    }

    #[test]
    fn test_send_to_unknown_client() {
        let registry = ClientRegistry::new();
        assert!(!registry.send_to_client(ClientId::new(42), Bytes::from_static(b"x\n")));
    }

    #[test]
    fn test_push_event_reaches_all_clients() {
        let registry = ClientRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        registry.register_client(tx1, None);
        registry.register_client(tx2, None);

        let delivered = registry.push_event("tempo_changed", json!({"tempo": 128.0}));
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.try_recv().unwrap();
            assert!(frame.ends_with(b"\n"));
            let value: Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(value, json!({"type": "tempo_changed", "data": {"tempo": 128.0}}));
        }
    }

    #[test]
    fn test_broadcast_drops_closed_client() {
        let registry = ClientRegistry::new();
        let (live_tx, mut live_rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);
        registry.register_client(live_tx, None);
        let dead = registry.register_client(dead_tx, None);
        drop(dead_rx);

        let delivered = registry.broadcast(Bytes::from_static(b"{}\n"));
        assert_eq!(delivered, 1);
        assert!(!registry.contains(dead));
        assert_eq!(registry.client_count(), 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_drops_frame_but_keeps_client() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.register_client(tx, None);

        assert_eq!(registry.broadcast(Bytes::from_static(b"a\n")), 1);
        assert_eq!(registry.broadcast(Bytes::from_static(b"b\n")), 0);
        assert!(registry.contains(id));

        // Once the writer catches up the client receives pushes again
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"a\n"));
        assert_eq!(registry.broadcast(Bytes::from_static(b"c\n")), 1);
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"c\n"));
    }

    #[test]
    fn test_broadcast_with_no_clients() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.push_event("tempo_changed", json!({})), 0);
    }
}
