//! Demo host
//!
//! A self-contained stand-in for a real host application: an in-memory
//! project whose reads and writes are exposed as dispatch operations, and
//! whose changes are broadcast as push events.

mod model;
mod operations;

pub use model::{Project, TEMPO_MAX, TEMPO_MIN};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hostlink_protocol::ProjectSnapshot;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::OperationRegistry;
use crate::registry::ClientRegistry;

/// Host state plus the broadcast channel for its change notifications
pub struct Host {
    project: RwLock<Project>,
    listening: AtomicBool,
    registry: Arc<ClientRegistry>,
}

impl Host {
    pub fn new(project: Project, registry: Arc<ClientRegistry>) -> Arc<Self> {
        Arc::new(Self {
            project: RwLock::new(project),
            listening: AtomicBool::new(false),
            registry,
        })
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        self.project.read().snapshot().clone()
    }

    /// Whether parameter listeners are installed
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Register every host operation
    pub fn register_operations(self: &Arc<Self>, ops: &mut OperationRegistry) {
        operations::register(self, ops);
    }

    fn emit(&self, event_type: &str, data: Value) {
        let delivered = self.registry.push_event(event_type, data);
        debug!(event = event_type, delivered, "Emitted push event");
    }
}
