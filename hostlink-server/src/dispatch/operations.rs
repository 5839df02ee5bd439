//! Named operation table
//!
//! Every command type the host understands is registered here once, at
//! startup, as either a read (runs on the connection task) or a write (runs
//! on the host main thread).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hostlink_protocol::Params;
use serde_json::Value;

/// Scheduling class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Side-effect free; executed inline on the connection task
    Read,
    /// Mutates host state; marshalled to the main thread
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Failure raised by an operation handler
///
/// The display string becomes the `message` of the error response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{name} value {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

pub type OperationResult = std::result::Result<Value, OperationError>;

/// Shared operation handler
pub type Handler = Arc<dyn Fn(&Params) -> OperationResult + Send + Sync>;

/// A registered operation
#[derive(Clone)]
pub struct OperationEntry {
    pub name: String,
    pub kind: OperationKind,
    pub handler: Handler,
}

impl fmt::Debug for OperationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Read and write operation tables
///
/// A name present in both tables resolves to the read entry.
#[derive(Default)]
pub struct OperationRegistry {
    reads: HashMap<String, OperationEntry>,
    writes: HashMap<String, OperationEntry>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a side-effect free operation
    pub fn register_read<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&Params) -> OperationResult + Send + Sync + 'static,
    {
        self.register(name, OperationKind::Read, Arc::new(handler))
    }

    /// Register a state-mutating operation
    pub fn register_write<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&Params) -> OperationResult + Send + Sync + 'static,
    {
        self.register(name, OperationKind::Write, Arc::new(handler))
    }

    pub fn register(&mut self, name: &str, kind: OperationKind, handler: Handler) -> &mut Self {
        let entry = OperationEntry {
            name: name.to_string(),
            kind,
            handler,
        };
        let table = match kind {
            OperationKind::Read => &mut self.reads,
            OperationKind::Write => &mut self.writes,
        };
        if table.insert(name.to_string(), entry).is_some() {
            tracing::warn!(operation = name, %kind, "Replaced existing operation");
        }
        self
    }

    /// Find an operation, consulting the read table first
    pub fn lookup(&self, name: &str) -> Option<&OperationEntry> {
        self.reads.get(name).or_else(|| self.writes.get(name))
    }

    /// Sorted names of operations of the given kind
    pub fn names(&self, kind: OperationKind) -> Vec<&str> {
        let table = match kind {
            OperationKind::Read => &self.reads,
            OperationKind::Write => &self.writes,
        };
        let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}
