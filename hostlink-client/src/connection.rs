//! Client-server connection management
//!
//! Provides a lazily connected, self-healing TCP link to the host dispatch
//! server with id-correlated request/response and push event delivery.

mod client;
mod handler;
mod pending;

pub use client::{Connection, ConnectionState, DEFAULT_CONNECT_TIMEOUT};
pub use handler::{CallbackHandler, EventHandler};
