//! hostlink-client: talk to a host dispatch server
//!
//! [`Connection`] correlates requests with responses over one TCP link and
//! forwards push events to an [`EventHandler`]. [`HostApi`] wraps the host's
//! operations with typed results, and [`ParameterSync`] turns the raw stream
//! of parameter notifications into debounced, named changes.

pub mod config;
pub mod connection;
pub mod rpc;
pub mod sync;

pub use config::{load_settings, load_settings_from, ClientConfig, ClientSettings, SyncConfig};
pub use connection::{
    CallbackHandler, Connection, ConnectionState, EventHandler, DEFAULT_CONNECT_TIMEOUT,
};
pub use rpc::{HostApi, ListenerStatus, ParameterUpdate, TempoUpdate, TrackRename};
pub use sync::{ParameterSync, SyncEventHandler};
