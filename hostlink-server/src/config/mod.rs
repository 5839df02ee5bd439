//! Configuration management for the dispatch server
//!
//! The server reads the `[server]` table of the shared hostlink config file.
//! Other tables belong to the client and are ignored here.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;
