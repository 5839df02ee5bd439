//! hostlink-protocol: Shared wire definitions for the hostlink bridge
//!
//! This crate defines the messages exchanged between the host dispatch
//! server and its clients over TCP, the newline-delimited JSON framing
//! used on that socket, and the project/parameter types both sides decode.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{encode_line, ClientCodec, CodecError, Frame, ServerCodec, MAX_LINE_LENGTH};
pub use messages::{events, Command, Params, PushEvent, Response, ServerFrame, Status};
pub use types::{
    DeviceSnapshot, ParamKey, ParameterChange, ParameterNames, ParameterSnapshot,
    ProjectSnapshot, RawParameterValue, TrackSnapshot,
};

/// Default address the dispatch server listens on and clients connect to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the bridge
pub const DEFAULT_PORT: u16 = 9877;
