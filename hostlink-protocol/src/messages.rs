//! Message types for client-host communication
//!
//! Three shapes travel over the socket:
//! - [`Command`]: client -> host, correlated by an opaque `id`
//! - [`Response`]: host -> client, exactly one per command, echoing the `id`
//! - [`PushEvent`]: host -> client, unsolicited and uncorrelated
//!
//! The presence of an `id` key is the only thing that tells a response apart
//! from a push event on the wire (see [`ServerFrame`]).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Command parameters: a JSON object keyed by parameter name
pub type Params = serde_json::Map<String, Value>;

/// Well-known push event names emitted by hosts
pub mod events {
    /// A single parameter value changed on the host (raw, not debounced)
    pub const PARAMETER_CHANGED: &str = "parameter_changed";
    /// A track was renamed
    pub const TRACK_RENAMED: &str = "track_renamed";
    /// Project tempo changed
    pub const TEMPO_CHANGED: &str = "tempo_changed";
}

/// A request sent from a client to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Correlation token; absent only for fire-and-forget use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Operation name, looked up in the host's operation registry
    #[serde(rename = "type")]
    pub command_type: String,
    /// Operation parameters
    #[serde(default)]
    pub params: Params,
}

impl Command {
    /// Create an uncorrelated command
    pub fn new(command_type: impl Into<String>, params: Params) -> Self {
        Self {
            id: None,
            command_type: command_type.into(),
            params,
        }
    }

    /// Attach a correlation id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Outcome reported in a [`Response`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The single reply to a [`Command`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Copied from the triggering command (serialized as `null` if it had none)
    #[serde(default)]
    pub id: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// Successful response carrying a result
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            status: Status::Success,
            result: Some(result),
            message: None,
        }
    }

    /// Error response carrying a human-readable message
    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::Error,
            result: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Split into the result value or the error message
    pub fn into_result(self) -> Result<Value, String> {
        match self.status {
            Status::Success => Ok(self.result.unwrap_or(Value::Null)),
            Status::Error => Err(self
                .message
                .unwrap_or_else(|| "Unknown error".to_string())),
        }
    }
}

/// An unsolicited notification fanned out to every connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Anything the host may write to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(Response),
    Push(PushEvent),
}

impl ServerFrame {
    /// Classify a decoded JSON value
    ///
    /// Objects carrying an `id` key are responses; everything else must
    /// parse as a push event.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let has_id = value
            .as_object()
            .map(|obj| obj.contains_key("id"))
            .unwrap_or(false);

        if has_id {
            serde_json::from_value(value).map(ServerFrame::Response)
        } else {
            serde_json::from_value(value).map(ServerFrame::Push)
        }
    }
}

impl<'de> Deserialize<'de> for ServerFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
