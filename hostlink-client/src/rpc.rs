//! Request helpers on top of [`Connection`]
//!
//! [`Connection::send`] hands back the raw [`Response`](hostlink_protocol::Response).
//! The helpers here turn error responses into [`HostlinkError::Host`] and
//! decode results into typed values. [`HostApi`] wraps the demo host's
//! operations.

use hostlink_protocol::{ParamKey, ParameterSnapshot, Params, ProjectSnapshot, TrackSnapshot};
use hostlink_utils::{HostlinkError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::Connection;

impl Connection {
    /// Send a command and return its result, mapping error responses to errors
    pub async fn cmd(&self, command_type: &str, params: Params) -> Result<Value> {
        let response = self.send(command_type, params).await?;
        let result = response
            .into_result()
            .map_err(|message| HostlinkError::host(command_type, message))?;
        Ok(result)
    }

    /// Send a command with serializable params and decode its result
    ///
    /// `params` must serialize to a JSON object (or unit, for none).
    pub async fn call<P, R>(&self, command_type: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = to_params(command_type, params)?;
        let result = self.cmd(command_type, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

fn to_params<P: Serialize + ?Sized>(command_type: &str, params: &P) -> Result<Params> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Params::new()),
        other => Err(HostlinkError::protocol(format!(
            "params for {} must be an object, got {}",
            command_type, other
        ))),
    }
}

/// Result of `set_parameter`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ParameterUpdate {
    pub old_value: f64,
    pub value: f64,
}

/// Result of `set_tempo`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TempoUpdate {
    pub old_tempo: f64,
    pub tempo: f64,
}

/// Result of `rename_track`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackRename {
    pub old_name: String,
    pub name: String,
}

/// Result of the listener operations
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ListenerStatus {
    pub listening: bool,
    /// Parameters that received an initial notification
    #[serde(default)]
    pub parameters: usize,
}

#[derive(Serialize)]
struct TrackTarget {
    track_id: u32,
}

#[derive(Serialize)]
struct SetParameter {
    #[serde(flatten)]
    key: ParamKey,
    value: f64,
}

#[derive(Serialize)]
struct SetTempo {
    tempo: f64,
}

#[derive(Serialize)]
struct RenameTrack<'a> {
    track_id: u32,
    name: &'a str,
}

/// Typed client for the demo host's operations
#[derive(Clone)]
pub struct HostApi {
    connection: Connection,
}

impl HostApi {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn ping(&self) -> Result<()> {
        self.connection.cmd("ping", Params::new()).await.map(|_| ())
    }

    pub async fn get_state(&self) -> Result<ProjectSnapshot> {
        self.connection.call("get_state", &()).await
    }

    pub async fn get_track(&self, track_id: u32) -> Result<TrackSnapshot> {
        self.connection
            .call("get_track", &TrackTarget { track_id })
            .await
    }

    pub async fn get_parameter(&self, key: ParamKey) -> Result<ParameterSnapshot> {
        self.connection.call("get_parameter", &key).await
    }

    pub async fn set_parameter(&self, key: ParamKey, value: f64) -> Result<ParameterUpdate> {
        self.connection
            .call("set_parameter", &SetParameter { key, value })
            .await
    }

    pub async fn set_tempo(&self, tempo: f64) -> Result<TempoUpdate> {
        self.connection.call("set_tempo", &SetTempo { tempo }).await
    }

    pub async fn rename_track(&self, track_id: u32, name: &str) -> Result<TrackRename> {
        self.connection
            .call("rename_track", &RenameTrack { track_id, name })
            .await
    }

    /// Ask the host to report parameter changes
    ///
    /// The host fires one initial `parameter_changed` per parameter right
    /// away, so a sync engine should be started before calling this.
    pub async fn start_parameter_listeners(&self) -> Result<ListenerStatus> {
        self.connection
            .call("start_parameter_listeners", &())
            .await
    }

    pub async fn stop_parameter_listeners(&self) -> Result<ListenerStatus> {
        self.connection
            .call("stop_parameter_listeners", &())
            .await
    }
}
