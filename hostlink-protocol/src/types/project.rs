//! Project snapshot types
//!
//! A snapshot is the host's full track/device/parameter tree at one point in
//! time. Clients cache it to resolve human-readable names for raw change
//! notifications that only carry numeric ids.

use serde::{Deserialize, Serialize};

use super::ParamKey;

/// Full project state as returned by the host's `get_state` operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// Tempo in beats per minute
    pub tempo: f64,
    pub tracks: Vec<TrackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub id: u32,
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl ProjectSnapshot {
    /// Look up a track by id
    pub fn track(&self, track_id: u32) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// Resolve a composite key to its track, device and parameter
    pub fn resolve(
        &self,
        key: ParamKey,
    ) -> Option<(&TrackSnapshot, &DeviceSnapshot, &ParameterSnapshot)> {
        let track = self.track(key.track_id)?;
        let device = track.device(key.device_id)?;
        let param = device.parameter(key.param_id)?;
        Some((track, device, param))
    }

    /// Iterate every parameter in the project with its key
    pub fn parameters(&self) -> impl Iterator<Item = (ParamKey, &ParameterSnapshot)> {
        self.tracks.iter().flat_map(|track| {
            track.devices.iter().flat_map(move |device| {
                device.parameters.iter().map(move |param| {
                    (ParamKey::new(track.id, device.id, param.id), param)
                })
            })
        })
    }

    /// Total parameter count across all tracks and devices
    pub fn parameter_count(&self) -> usize {
        self.parameters().count()
    }
}

impl TrackSnapshot {
    pub fn device(&self, device_id: u32) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.id == device_id)
    }
}

impl DeviceSnapshot {
    pub fn parameter(&self, param_id: u32) -> Option<&ParameterSnapshot> {
        self.parameters.iter().find(|p| p.id == param_id)
    }
}
