//! In-memory project model for the demo host

use hostlink_protocol::{
    DeviceSnapshot, ParamKey, ParameterSnapshot, ProjectSnapshot, TrackSnapshot,
};

use crate::dispatch::OperationError;

/// Accepted tempo range in BPM
pub const TEMPO_MIN: f64 = 20.0;
pub const TEMPO_MAX: f64 = 999.0;

/// Mutable project state
///
/// Reads may happen from any thread under the host's lock. Mutations are
/// only ever invoked from write operations, which run on the main thread.
#[derive(Debug, Clone)]
pub struct Project {
    state: ProjectSnapshot,
}

impl Project {
    pub fn new(state: ProjectSnapshot) -> Self {
        Self { state }
    }

    /// A small project with two tracks worth of devices
    pub fn demo() -> Self {
        fn param(id: u32, name: &str, value: f64, min: f64, max: f64) -> ParameterSnapshot {
            ParameterSnapshot {
                id,
                name: name.into(),
                value,
                min,
                max,
            }
        }

        Self::new(ProjectSnapshot {
            tempo: 120.0,
            tracks: vec![
                TrackSnapshot {
                    id: 0,
                    name: "Bass".into(),
                    devices: vec![
                        DeviceSnapshot {
                            id: 0,
                            name: "Filter".into(),
                            parameters: vec![
                                param(0, "Cutoff", 0.5, 0.0, 1.0),
                                param(1, "Resonance", 0.1, 0.0, 1.0),
                            ],
                        },
                        DeviceSnapshot {
                            id: 1,
                            name: "Utility".into(),
                            parameters: vec![param(0, "Gain", 0.0, -35.0, 35.0)],
                        },
                    ],
                },
                TrackSnapshot {
                    id: 1,
                    name: "Drums".into(),
                    devices: vec![DeviceSnapshot {
                        id: 0,
                        name: "Compressor".into(),
                        parameters: vec![
                            param(0, "Threshold", -12.0, -60.0, 0.0),
                            param(1, "Ratio", 4.0, 1.0, 20.0),
                        ],
                    }],
                },
            ],
        })
    }

    pub fn snapshot(&self) -> &ProjectSnapshot {
        &self.state
    }

    pub fn track(&self, track_id: u32) -> Result<&TrackSnapshot, OperationError> {
        self.state
            .track(track_id)
            .ok_or_else(|| OperationError::not_found(format!("Track {}", track_id)))
    }

    pub fn parameter(&self, key: ParamKey) -> Result<&ParameterSnapshot, OperationError> {
        self.state
            .resolve(key)
            .map(|(_, _, param)| param)
            .ok_or_else(|| OperationError::not_found(format!("Parameter {}", key)))
    }

    fn parameter_mut(&mut self, key: ParamKey) -> Result<&mut ParameterSnapshot, OperationError> {
        self.state
            .tracks
            .iter_mut()
            .find(|t| t.id == key.track_id)
            .and_then(|t| t.devices.iter_mut().find(|d| d.id == key.device_id))
            .and_then(|d| d.parameters.iter_mut().find(|p| p.id == key.param_id))
            .ok_or_else(|| OperationError::not_found(format!("Parameter {}", key)))
    }

    /// Set a parameter, returning its previous value
    pub fn set_parameter(&mut self, key: ParamKey, value: f64) -> Result<f64, OperationError> {
        let param = self.parameter_mut(key)?;
        if !(param.min..=param.max).contains(&value) {
            return Err(OperationError::OutOfRange {
                name: param.name.clone(),
                value,
                min: param.min,
                max: param.max,
            });
        }
        Ok(std::mem::replace(&mut param.value, value))
    }

    /// Set the tempo, returning the previous one
    pub fn set_tempo(&mut self, tempo: f64) -> Result<f64, OperationError> {
        if !(TEMPO_MIN..=TEMPO_MAX).contains(&tempo) {
            return Err(OperationError::OutOfRange {
                name: "Tempo".into(),
                value: tempo,
                min: TEMPO_MIN,
                max: TEMPO_MAX,
            });
        }
        Ok(std::mem::replace(&mut self.state.tempo, tempo))
    }

    /// Rename a track, returning its previous name
    pub fn rename_track(&mut self, track_id: u32, name: &str) -> Result<String, OperationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OperationError::invalid_params("track name must not be empty"));
        }
        let track = self
            .state
            .tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or_else(|| OperationError::not_found(format!("Track {}", track_id)))?;
        Ok(std::mem::replace(&mut track.name, name.to_string()))
    }
}
