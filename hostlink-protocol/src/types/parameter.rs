//! Parameter identity and change events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite identifier of one device parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamKey {
    pub track_id: u32,
    pub device_id: u32,
    pub param_id: u32,
}

impl ParamKey {
    pub fn new(track_id: u32, device_id: u32, param_id: u32) -> Self {
        Self {
            track_id,
            device_id,
            param_id,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.track_id, self.device_id, self.param_id)
    }
}

/// Payload of a raw `parameter_changed` push event
///
/// Hosts emit one of these for every observed value change, including the
/// initial delivery right after a listener is installed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawParameterValue {
    pub track_id: u32,
    pub device_id: u32,
    pub param_id: u32,
    pub value: f64,
}

impl RawParameterValue {
    pub fn new(key: ParamKey, value: f64) -> Self {
        Self {
            track_id: key.track_id,
            device_id: key.device_id,
            param_id: key.param_id,
            value,
        }
    }

    pub fn key(&self) -> ParamKey {
        ParamKey::new(self.track_id, self.device_id, self.param_id)
    }
}

/// Human-readable names for a parameter and its owners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterNames {
    pub track: String,
    pub device: String,
    pub parameter: String,
}

/// A coalesced, attributable parameter change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub track_id: u32,
    pub device_id: u32,
    pub param_id: u32,
    pub names: ParameterNames,
    /// Value before the burst of raw notifications started
    pub old_value: f64,
    /// Last value seen when the debounce window closed
    pub new_value: f64,
    pub min: f64,
    pub max: f64,
    pub timestamp: DateTime<Utc>,
}

impl ParameterChange {
    pub fn key(&self) -> ParamKey {
        ParamKey::new(self.track_id, self.device_id, self.param_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_key_display() {
        assert_eq!(ParamKey::new(1, 2, 3).to_string(), "1/2/3");
    }

    #[test]
    fn test_raw_value_from_wire() {
        let raw: RawParameterValue = serde_json::from_value(json!({
            "track_id": 2, "device_id": 0, "param_id": 5, "value": 0.25
        }))
        .unwrap();
        assert_eq!(raw.key(), ParamKey::new(2, 0, 5));
        assert_eq!(raw.value, 0.25);
    }

    #[test]
    fn test_parameter_change_timestamp_is_rfc3339() {
        let change = ParameterChange {
            track_id: 0,
            device_id: 1,
            param_id: 2,
            names: ParameterNames {
                track: "Bass".into(),
                device: "Filter".into(),
                parameter: "Cutoff".into(),
            },
            old_value: 10.0,
            new_value: 13.0,
            min: 0.0,
            max: 127.0,
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["names"]["parameter"], "Cutoff");
        assert!(value["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
        assert_eq!(change.key(), ParamKey::new(0, 1, 2));
    }
}
