//! Shared domain types decoded from host payloads

mod parameter;
mod project;

pub use parameter::{ParamKey, ParameterChange, ParameterNames, RawParameterValue};
pub use project::{DeviceSnapshot, ParameterSnapshot, ProjectSnapshot, TrackSnapshot};
