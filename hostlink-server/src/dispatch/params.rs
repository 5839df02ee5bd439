//! Typed access to command parameters

use hostlink_protocol::{ParamKey, Params};
use serde_json::Value;

use super::OperationError;

/// Extraction helpers for a command's `params` object
pub trait ParamsExt {
    fn require(&self, key: &str) -> Result<&Value, OperationError>;
    fn require_u32(&self, key: &str) -> Result<u32, OperationError>;
    fn require_f64(&self, key: &str) -> Result<f64, OperationError>;
    fn require_str(&self, key: &str) -> Result<&str, OperationError>;

    /// Read the `track_id`/`device_id`/`param_id` triple
    fn require_param_key(&self) -> Result<ParamKey, OperationError> {
        Ok(ParamKey::new(
            self.require_u32("track_id")?,
            self.require_u32("device_id")?,
            self.require_u32("param_id")?,
        ))
    }
}

impl ParamsExt for Params {
    fn require(&self, key: &str) -> Result<&Value, OperationError> {
        self.get(key)
            .ok_or_else(|| OperationError::invalid_params(format!("missing '{}'", key)))
    }

    fn require_u32(&self, key: &str) -> Result<u32, OperationError> {
        self.require(key)?
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                OperationError::invalid_params(format!("'{}' must be a non-negative integer", key))
            })
    }

    fn require_f64(&self, key: &str) -> Result<f64, OperationError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| OperationError::invalid_params(format!("'{}' must be a number", key)))
    }

    fn require_str(&self, key: &str) -> Result<&str, OperationError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| OperationError::invalid_params(format!("'{}' must be a string", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_require_present_values() {
        let p = params(json!({"track_id": 2, "value": 0.5, "name": "Lead"}));
        assert_eq!(p.require_u32("track_id").unwrap(), 2);
        assert_eq!(p.require_f64("value").unwrap(), 0.5);
        assert_eq!(p.require_f64("track_id").unwrap(), 2.0);
        assert_eq!(p.require_str("name").unwrap(), "Lead");
    }

    #[test]
    fn test_require_missing() {
        let err = Params::new().require_u32("track_id").unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameters: missing 'track_id'");
    }

    #[test]
    fn test_require_wrong_type() {
        let p = params(json!({"track_id": -1, "value": "loud", "name": 3}));
        assert!(p.require_u32("track_id").is_err());
        assert!(p.require_f64("value").is_err());
        assert!(p.require_str("name").is_err());
    }

    #[test]
    fn test_require_param_key() {
        let p = params(json!({"track_id": 1, "device_id": 0, "param_id": 4}));
        assert_eq!(p.require_param_key().unwrap(), ParamKey::new(1, 0, 4));

        let p = params(json!({"track_id": 1, "param_id": 4}));
        assert!(p.require_param_key().is_err());
    }
}
