//! Panel identity and per-panel settings

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Settings key holding a panel's refresh interval in seconds
pub const UPDATE_INTERVAL_KEY: &str = "update_interval_seconds";

/// Refresh interval used when a panel does not configure one
pub const DEFAULT_UPDATE_INTERVAL_SECS: f64 = 2.0;

/// Opaque identifier for a registered panel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PanelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PanelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Outcome of reading a panel's refresh interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntervalSetting {
    /// Interval in seconds (finite and strictly positive)
    Seconds(f64),
    /// The configured value was parsed but is not a usable interval.
    /// Panels with a disabled interval stay registered but are never fetched.
    Disabled,
}

/// Free-form key/value settings attached to a panel
///
/// Values are stored as JSON so layouts written by hand (strings) and by
/// tools (numbers, booleans) both round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelSettings(HashMap<String, Value>);

impl PanelSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Read a setting as a string, falling back to `default` when missing
    ///
    /// Non-string JSON values are rendered with their JSON text, so `2.5`
    /// and `"2.5"` both read back as `"2.5"`.
    pub fn get_config(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => default.to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Read a numeric setting from a number or a numeric string
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Resolve the panel's refresh interval
    ///
    /// A missing or unparsable value falls back to
    /// [`DEFAULT_UPDATE_INTERVAL_SECS`]; a parsed value that is not finite or
    /// not strictly positive disables scheduling for the panel.
    pub fn update_interval(&self) -> IntervalSetting {
        let raw = match self.0.get(UPDATE_INTERVAL_KEY) {
            None | Some(Value::Null) => return IntervalSetting::Seconds(DEFAULT_UPDATE_INTERVAL_SECS),
            Some(raw) => raw,
        };

        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match parsed {
            Some(secs) if secs.is_finite() && secs > 0.0 => IntervalSetting::Seconds(secs),
            Some(_) => IntervalSetting::Disabled,
            None => {
                log::warn!(
                    "Unparsable {} value {}, using default of {}s",
                    UPDATE_INTERVAL_KEY,
                    raw,
                    DEFAULT_UPDATE_INTERVAL_SECS
                );
                IntervalSetting::Seconds(DEFAULT_UPDATE_INTERVAL_SECS)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<HashMap<String, Value>> for PanelSettings {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_defaults_when_missing() {
        let settings = PanelSettings::new();
        assert_eq!(settings.update_interval(), IntervalSetting::Seconds(2.0));
    }

    #[test]
    fn test_interval_from_numeric_string() {
        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, "0.5");
        assert_eq!(settings.update_interval(), IntervalSetting::Seconds(0.5));

        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, 3);
        assert_eq!(settings.update_interval(), IntervalSetting::Seconds(3.0));
    }

    #[test]
    fn test_unparsable_interval_falls_back() {
        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, "fast");
        assert_eq!(settings.update_interval(), IntervalSetting::Seconds(2.0));
    }

    #[test]
    fn test_non_positive_interval_disables() {
        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, "0");
        assert_eq!(settings.update_interval(), IntervalSetting::Disabled);

        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, -1.5);
        assert_eq!(settings.update_interval(), IntervalSetting::Disabled);
    }

    #[test]
    fn test_get_config_renders_non_strings() {
        let settings = PanelSettings::new()
            .with("gpu_index", 1)
            .with("metric", "temperature");
        assert_eq!(settings.get_config("gpu_index", "0"), "1");
        assert_eq!(settings.get_config("metric", "utilization"), "temperature");
        assert_eq!(settings.get_config("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_settings_serialize_as_plain_map() {
        let settings = PanelSettings::new().with(UPDATE_INTERVAL_KEY, "1.0");
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"update_interval_seconds":"1.0"}"#);
    }
}
