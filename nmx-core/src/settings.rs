//! Named, typed analysis parameters.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    /// Short type name used when persisting.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Int(_) => "int",
            SettingValue::Float(_) => "float",
            SettingValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{v}"),
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Text(v) => write!(f, "\"{v}\""),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Text(v.to_string())
    }
}

/// A setting value with its human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub value: SettingValue,
    #[serde(default)]
    pub description: String,
}

/// Ordered name → setting map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    data: BTreeMap<String, Setting>,
}

impl Settings {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Sets a value. An empty description keeps the existing one.
    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>, description: &str) {
        let value = value.into();
        match self.data.get_mut(name) {
            Some(existing) => {
                existing.value = value;
                if !description.is_empty() {
                    existing.description = description.to_string();
                }
            }
            None => {
                self.data.insert(
                    name.to_string(),
                    Setting {
                        value,
                        description: description.to_string(),
                    },
                );
            }
        }
    }

    /// Inserts a complete setting, replacing any previous one.
    pub fn insert(&mut self, name: &str, setting: Setting) {
        self.data.insert(name.to_string(), setting);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Setting> {
        self.data.get(name)
    }

    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&SettingValue> {
        self.data.get(name).map(|s| &s.value)
    }

    /// Reads a boolean setting.
    ///
    /// # Errors
    /// Returns an error if the setting is missing or not a bool.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            SettingValue::Bool(v) => Ok(*v),
            _ => Err(type_error(name, "bool")),
        }
    }

    /// Reads an integer setting.
    ///
    /// # Errors
    /// Returns an error if the setting is missing or not an integer.
    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            SettingValue::Int(v) => Ok(*v),
            _ => Err(type_error(name, "int")),
        }
    }

    /// Reads a numeric setting, widening integers.
    ///
    /// # Errors
    /// Returns an error if the setting is missing or not numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.require(name)? {
            SettingValue::Float(v) => Ok(*v),
            SettingValue::Int(v) => Ok(*v as f64),
            _ => Err(type_error(name, "float")),
        }
    }

    fn require(&self, name: &str) -> Result<&SettingValue> {
        self.get_value(name)
            .ok_or_else(|| Error::MissingSetting(name.to_string()))
    }

    /// Iterates settings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Multi-line listing, one setting per line.
    #[must_use]
    pub fn describe(&self, indent: &str) -> String {
        let mut out = String::new();
        for (name, setting) in &self.data {
            out.push_str(&format!(
                "{indent}{name} ({}) = {}   {}\n",
                setting.value.kind(),
                setting.value,
                setting.description
            ));
        }
        out
    }
}

fn type_error(name: &str, expected: &'static str) -> Error {
    Error::SettingType {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_set_keeps_description() {
        let mut s = Settings::new();
        s.set("weighted", true, "weight strips by amplitude");
        s.set("weighted", false, "");
        let setting = s.get("weighted").unwrap();
        assert_eq!(setting.value, SettingValue::Bool(false));
        assert_eq!(setting.description, "weight strips by amplitude");
    }

    #[test]
    fn test_typed_getters() {
        let mut s = Settings::new();
        s.set("bins", 3_i64, "");
        s.set("scale", 0.5, "");
        assert_eq!(s.get_int("bins").unwrap(), 3);
        assert_relative_eq!(s.get_float("bins").unwrap(), 3.0);
        assert_relative_eq!(s.get_float("scale").unwrap(), 0.5);
        assert!(matches!(s.get_bool("bins"), Err(Error::SettingType { .. })));
        assert!(matches!(s.get_int("nope"), Err(Error::MissingSetting(_))));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"weighted": {"value": true, "description": "w"}, "bins": {"value": 3}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.get_value("weighted"), Some(&SettingValue::Bool(true)));
        assert_eq!(s.get_value("bins"), Some(&SettingValue::Int(3)));
        assert_eq!(s.get("bins").unwrap().description, "");
    }
}
