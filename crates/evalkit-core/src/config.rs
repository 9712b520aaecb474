use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const TARGET_KEY: &str = "_target_";

/// A component described as data: `{ _target_: "<registered name>", ...params }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "_target_")]
    pub target: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl ComponentSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param<T: Serialize>(mut self, key: &str, value: T) -> AppResult<Self> {
        let value = serde_yaml::to_value(value).map_err(|e| {
            AppError::usage(format!("{}: invalid value for '{key}': {e}", self.target))
        })?;
        self.params.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AppError::usage(format!("failed to read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&data).map_err(|e| {
            AppError::usage(format!(
                "failed to parse config {}: {}",
                path.display(),
                e.message()
            ))
        })
    }

    pub fn from_yaml_str(data: &str) -> AppResult<Self> {
        let spec: ComponentSpec =
            serde_yaml::from_str(data).map_err(|e| AppError::usage(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.target.trim().is_empty() {
            return Err(AppError::usage(format!("{TARGET_KEY} is empty")));
        }
        Ok(())
    }

    /// Decodes the parameters (everything except `_target_`) into `T`.
    pub fn params<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut mapping = Mapping::new();
        for (key, value) in &self.params {
            mapping.insert(Value::String(key.clone()), value.clone());
        }
        serde_yaml::from_value(Value::Mapping(mapping))
            .map_err(|e| AppError::usage(format!("{}: {e}", self.target)))
    }
}
