use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The slice of a Hugging Face style `config.json` the resolver looks at.
///
/// Layer and expert counts are not fixed fields: the key holding them is
/// chosen by each architecture definition, so every remaining attribute is
/// kept in `extra` and read on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>, // declared architecture class names
    #[serde(default)]
    pub model_type: String, // family tag, disambiguates shared names

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ModelConfig {
    pub fn new(architecture: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self {
            architectures: vec![architecture.into()],
            model_type: model_type.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Reads a non-negative integer attribute such as `num_hidden_layers`.
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self
            .extra
            .get(key)
            .ok_or_else(|| Error::Configuration(format!("missing attribute {}", key)))?;
        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "attribute {} must be a non-negative integer, got {}",
                    key, value
                ))
            })
    }
}
