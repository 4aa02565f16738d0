use serde::{Deserialize, Serialize};

use super::{ProceduralSpaceInfo, WeightInfo, DEFAULT_NUM_LAYERS_KEY};
use crate::{
    error::{Error, Result},
    template::{self, Substitute},
};

/// The per-layer pattern, instantiated once for every layer index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerTemplates {
    pub weights: Vec<WeightInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedural_spaces: Option<Vec<ProceduralSpaceInfo>>,
}

/// One bundled architecture definition, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureDefinition {
    #[serde(rename = "model_type")]
    pub expected_model_type: String,
    pub architectures: Vec<String>,
    pub pre_weights: Vec<WeightInfo>,
    pub layer_templates: LayerTemplates,
    pub post_weights: Vec<WeightInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedural_spaces: Option<Vec<ProceduralSpaceInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_layers_config_key: Option<String>,
}

impl ArchitectureDefinition {
    /// Parses and validates a definition; `resource` names it in errors.
    pub fn from_json(resource: &str, text: &str) -> Result<Self> {
        let definition: Self =
            serde_json::from_str(text).map_err(|e| Error::schema(resource, e))?;
        definition.validate(resource)?;
        Ok(definition)
    }

    fn validate(&self, resource: &str) -> Result<()> {
        if self.architectures.is_empty() {
            return Err(Error::schema(resource, "architectures must not be empty"));
        }
        if self.num_layers_config_key.as_deref() == Some("") {
            return Err(Error::schema(resource, "num_layers_config_key must not be empty"));
        }
        for template in self.templates() {
            template::validate(template).map_err(|e| Error::schema(resource, e))?;
        }
        Ok(())
    }

    pub fn num_layers_config_key(&self) -> &str {
        self.num_layers_config_key
            .as_deref()
            .unwrap_or(DEFAULT_NUM_LAYERS_KEY)
    }

    pub fn layer_spaces(&self) -> &[ProceduralSpaceInfo] {
        self.layer_templates.procedural_spaces.as_deref().unwrap_or_default()
    }

    pub fn global_spaces(&self) -> &[ProceduralSpaceInfo] {
        self.procedural_spaces.as_deref().unwrap_or_default()
    }

    /// Every weight template: pre, layer, then post.
    pub fn weight_templates(&self) -> impl Iterator<Item = &WeightInfo> {
        self.pre_weights
            .iter()
            .chain(&self.layer_templates.weights)
            .chain(&self.post_weights)
    }

    fn templates(&self) -> impl Iterator<Item = &str> {
        self.weight_templates()
            .flat_map(|w| w.templates())
            .chain(
                self.global_spaces()
                    .iter()
                    .chain(self.layer_spaces())
                    .flat_map(|s| s.templates()),
            )
    }
}
