use super::{
    check_layer_index, Architecture, ArchitectureDefinition, ProceduralSpaceInfo, WeightInfo,
};
use crate::{
    config::ModelConfig,
    error::Result,
    template::{Substitute, Substitutions},
};

/// An architecture described entirely by a bundled JSON definition.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonArchitecture {
    resource: String,
    definition: ArchitectureDefinition,
}

impl JsonArchitecture {
    pub fn new(resource: impl Into<String>, definition: ArchitectureDefinition) -> Self {
        Self {
            resource: resource.into(),
            definition,
        }
    }

    pub fn from_json(resource: &str, text: &str) -> Result<Self> {
        Ok(Self::new(resource, ArchitectureDefinition::from_json(resource, text)?))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn definition(&self) -> &ArchitectureDefinition {
        &self.definition
    }

    pub fn expected_model_type(&self) -> &str {
        &self.definition.expected_model_type
    }

    fn substitute_all<T: Substitute>(items: &[T], table: &Substitutions) -> Result<Vec<T>> {
        items.iter().map(|item| item.substitute(table)).collect()
    }
}

impl Architecture for JsonArchitecture {
    fn name(&self) -> &str {
        self.definition
            .architectures
            .first()
            .map(String::as_str)
            .unwrap_or(self.resource.as_str())
    }

    fn pre_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        let table = Substitutions::new(self.num_layers(config)?)?;
        Self::substitute_all(&self.definition.pre_weights, &table)
    }

    fn post_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        let table = Substitutions::new(self.num_layers(config)?)?;
        Self::substitute_all(&self.definition.post_weights, &table)
    }

    fn layer_weights(&self, index: usize, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        let num_layers = self.num_layers(config)?;
        check_layer_index(index, num_layers)?;
        let table = Substitutions::for_layer(num_layers, index)?;
        Self::substitute_all(&self.definition.layer_templates.weights, &table)
    }

    fn sliceable(&self) -> bool {
        true
    }

    fn num_layers_config_key(&self) -> &str {
        self.definition.num_layers_config_key()
    }

    fn procedural_spaces(&self, config: &ModelConfig) -> Result<Vec<ProceduralSpaceInfo>> {
        let num_layers = self.num_layers(config)?;
        let mut res = Self::substitute_all(
            self.definition.global_spaces(),
            &Substitutions::new(num_layers)?,
        )?;
        for index in 0..num_layers {
            let table = Substitutions::for_layer(num_layers, index)?;
            res.extend(Self::substitute_all(self.definition.layer_spaces(), &table)?);
        }
        Ok(res)
    }

    fn has_defined_spaces(&self) -> bool {
        !self.definition.global_spaces().is_empty()
            || !self.definition.layer_spaces().is_empty()
            || self.definition.weight_templates().any(WeightInfo::has_spaces)
    }
}
