pub mod configured;
pub mod declarative;
pub mod definition;
pub mod mixtral;

use serde::{Deserialize, Serialize};

use crate::{
    config::ModelConfig,
    error::{Error, Result},
    template::{Substitute, Substitutions},
};

pub use configured::{ConfiguredArchitecture, WeightOverrides};
pub use declarative::JsonArchitecture;
pub use definition::{ArchitectureDefinition, LayerTemplates};
pub use mixtral::MixtralArchitecture;

pub const DEFAULT_NUM_LAYERS_KEY: &str = "num_hidden_layers";

/// Metadata for one named tensor in a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightInfo {
    pub name: String,
    #[serde(default)]
    pub is_embed: bool,
    #[serde(default)]
    pub is_lm_head: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_space: Option<String>,
    #[serde(default)]
    pub optional: bool, // may be absent from a checkpoint (e.g. tied lm_head)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
}

impl WeightInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_embed: false,
            is_lm_head: false,
            input_space: None,
            output_space: None,
            optional: false,
            aliases: None,
        }
    }

    pub fn has_spaces(&self) -> bool {
        self.input_space.is_some() || self.output_space.is_some()
    }
}

impl Substitute for WeightInfo {
    fn substitute(&self, table: &Substitutions) -> Result<Self> {
        let optional_field = |field: &Option<String>| -> Result<Option<String>> {
            field.as_deref().map(|s| table.apply_owned(s)).transpose()
        };
        let aliases = match &self.aliases {
            Some(aliases) => Some(
                aliases
                    .iter()
                    .map(|a| table.apply_owned(a))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(Self {
            name: table.apply_owned(&self.name)?,
            is_embed: self.is_embed,
            is_lm_head: self.is_lm_head,
            input_space: optional_field(&self.input_space)?,
            output_space: optional_field(&self.output_space)?,
            optional: self.optional,
            aliases,
        })
    }

    fn templates(&self) -> Vec<&str> {
        let mut res = vec![self.name.as_str()];
        res.extend(self.input_space.as_deref());
        res.extend(self.output_space.as_deref());
        res.extend(self.aliases.iter().flatten().map(String::as_str));
        res
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    Residual,
}

/// A space derived from other spaces rather than produced by a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProceduralSpaceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SpaceKind,
    pub inputs: Vec<String>,
}

impl Substitute for ProceduralSpaceInfo {
    fn substitute(&self, table: &Substitutions) -> Result<Self> {
        Ok(Self {
            name: table.apply_owned(&self.name)?,
            kind: self.kind,
            inputs: self
                .inputs
                .iter()
                .map(|i| table.apply_owned(i))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    fn templates(&self) -> Vec<&str> {
        let mut res = vec![self.name.as_str()];
        res.extend(self.inputs.iter().map(String::as_str));
        res
    }
}

/// What every architecture, declarative or hand-written, can tell about its
/// tensor layout for a given config.
pub trait Architecture {
    fn name(&self) -> &str;

    /// Weights preceding the first layer.
    fn pre_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>>;

    /// Weights following the final layer.
    fn post_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>>;

    /// Weights of layer `index`; fails for indices outside `0..num_layers`.
    fn layer_weights(&self, index: usize, config: &ModelConfig) -> Result<Vec<WeightInfo>>;

    /// Whether layers can be meaningfully sliced out and restacked.
    fn sliceable(&self) -> bool;

    fn num_layers_config_key(&self) -> &str {
        DEFAULT_NUM_LAYERS_KEY
    }

    fn num_layers(&self, config: &ModelConfig) -> Result<usize> {
        config.get_usize(self.num_layers_config_key())
    }

    /// Pre weights, then every layer in ascending order, then post weights.
    fn all_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        let num_layers = self.num_layers(config)?;
        let mut res = self.pre_weights(config)?;
        for index in 0..num_layers {
            res.extend(self.layer_weights(index, config)?);
        }
        res.extend(self.post_weights(config)?);
        Ok(res)
    }

    fn procedural_spaces(&self, _config: &ModelConfig) -> Result<Vec<ProceduralSpaceInfo>> {
        Ok(Vec::new())
    }

    /// True if the layout carries the space information that matching-based
    /// merge methods need.
    fn has_defined_spaces(&self) -> bool {
        false
    }
}

pub(crate) fn check_layer_index(index: usize, num_layers: usize) -> Result<()> {
    if index >= num_layers {
        return Err(Error::LayerOutOfRange { index, num_layers });
    }
    Ok(())
}

/// The closed set of architecture implementations the resolver can return.
#[derive(Debug, Clone)]
pub enum ArchitectureInfo<'a> {
    Declarative(&'a JsonArchitecture),
    MixtureOfExperts(MixtralArchitecture<'a>),
}

impl<'a> ArchitectureInfo<'a> {
    fn inner(&self) -> &dyn Architecture {
        match self {
            Self::Declarative(arch) => *arch,
            Self::MixtureOfExperts(arch) => arch,
        }
    }

    /// Binds this architecture to a config, without overrides.
    pub fn configure(self, config: &'a ModelConfig) -> ConfiguredArchitecture<'a> {
        ConfiguredArchitecture::new(self, config)
    }
}

impl Architecture for ArchitectureInfo<'_> {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn pre_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        self.inner().pre_weights(config)
    }

    fn post_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        self.inner().post_weights(config)
    }

    fn layer_weights(&self, index: usize, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        self.inner().layer_weights(index, config)
    }

    fn sliceable(&self) -> bool {
        self.inner().sliceable()
    }

    fn num_layers_config_key(&self) -> &str {
        self.inner().num_layers_config_key()
    }

    fn procedural_spaces(&self, config: &ModelConfig) -> Result<Vec<ProceduralSpaceInfo>> {
        self.inner().procedural_spaces(config)
    }

    fn has_defined_spaces(&self) -> bool {
        self.inner().has_defined_spaces()
    }
}
