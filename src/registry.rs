//! Name-indexed architecture definitions and mappings.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    arch::{
        mixtral::{MixtralArchitecture, MIXTRAL_ARCHITECTURE},
        ArchitectureInfo, ConfiguredArchitecture, JsonArchitecture,
    },
    config::ModelConfig,
    error::{Error, Result},
    mapping::{Mapping, MappingInfo, MappingTable},
};

/// Dense definition the mixture-of-experts layout borrows its outer weights from.
const MOE_BASE_ARCHITECTURE: &str = "MistralForCausalLM";
const MOE_BASE_MODEL_TYPE: &str = "mistral";

// ordered by file name; this is the load order
const BUNDLED_ARCHITECTURES: &[(&str, &str)] = &[
    ("gpt2.json", include_str!("data/architectures/gpt2.json")),
    ("llama.json", include_str!("data/architectures/llama.json")),
    ("mistral.json", include_str!("data/architectures/mistral.json")),
    ("qwen2.json", include_str!("data/architectures/qwen2.json")),
    ("stablelm.json", include_str!("data/architectures/stablelm.json")),
    ("stablelm_epoch.json", include_str!("data/architectures/stablelm_epoch.json")),
];

const BUNDLED_MAPPINGS: &[(&str, &str)] = &[
    ("llama_to_mistral.json", include_str!("data/mappings/llama_to_mistral.json")),
    ("qwen2_to_llama.json", include_str!("data/mappings/qwen2_to_llama.json")),
];

#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: Vec<JsonArchitecture>,
    by_name: HashMap<String, Vec<usize>>,
    mappings: MappingTable,
}

impl Registry {
    /// Builds the registry from the definitions compiled into the crate.
    pub fn bundled() -> Result<Self> {
        let registry = Self::from_sources(BUNDLED_ARCHITECTURES, BUNDLED_MAPPINGS)?;
        info!(
            "loaded {} architecture definitions and {} mappings",
            registry.definitions.len(),
            registry.mappings.len()
        );
        Ok(registry)
    }

    /// Builds a registry from `(resource name, json)` pairs, validating every
    /// resource. The first failure aborts the build.
    pub fn from_sources(architectures: &[(&str, &str)], mappings: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::default();
        for (resource, text) in architectures {
            registry.add_definition(JsonArchitecture::from_json(resource, text)?)?;
        }
        for (resource, text) in mappings {
            registry.mappings.insert(&MappingInfo::from_json(resource, text)?);
        }
        Ok(registry)
    }

    fn add_definition(&mut self, arch: JsonArchitecture) -> Result<()> {
        let index = self.definitions.len();
        for name in &arch.definition().architectures {
            let candidates = self.by_name.entry(name.clone()).or_default();
            if candidates.contains(&index) {
                continue;
            }
            if let Some(&clash) = candidates.iter().find(|&&i| {
                self.definitions[i].expected_model_type() == arch.expected_model_type()
            }) {
                return Err(Error::schema(
                    arch.resource(),
                    format!(
                        "architecture {} with model_type {} is already defined by {}",
                        name,
                        arch.expected_model_type(),
                        self.definitions[clash].resource()
                    ),
                ));
            }
            candidates.push(index);
        }
        self.definitions.push(arch);
        Ok(())
    }

    pub fn definitions(&self) -> &[JsonArchitecture] {
        &self.definitions
    }

    /// Every definition declaring `name`, in load order.
    pub fn candidates(&self, name: &str) -> Vec<&JsonArchitecture> {
        self.by_name
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.definitions[i]).collect())
            .unwrap_or_default()
    }

    pub fn definition_for(&self, name: &str, model_type: &str) -> Option<&JsonArchitecture> {
        self.candidates(name)
            .into_iter()
            .find(|arch| arch.expected_model_type() == model_type)
    }

    /// Picks the one architecture implementation describing `config`.
    pub fn resolve(&self, config: &ModelConfig) -> Result<ArchitectureInfo<'_>> {
        let [arch_name] = config.architectures.as_slice() else {
            return Err(Error::UnsupportedConfiguration(config.architectures.clone()));
        };

        if arch_name == MIXTRAL_ARCHITECTURE {
            let base = self
                .definition_for(MOE_BASE_ARCHITECTURE, MOE_BASE_MODEL_TYPE)
                .ok_or_else(|| Error::UnsupportedArchitecture(arch_name.clone()))?;
            let arch = MixtralArchitecture::from_config(base, config)?;
            debug!(
                "resolved {} to mixture-of-experts layout with {} experts",
                arch_name,
                arch.num_local_experts()
            );
            return Ok(ArchitectureInfo::MixtureOfExperts(arch));
        }

        let candidates = self.candidates(arch_name);
        match candidates.len() {
            0 => Err(Error::UnsupportedArchitecture(arch_name.clone())),
            1 => {
                let only = candidates[0];
                debug!("resolved {} to {}", arch_name, only.resource());
                Ok(ArchitectureInfo::Declarative(only))
            }
            _ => {
                let arch = candidates
                    .into_iter()
                    .find(|arch| arch.expected_model_type() == config.model_type)
                    .ok_or_else(|| Error::UnsupportedModelType {
                        architecture: arch_name.clone(),
                        model_type: config.model_type.clone(),
                    })?;
                debug!(
                    "resolved {} (model_type {}) to {}",
                    arch_name,
                    config.model_type,
                    arch.resource()
                );
                Ok(ArchitectureInfo::Declarative(arch))
            }
        }
    }

    /// Resolves `config` and binds the result to it.
    pub fn configure<'a>(&'a self, config: &'a ModelConfig) -> Result<ConfiguredArchitecture<'a>> {
        Ok(self.resolve(config)?.configure(config))
    }

    pub fn mapping(&self, start: &str, destination: &str) -> Option<&Mapping> {
        self.mappings.get(start, destination)
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }
}

#[cfg(test)]
mod test {
    use crate::{
        arch::{Architecture, ArchitectureInfo, WeightOverrides},
        config::ModelConfig,
        error::Error,
        registry::Registry,
    };

    const SHARED_A: &str = r#"{
        "model_type": "a",
        "architectures": ["X"],
        "pre_weights": [{"name": "a.embed"}],
        "layer_templates": {"weights": [{"name": "a.layers.${layer_index}.w"}]},
        "post_weights": [{"name": "a.head"}]
    }"#;

    fn shared_registry() -> Registry {
        let shared_b = SHARED_A.replace(r#""a""#, r#""b""#).replace("a.", "b.");
        Registry::from_sources(&[("a.json", SHARED_A), ("b.json", shared_b.as_str())], &[]).unwrap()
    }

    fn llama(layers: usize) -> ModelConfig {
        ModelConfig::new("LlamaForCausalLM", "llama").with_attr("num_hidden_layers", layers)
    }

    #[test]
    fn test_bundled_loads() {
        let registry = Registry::bundled().unwrap();
        assert_eq!(registry.definitions().len(), 6);
        assert!(!registry.mappings().is_empty());
    }

    #[test]
    fn test_model_type_disambiguates_shared_name() {
        let registry = shared_registry();
        let config = ModelConfig::new("X", "a").with_attr("num_hidden_layers", 2);
        let weights = registry.resolve(&config).unwrap().all_weights(&config).unwrap();
        assert_eq!(weights.len(), 4);
        assert!(weights.iter().all(|w| w.name.starts_with("a.")));

        let config = ModelConfig::new("X", "b").with_attr("num_hidden_layers", 2);
        let weights = registry.resolve(&config).unwrap().all_weights(&config).unwrap();
        assert!(weights.iter().all(|w| w.name.starts_with("b.")));

        let config = ModelConfig::new("X", "c").with_attr("num_hidden_layers", 2);
        assert!(matches!(
            registry.resolve(&config),
            Err(Error::UnsupportedModelType { .. })
        ));
    }

    #[test]
    fn test_single_candidate_ignores_model_type() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("LlamaForCausalLM", "something_else")
            .with_attr("num_hidden_layers", 2);
        let arch = registry.resolve(&config).unwrap();
        assert_eq!(arch.name(), "LlamaForCausalLM");
    }

    #[test]
    fn test_duplicate_name_and_model_type_is_schema_error() {
        let err = Registry::from_sources(&[("a.json", SHARED_A), ("a2.json", SHARED_A)], &[])
            .unwrap_err();
        assert!(matches!(err, Error::Schema { resource, .. } if resource == "a2.json"));
    }

    #[test]
    fn test_unsupported_configurations() {
        let registry = Registry::bundled().unwrap();

        let mut config = llama(2);
        config.architectures.push("MistralForCausalLM".into());
        assert!(matches!(
            registry.resolve(&config),
            Err(Error::UnsupportedConfiguration(_))
        ));

        config.architectures.clear();
        assert!(matches!(
            registry.resolve(&config),
            Err(Error::UnsupportedConfiguration(_))
        ));

        let config = ModelConfig::new("BertModel", "bert");
        assert!(matches!(
            registry.resolve(&config),
            Err(Error::UnsupportedArchitecture(name)) if name == "BertModel"
        ));
    }

    #[test]
    fn test_llama_layout() {
        let registry = Registry::bundled().unwrap();
        let config = llama(4);
        let weights = registry.configure(&config).unwrap().all_weights().unwrap();
        assert_eq!(weights.len(), 1 + 4 * 9 + 2);
        assert_eq!(weights[0].name, "model.embed_tokens.weight");
        assert!(weights[0].is_embed);
        assert_eq!(weights[1].name, "model.layers.0.input_layernorm.weight");
        assert_eq!(weights[36].name, "model.layers.3.mlp.down_proj.weight");
        assert_eq!(weights[38].name, "lm_head.weight");
        assert!(weights[38].is_lm_head);
        assert!(weights.iter().all(|w| !w.name.contains('$')));
    }

    #[test]
    fn test_missing_layer_count() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("LlamaForCausalLM", "llama");
        let configured = registry.configure(&config).unwrap();
        assert!(matches!(configured.all_weights(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_oversized_layer_count_is_configuration_error() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("LlamaForCausalLM", "llama")
            .with_attr("num_hidden_layers", i64::MAX);
        let configured = registry.configure(&config).unwrap();
        assert!(matches!(configured.pre_weights(), Err(Error::Configuration(_))));
        assert!(matches!(configured.all_weights(), Err(Error::Configuration(_))));

        let config = ModelConfig::new("Qwen2ForCausalLM", "qwen2")
            .with_attr("num_hidden_layers", u64::MAX);
        let configured = registry.configure(&config).unwrap();
        assert!(matches!(configured.post_weights(), Err(Error::Configuration(_))));
        assert!(matches!(configured.procedural_spaces(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_gpt2_uses_its_own_layer_key() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("GPT2LMHeadModel", "gpt2").with_attr("n_layer", 2);
        let configured = registry.configure(&config).unwrap();
        assert_eq!(configured.num_layers().unwrap(), 2);
        assert_eq!(configured.all_weights().unwrap().len(), 2 + 2 * 12 + 3);
        assert!(!configured.has_defined_spaces());
    }

    #[test]
    fn test_stablelm_variants() {
        let registry = Registry::bundled().unwrap();
        let stablelm = ModelConfig::new("StableLmForCausalLM", "stablelm")
            .with_attr("num_hidden_layers", 1);
        let epoch = ModelConfig::new("StableLmForCausalLM", "stablelm_epoch")
            .with_attr("num_hidden_layers", 1);
        assert_eq!(registry.configure(&stablelm).unwrap().all_weights().unwrap().len(), 1 + 11 + 3);
        assert_eq!(registry.configure(&epoch).unwrap().all_weights().unwrap().len(), 1 + 9 + 2);
    }

    #[test]
    fn test_qwen2_residual_spaces() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("Qwen2ForCausalLM", "qwen2").with_attr("num_hidden_layers", 2);
        let configured = registry.configure(&config).unwrap();
        assert!(configured.has_defined_spaces());

        let spaces = configured.procedural_spaces().unwrap();
        assert_eq!(spaces.len(), 4);
        assert_eq!(spaces[3].name, "h_2");
        assert_eq!(spaces[3].inputs, vec!["h_a_1", "post_mlp_1"]);

        let post = configured.post_weights().unwrap();
        assert_eq!(post[0].input_space.as_deref(), Some("h_2"));
    }

    #[test]
    fn test_mixtral_plugin() {
        let registry = Registry::bundled().unwrap();
        let config = ModelConfig::new("MixtralForCausalLM", "mixtral")
            .with_attr("num_hidden_layers", 3)
            .with_attr("num_local_experts", 8);
        let arch = registry.resolve(&config).unwrap();
        assert!(matches!(arch, ArchitectureInfo::MixtureOfExperts(_)));
        assert!(arch.sliceable());

        let configured = arch.configure(&config);
        assert_eq!(configured.layer_weights(2).unwrap().len(), 25);
        assert_eq!(configured.all_weights().unwrap().len(), 1 + 3 * 25 + 2);

        // overrides apply to the plugin as well
        let restricted = configured
            .with_overrides(WeightOverrides {
                pre_weights: None,
                post_weights: Some(vec!["model.norm.weight".into()]),
            })
            .unwrap();
        assert_eq!(restricted.all_weights().unwrap().len(), 1 + 3 * 25 + 1);
    }

    #[test]
    fn test_mixtral_needs_dense_base() {
        let registry = shared_registry();
        let config = ModelConfig::new("MixtralForCausalLM", "mixtral")
            .with_attr("num_hidden_layers", 3)
            .with_attr("num_local_experts", 8);
        assert!(matches!(
            registry.resolve(&config),
            Err(Error::UnsupportedArchitecture(_))
        ));
    }

    #[test]
    fn test_bundled_mappings() {
        let registry = Registry::bundled().unwrap();
        let mapping = registry.mapping("LlamaForCausalLM", "MistralForCausalLM").unwrap();
        assert_eq!(mapping.pre_weights, vec!["model.embed_tokens.weight"]);
        assert_eq!(mapping.post_weights, vec!["model.norm.weight", "lm_head.weight"]);
        assert!(registry.mapping("MistralForCausalLM", "LlamaForCausalLM").is_none());
        assert!(registry.mapping("Qwen2ForCausalLM", "MistralForCausalLM").is_some());
    }

    #[test]
    fn test_mapping_names_exist_in_destination() {
        let registry = Registry::bundled().unwrap();
        for (_, destination, mapping) in registry.mappings().iter() {
            let dest = registry.candidates(destination)[0];
            let config = ModelConfig::new(destination, dest.expected_model_type())
                .with_attr("num_hidden_layers", 1);
            let configured = registry.configure(&config).unwrap();
            let restricted = configured
                .with_overrides(WeightOverrides {
                    pre_weights: Some(mapping.pre_weights.clone()),
                    post_weights: Some(mapping.post_weights.clone()),
                })
                .unwrap();
            assert_eq!(restricted.pre_weights().unwrap().len(), mapping.pre_weights.len());
            assert_eq!(restricted.post_weights().unwrap().len(), mapping.post_weights.len());
        }
    }
}
