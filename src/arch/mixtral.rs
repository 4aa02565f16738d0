use super::{check_layer_index, Architecture, JsonArchitecture, WeightInfo};
use crate::{config::ModelConfig, error::Result};

pub const MIXTRAL_ARCHITECTURE: &str = "MixtralForCausalLM";
pub const NUM_EXPERTS_KEY: &str = "num_local_experts";

const EXPERT_PARAMS: [&str; 3] = ["w1", "w2", "w3"];

/// Sparse mixture-of-experts layout. The per-layer tensor count depends on
/// the expert count, so layers are enumerated in code; everything outside
/// the layers comes from the dense `base` definition.
#[derive(Debug, Clone)]
pub struct MixtralArchitecture<'a> {
    base: &'a JsonArchitecture,
    num_local_experts: usize,
}

impl<'a> MixtralArchitecture<'a> {
    pub fn new(base: &'a JsonArchitecture, num_local_experts: usize) -> Self {
        Self {
            base,
            num_local_experts,
        }
    }

    pub fn from_config(base: &'a JsonArchitecture, config: &ModelConfig) -> Result<Self> {
        Ok(Self::new(base, config.get_usize(NUM_EXPERTS_KEY)?))
    }

    pub fn num_local_experts(&self) -> usize {
        self.num_local_experts
    }

    pub fn base(&self) -> &'a JsonArchitecture {
        self.base
    }
}

impl Architecture for MixtralArchitecture<'_> {
    fn name(&self) -> &str {
        MIXTRAL_ARCHITECTURE
    }

    fn pre_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        self.base.pre_weights(config)
    }

    fn post_weights(&self, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        self.base.post_weights(config)
    }

    fn layer_weights(&self, index: usize, config: &ModelConfig) -> Result<Vec<WeightInfo>> {
        check_layer_index(index, self.num_layers(config)?)?;
        let prefix = format!("model.layers.{}.block_sparse_moe", index);
        let mut res = Vec::with_capacity(self.num_local_experts * EXPERT_PARAMS.len() + 1);
        for expert in 0..self.num_local_experts {
            for param in EXPERT_PARAMS {
                res.push(WeightInfo::new(format!(
                    "{}.experts.{}.{}.weight",
                    prefix, expert, param
                )));
            }
        }
        res.push(WeightInfo::new(format!("{}.gate.weight", prefix)));
        Ok(res)
    }

    fn sliceable(&self) -> bool {
        true
    }

    fn num_layers_config_key(&self) -> &str {
        self.base.num_layers_config_key()
    }
}
