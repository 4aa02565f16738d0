use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Architecture, ArchitectureInfo, ProceduralSpaceInfo, WeightInfo};
use crate::{
    config::ModelConfig,
    error::{Error, Result},
};

/// Restricts which pre/post weights a model actually has, e.g. after an
/// earlier edit dropped the embedding or head. `None` keeps the full list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default)]
    pub pre_weights: Option<Vec<String>>,
    #[serde(default)]
    pub post_weights: Option<Vec<String>>,
}

impl WeightOverrides {
    pub fn is_empty(&self) -> bool {
        self.pre_weights.is_none() && self.post_weights.is_none()
    }
}

/// An architecture bound to one model's config.
#[derive(Debug, Clone)]
pub struct ConfiguredArchitecture<'a> {
    info: ArchitectureInfo<'a>,
    config: &'a ModelConfig,
    overrides: Option<WeightOverrides>,
}

impl<'a> ConfiguredArchitecture<'a> {
    pub fn new(info: ArchitectureInfo<'a>, config: &'a ModelConfig) -> Self {
        Self {
            info,
            config,
            overrides: None,
        }
    }

    /// Returns a new binding restricted by `overrides`. Each present segment
    /// must be a non-empty subset of the unrestricted names.
    pub fn with_overrides(&self, overrides: WeightOverrides) -> Result<Self> {
        check_segment(
            "pre_weights",
            overrides.pre_weights.as_deref(),
            &self.info.pre_weights(self.config)?,
        )?;
        check_segment(
            "post_weights",
            overrides.post_weights.as_deref(),
            &self.info.post_weights(self.config)?,
        )?;
        Ok(Self {
            info: self.info.clone(),
            config: self.config,
            overrides: (!overrides.is_empty()).then_some(overrides),
        })
    }

    pub fn info(&self) -> &ArchitectureInfo<'a> {
        &self.info
    }

    pub fn config(&self) -> &'a ModelConfig {
        self.config
    }

    pub fn overrides(&self) -> Option<&WeightOverrides> {
        self.overrides.as_ref()
    }

    pub fn num_layers(&self) -> Result<usize> {
        self.info.num_layers(self.config)
    }

    pub fn pre_weights(&self) -> Result<Vec<WeightInfo>> {
        let weights = self.info.pre_weights(self.config)?;
        let keep = self.overrides.as_ref().and_then(|o| o.pre_weights.as_deref());
        Ok(filter(weights, keep))
    }

    pub fn post_weights(&self) -> Result<Vec<WeightInfo>> {
        let weights = self.info.post_weights(self.config)?;
        let keep = self.overrides.as_ref().and_then(|o| o.post_weights.as_deref());
        Ok(filter(weights, keep))
    }

    /// Layer contents are fixed by the architecture; overrides never apply.
    pub fn layer_weights(&self, index: usize) -> Result<Vec<WeightInfo>> {
        self.info.layer_weights(index, self.config)
    }

    pub fn all_weights(&self) -> Result<Vec<WeightInfo>> {
        let num_layers = self.num_layers()?;
        let mut res = self.pre_weights()?;
        for index in 0..num_layers {
            res.extend(self.layer_weights(index)?);
        }
        res.extend(self.post_weights()?);
        Ok(res)
    }

    pub fn procedural_spaces(&self) -> Result<Vec<ProceduralSpaceInfo>> {
        self.info.procedural_spaces(self.config)
    }

    pub fn has_defined_spaces(&self) -> bool {
        self.info.has_defined_spaces()
    }

    pub fn sliceable(&self) -> bool {
        self.info.sliceable()
    }
}

fn check_segment(
    segment: &'static str,
    keep: Option<&[String]>,
    weights: &[WeightInfo],
) -> Result<()> {
    let Some(keep) = keep else {
        return Ok(());
    };
    if keep.is_empty() {
        return Err(Error::InvalidOverride {
            segment,
            message: "override list is empty".to_owned(),
        });
    }
    let known: HashSet<&str> = weights.iter().map(|w| w.name.as_str()).collect();
    if let Some(unknown) = keep.iter().find(|name| !known.contains(name.as_str())) {
        return Err(Error::InvalidOverride {
            segment,
            message: format!("{} is not a weight of this architecture", unknown),
        });
    }
    for dropped in weights.iter().filter(|w| !w.optional && !keep.contains(&w.name)) {
        debug!("{} override drops required weight {}", segment, dropped.name);
    }
    Ok(())
}

fn filter(weights: Vec<WeightInfo>, keep: Option<&[String]>) -> Vec<WeightInfo> {
    match keep {
        Some(keep) => {
            let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
            weights
                .into_iter()
                .filter(|w| keep.contains(w.name.as_str()))
                .collect()
        }
        None => weights,
    }
}
