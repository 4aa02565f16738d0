//! Pre/post weight name tables for converting a model declared under one
//! architecture into another.

use std::collections::{btree_map::Entry, BTreeMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const DESTINATION: &str = "destination";

/// One bundled mapping resource, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingInfo {
    pub start_architectures: Vec<String>,
    pub destination_architectures: Vec<String>,
    pub pre_weights_mapping: BTreeMap<String, Vec<String>>,
    pub post_weights_mapping: BTreeMap<String, Vec<String>>,
}

impl MappingInfo {
    pub fn from_json(resource: &str, text: &str) -> Result<Self> {
        let info: Self = serde_json::from_str(text).map_err(|e| Error::schema(resource, e))?;
        if info.start_architectures.is_empty() || info.destination_architectures.is_empty() {
            return Err(Error::schema(
                resource,
                "start and destination architectures must not be empty",
            ));
        }
        for (table, mapping) in [
            ("pre_weights_mapping", &info.pre_weights_mapping),
            ("post_weights_mapping", &info.post_weights_mapping),
        ] {
            if !mapping.contains_key(DESTINATION) {
                return Err(Error::schema(
                    resource,
                    format!("{} has no {} list", table, DESTINATION),
                ));
            }
        }
        Ok(info)
    }

    /// The destination-side names of this resource.
    pub fn destination(&self) -> Mapping {
        let side = |table: &BTreeMap<String, Vec<String>>| {
            table.get(DESTINATION).cloned().unwrap_or_default()
        };
        Mapping {
            pre_weights: side(&self.pre_weights_mapping),
            post_weights: side(&self.post_weights_mapping),
        }
    }
}

/// Destination pre/post weight names for one (start, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub pre_weights: Vec<String>,
    pub post_weights: Vec<String>,
}

/// Start architecture → destination architecture → mapping. Lookups are
/// direction-sensitive; nothing is inferred for the reverse pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    mappings: BTreeMap<String, BTreeMap<String, Mapping>>,
}

impl MappingTable {
    /// Registers every start × destination pair of `info`. A pair that is
    /// already present keeps its first mapping.
    pub fn insert(&mut self, info: &MappingInfo) {
        let mapping = info.destination();
        for start in &info.start_architectures {
            let targets = self.mappings.entry(start.clone()).or_default();
            for destination in &info.destination_architectures {
                match targets.entry(destination.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(mapping.clone());
                    }
                    Entry::Occupied(_) => {
                        debug!("mapping {} -> {} already registered", start, destination)
                    }
                }
            }
        }
    }

    pub fn get(&self, start: &str, destination: &str) -> Option<&Mapping> {
        self.mappings.get(start)?.get(destination)
    }

    pub fn destinations(&self, start: &str) -> impl Iterator<Item = &str> {
        self.mappings
            .get(start)
            .into_iter()
            .flat_map(|targets| targets.keys().map(String::as_str))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Mapping)> {
        self.mappings.iter().flat_map(|(start, targets)| {
            targets
                .iter()
                .map(move |(destination, mapping)| (start.as_str(), destination.as_str(), mapping))
        })
    }

    pub fn len(&self) -> usize {
        self.mappings.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
