//! Layered configuration merging.
//!
//! The cluster-wide configuration for each config type is assembled from two
//! layers, lowest precedence first: the stack defaults and the blueprint's
//! cluster-level overlay. Host-group overlays never enter this result; they
//! are emitted as config groups scoped to the group's hosts during
//! provisioning.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{blueprint::Blueprint, stack::StackDefinition};

/// The merged configuration of one config type.
///
/// The attribute side map is keyed by attribute name first, then property
/// name. Once merged it is never partial: a missing attribute key means no
/// property of this config type carries that attribute.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfiguration {
    pub properties: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl ResolvedConfiguration {
    /// Key-wise overwrite: every property of the higher layer replaces the
    /// lower layer's value entirely, attributes per `(attribute, property)`
    /// pair.
    pub fn apply(
        &mut self,
        properties: &BTreeMap<String, String>,
        attributes: &BTreeMap<String, BTreeMap<String, String>>,
    ) {
        for (property, value) in properties {
            self.properties.insert(property.clone(), value.clone());
        }
        for (attribute, values) in attributes {
            let merged = self.attributes.entry(attribute.clone()).or_default();
            for (property, value) in values {
                merged.insert(property.clone(), value.clone());
            }
        }
    }
}

/// The cluster-wide merged configuration, one entry per config type
/// encountered in any layer, in first-encounter order.
pub type ClusterConfiguration = IndexMap<String, ResolvedConfiguration>;

/// Pure merge of stack defaults and the blueprint's cluster-level overlays.
///
/// A config type mentioned only in the blueprint still resolves, using the
/// overlay alone.
pub fn merge_cluster_configuration(
    stack: &StackDefinition,
    blueprint: &Blueprint,
) -> ClusterConfiguration {
    let mut configuration = ClusterConfiguration::new();

    for (config_type, defaults) in stack.config_defaults() {
        let resolved = configuration.entry(config_type.clone()).or_default();
        let attributes = stack
            .config_attributes(config_type)
            .cloned()
            .unwrap_or_default();
        resolved.apply(defaults, &attributes);
    }

    for overlay in &blueprint.configurations {
        configuration
            .entry(overlay.config_type.clone())
            .or_default()
            .apply(&overlay.properties, &overlay.attributes);
    }

    configuration
}

/// Monotonically increasing version tags, one sequence per config type.
#[derive(Debug, Default)]
pub struct ConfigVersionTags {
    counters: BTreeMap<String, u64>,
}

impl ConfigVersionTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next tag for `config_type`, starting at 1.
    pub fn next(&mut self, config_type: &str) -> u64 {
        let counter = self.counters.entry(config_type.to_owned()).or_insert(0);
        *counter += 1;
        *counter
    }
}
