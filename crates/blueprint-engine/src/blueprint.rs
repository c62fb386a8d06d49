//! The blueprint model: a reusable, stack-bound cluster topology template.
//!
//! A blueprint names a stack version and declares host groups, each carrying
//! component assignments and optional configuration overlays. Blueprints are
//! loaded from a [`BlueprintStore`] at resolve time and never mutated while a
//! provisioning pass runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::stack::{PropertyType, StackDefinition};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("configuration overlay {config_type:?} holds malformed property data"))]
    InvalidOverlayData {
        source: serde_json::Error,
        config_type: String,
    },
}

/// Errors returned by store implementations; opaque to the engine.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Lookup of persisted blueprints by name.
pub trait BlueprintStore {
    fn find_by_name(&self, name: &str) -> Result<Option<Blueprint>, StoreError>;
}

/// A configuration overlay scoped to one config type, either at blueprint
/// (cluster) level or inside a single host group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverlay {
    pub config_type: String,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Attribute side maps: attribute name -> property -> value.
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigOverlay {
    pub fn new(config_type: impl Into<String>) -> Self {
        Self {
            config_type: config_type.into(),
            properties: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builds an overlay from the JSON property map persisted alongside the
    /// blueprint, e.g. `{"property1": "value1"}`.
    pub fn from_json(config_type: impl Into<String>, data: &str) -> Result<Self> {
        let config_type = config_type.into();
        let properties = serde_json::from_str(data).context(InvalidOverlayDataSnafu {
            config_type: config_type.clone(),
        })?;

        Ok(Self {
            config_type,
            properties,
            attributes: BTreeMap::new(),
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A named set of components plus configuration overlays, bound to concrete
/// hosts only when a cluster instance is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub name: String,

    pub components: BTreeSet<String>,

    #[serde(default)]
    pub configurations: Vec<ConfigOverlay>,
}

impl HostGroup {
    /// The overlay for `config_type`, if this group carries one.
    pub fn configuration(&self, config_type: &str) -> Option<&ConfigOverlay> {
        self.configurations
            .iter()
            .find(|overlay| overlay.config_type == config_type)
    }
}

/// Missing properties of one classification, keyed by host group, then config
/// type. Computed once per pass and handed to the secret validator.
pub type MissingPropertyIndex = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    pub stack_name: String,
    pub stack_version: String,
    pub host_groups: Vec<HostGroup>,

    /// Cluster-level overlays applied on top of the stack defaults.
    #[serde(default)]
    pub configurations: Vec<ConfigOverlay>,
}

impl Blueprint {
    pub fn host_group(&self, name: &str) -> Option<&HostGroup> {
        self.host_groups.iter().find(|group| group.name == name)
    }

    /// The cluster-level overlay for `config_type`, if any.
    pub fn configuration(&self, config_type: &str) -> Option<&ConfigOverlay> {
        self.configurations
            .iter()
            .find(|overlay| overlay.config_type == config_type)
    }

    /// Properties of the given classification which the stack declares for a
    /// service hosted by some group, but which have no value anywhere: no
    /// stack default, no cluster-level override, and no host-group override.
    pub fn missing_properties(
        &self,
        stack: &StackDefinition,
        property_type: PropertyType,
    ) -> MissingPropertyIndex {
        let flagged_for = |service: &str| match property_type {
            PropertyType::Password => stack.password_properties(service),
        };

        let mut index = MissingPropertyIndex::new();

        for group in &self.host_groups {
            let services: BTreeSet<&str> = group
                .components
                .iter()
                .filter_map(|component| stack.service_for_component(component))
                .collect();

            for service in services {
                let Some(flagged) = flagged_for(service) else {
                    continue;
                };

                for (config_type, property) in flagged {
                    if stack.default_value(config_type, property).is_some() {
                        continue;
                    }
                    if self
                        .configuration(config_type)
                        .is_some_and(|overlay| overlay.properties.contains_key(property))
                    {
                        continue;
                    }
                    if group
                        .configuration(config_type)
                        .is_some_and(|overlay| overlay.properties.contains_key(property))
                    {
                        continue;
                    }

                    index
                        .entry(group.name.clone())
                        .or_default()
                        .entry(config_type.clone())
                        .or_default()
                        .insert(property.clone());
                }
            }
        }

        index
    }
}
