//! Read-only access to stack metadata.
//!
//! A *stack* is a versioned catalog of services, their components and their
//! default configuration. The engine never owns this data; it consults an
//! oracle once per provisioning pass and works against an immutable
//! [`StackDefinition`] snapshot from then on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::debug;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by oracle implementations. The engine treats the oracle as
/// an external collaborator, so the concrete failure is opaque to it.
pub type OracleError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to look up metadata for stack {stack_name} {stack_version}"))]
    OracleLookup {
        source: OracleError,
        stack_name: String,
        stack_version: String,
    },
}

/// Classification a stack can attach to a configuration property.
///
/// Properties flagged [`PropertyType::Password`] are secrets which require an
/// explicit value before provisioning may start.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Password,
}

/// A service shipped by a stack, e.g. a distributed filesystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackService {
    pub name: String,
}

/// A component of a stack service, e.g. the filesystem's primary daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackComponent {
    pub name: String,
}

/// A dependency one component declares on another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// `<service>/<component>` reference to the required component.
    pub name: String,
    /// Scope in which the dependency must be satisfied, e.g. `host` or
    /// `cluster`.
    pub scope: String,
}

/// One default configuration property declared by a stack service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfigEntry {
    /// The configuration unit this property belongs to. Oracles may report
    /// the backing file name (`core-site.xml`); the trailing `.xml` is
    /// stripped when the snapshot is built.
    pub config_type: String,

    pub property_name: String,

    /// The stack-level default. `None` means the stack declares the property
    /// without giving it a value.
    pub value: Option<String>,

    /// Attribute values attached to this property, keyed by attribute name,
    /// e.g. `final -> true`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub property_types: BTreeSet<PropertyType>,
}

/// The oracle supplying stack metadata. Implementations are expected to be
/// cheap to query repeatedly; the engine only reads during snapshot
/// construction.
pub trait StackMetadataOracle {
    fn services(&self, stack_name: &str, stack_version: &str)
    -> Result<Vec<StackService>, OracleError>;

    fn components(
        &self,
        stack_name: &str,
        stack_version: &str,
        service_name: &str,
    ) -> Result<Vec<StackComponent>, OracleError>;

    fn configurations(
        &self,
        stack_name: &str,
        stack_version: &str,
        service_name: &str,
    ) -> Result<Vec<StackConfigEntry>, OracleError>;

    fn component_dependencies(
        &self,
        stack_name: &str,
        stack_version: &str,
        service_name: &str,
        component_name: &str,
    ) -> Result<Vec<DependencyInfo>, OracleError>;
}

/// An immutable snapshot of everything the engine needs to know about one
/// stack version, materialized with a single burst of oracle reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackDefinition {
    stack_name: String,
    stack_version: String,

    /// Service names in oracle order.
    services: Vec<String>,

    /// Component name to owning service.
    component_services: BTreeMap<String, String>,

    /// Dependencies declared per component. Recorded for callers; the engine
    /// itself does not act on them.
    component_dependencies: BTreeMap<String, Vec<DependencyInfo>>,

    /// Default property values per config type.
    config_defaults: BTreeMap<String, BTreeMap<String, String>>,

    /// Attribute side maps per config type: attribute name -> property -> value.
    config_attributes: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,

    /// Config type to the service that first declared it.
    config_services: BTreeMap<String, String>,

    /// Password-flagged `(config type, property)` pairs per service.
    password_properties: BTreeMap<String, BTreeSet<(String, String)>>,
}

impl StackDefinition {
    /// Materializes the snapshot for `stack_name`/`stack_version`.
    ///
    /// Any oracle failure is fatal and reported before configuration merging
    /// begins.
    pub fn load(
        oracle: &dyn StackMetadataOracle,
        stack_name: &str,
        stack_version: &str,
    ) -> Result<Self> {
        let context = OracleLookupSnafu {
            stack_name,
            stack_version,
        };

        let mut definition = Self {
            stack_name: stack_name.to_owned(),
            stack_version: stack_version.to_owned(),
            services: Vec::new(),
            component_services: BTreeMap::new(),
            component_dependencies: BTreeMap::new(),
            config_defaults: BTreeMap::new(),
            config_attributes: BTreeMap::new(),
            config_services: BTreeMap::new(),
            password_properties: BTreeMap::new(),
        };

        for service in oracle.services(stack_name, stack_version).context(context)? {
            for component in oracle
                .components(stack_name, stack_version, &service.name)
                .context(context)?
            {
                let dependencies = oracle
                    .component_dependencies(stack_name, stack_version, &service.name, &component.name)
                    .context(context)?;
                definition
                    .component_dependencies
                    .insert(component.name.clone(), dependencies);
                definition
                    .component_services
                    .insert(component.name, service.name.clone());
            }

            for entry in oracle
                .configurations(stack_name, stack_version, &service.name)
                .context(context)?
            {
                definition.record_config_entry(&service.name, entry);
            }

            definition.services.push(service.name);
        }

        debug!(
            stack_name,
            stack_version,
            services = definition.services.len(),
            components = definition.component_services.len(),
            "loaded stack definition"
        );

        Ok(definition)
    }

    fn record_config_entry(&mut self, service_name: &str, entry: StackConfigEntry) {
        let config_type = normalize_config_type(&entry.config_type);

        self.config_services
            .entry(config_type.clone())
            .or_insert_with(|| service_name.to_owned());

        if let Some(value) = entry.value {
            self.config_defaults
                .entry(config_type.clone())
                .or_default()
                .insert(entry.property_name.clone(), value);
        }

        for (attribute, value) in entry.attributes {
            self.config_attributes
                .entry(config_type.clone())
                .or_default()
                .entry(attribute)
                .or_default()
                .insert(entry.property_name.clone(), value);
        }

        if entry.property_types.contains(&PropertyType::Password) {
            self.password_properties
                .entry(service_name.to_owned())
                .or_default()
                .insert((config_type, entry.property_name));
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn stack_version(&self) -> &str {
        &self.stack_version
    }

    /// The `<stack>-<version>` identifier downstream cluster creation expects.
    pub fn distribution(&self) -> String {
        format!("{}-{}", self.stack_name, self.stack_version)
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.component_services.contains_key(component)
    }

    pub fn service_for_component(&self, component: &str) -> Option<&str> {
        self.component_services.get(component).map(String::as_str)
    }

    pub fn service_for_config_type(&self, config_type: &str) -> Option<&str> {
        self.config_services.get(config_type).map(String::as_str)
    }

    pub fn config_defaults(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.config_defaults
    }

    pub fn config_attributes(
        &self,
        config_type: &str,
    ) -> Option<&BTreeMap<String, BTreeMap<String, String>>> {
        self.config_attributes.get(config_type)
    }

    pub fn default_value(&self, config_type: &str, property: &str) -> Option<&str> {
        self.config_defaults
            .get(config_type)
            .and_then(|properties| properties.get(property))
            .map(String::as_str)
    }

    /// Password-flagged `(config type, property)` pairs the given service
    /// declares.
    pub fn password_properties(&self, service: &str) -> Option<&BTreeSet<(String, String)>> {
        self.password_properties.get(service)
    }

    pub fn component_dependencies(&self, component: &str) -> &[DependencyInfo] {
        self.component_dependencies
            .get(component)
            .map_or(&[], Vec::as_slice)
    }
}

/// Oracles may report config types by their backing file name; the engine
/// works with the bare type.
fn normalize_config_type(config_type: &str) -> String {
    config_type
        .strip_suffix(".xml")
        .unwrap_or(config_type)
        .to_owned()
}
