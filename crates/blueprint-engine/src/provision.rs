//! Dispatch of the ordered provisioning sequence to the downstream resource
//! providers.
//!
//! Every step is a blocking call to an external collaborator and the sequence
//! only advances after the previous call returned successfully. There is no
//! rollback: a failing step leaves everything created so far in place and
//! surfaces the originating error.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::{
    blueprint::{Blueprint, ConfigOverlay},
    config::{ClusterConfiguration, ConfigVersionTags},
    stack::StackDefinition,
    topology::TopologyAssignment,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by gateway implementations; opaque to the engine.
pub type GatewayError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fixed description attached to every host-group config group.
pub const CONFIG_GROUP_DESCRIPTION: &str = "Host Group Configuration";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create cluster {cluster_name:?}"))]
    CreateCluster {
        source: GatewayError,
        cluster_name: String,
    },

    #[snafu(display("failed to update cluster {cluster_name:?} with configuration {config_type:?}"))]
    UpdateClusterConfig {
        source: GatewayError,
        cluster_name: String,
        config_type: String,
    },

    #[snafu(display("failed to create services for cluster {cluster_name:?}"))]
    CreateServices {
        source: GatewayError,
        cluster_name: String,
    },

    #[snafu(display("failed to create components of service {service_name:?}"))]
    CreateComponents {
        source: GatewayError,
        service_name: String,
    },

    #[snafu(display("failed to create hosts for cluster {cluster_name:?}"))]
    CreateHosts {
        source: GatewayError,
        cluster_name: String,
    },

    #[snafu(display("failed to create host components for cluster {cluster_name:?}"))]
    CreateHostComponents {
        source: GatewayError,
        cluster_name: String,
    },

    #[snafu(display("failed to create configuration groups for cluster {cluster_name:?}"))]
    CreateConfigGroups {
        source: GatewayError,
        cluster_name: String,
    },

    #[snafu(display("failed to trigger install and start of cluster {cluster_name:?}"))]
    InstallAndStart {
        source: GatewayError,
        cluster_name: String,
    },
}

/// Status of an asynchronous downstream request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
pub enum RequestStatus {
    InProgress,
    Completed,
    Failed,
}

/// Handle to the asynchronous install/start request owned by the downstream
/// execution engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestStatusResponse {
    pub request_id: u64,
    pub status: RequestStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterCreateRequest {
    pub cluster_name: String,
    /// `<stack name>-<stack version>`.
    pub distribution: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterConfigUpdate {
    pub cluster_name: String,
    pub config_type: String,
    pub version_tag: u64,
    pub properties: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceCreateRequest {
    pub cluster_name: String,
    pub services: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentCreateRequest {
    pub cluster_name: String,
    pub service_name: String,
    pub components: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostCreateRequest {
    pub cluster_name: String,
    pub hosts: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HostComponentEntry {
    pub host: String,
    pub component: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HostComponentCreateRequest {
    pub cluster_name: String,
    pub entries: BTreeSet<HostComponentEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigGroupRequest {
    pub cluster_name: String,
    pub group_name: String,
    /// Name of the service owning the group's configuration.
    pub tag: String,
    pub description: String,
    pub hosts: Vec<String>,
    pub configs: Vec<ConfigOverlay>,
}

pub trait ClusterGateway {
    fn create_cluster(&self, request: ClusterCreateRequest) -> Result<(), GatewayError>;
    fn update_cluster(&self, request: ClusterConfigUpdate) -> Result<(), GatewayError>;
}

pub trait ServiceGateway {
    fn create_services(&self, request: ServiceCreateRequest) -> Result<(), GatewayError>;

    /// Triggers the asynchronous install/start of everything created so far
    /// and returns its status handle.
    fn install_and_start(&self, cluster_name: &str) -> Result<RequestStatusResponse, GatewayError>;
}

pub trait ComponentGateway {
    fn create_components(&self, request: ComponentCreateRequest) -> Result<(), GatewayError>;
}

pub trait HostGateway {
    fn create_hosts(&self, request: HostCreateRequest) -> Result<(), GatewayError>;
}

pub trait HostComponentGateway {
    fn create_host_components(&self, request: HostComponentCreateRequest)
    -> Result<(), GatewayError>;
}

pub trait ConfigGroupGateway {
    fn create_config_groups(&self, requests: Vec<ConfigGroupRequest>) -> Result<(), GatewayError>;
}

/// Owns the strictly ordered dispatch sequence against the six downstream
/// resource providers.
pub struct Orchestrator<'a> {
    pub clusters: &'a dyn ClusterGateway,
    pub services: &'a dyn ServiceGateway,
    pub components: &'a dyn ComponentGateway,
    pub hosts: &'a dyn HostGateway,
    pub host_components: &'a dyn HostComponentGateway,
    pub config_groups: &'a dyn ConfigGroupGateway,
}

impl Orchestrator<'_> {
    /// Runs steps 1 through 8. Returns the install/start status handle; the
    /// install itself proceeds asynchronously in the execution engine.
    pub fn provision(
        &self,
        cluster_name: &str,
        stack: &StackDefinition,
        blueprint: &Blueprint,
        assignment: &TopologyAssignment,
        configuration: &ClusterConfiguration,
    ) -> Result<RequestStatusResponse> {
        info!(cluster_name, "creating cluster");
        self.clusters
            .create_cluster(ClusterCreateRequest {
                cluster_name: cluster_name.to_owned(),
                distribution: stack.distribution(),
            })
            .context(CreateClusterSnafu { cluster_name })?;

        let mut version_tags = ConfigVersionTags::new();
        for (config_type, resolved) in configuration {
            info!(cluster_name, config_type, "updating cluster configuration");
            self.clusters
                .update_cluster(ClusterConfigUpdate {
                    cluster_name: cluster_name.to_owned(),
                    config_type: config_type.clone(),
                    version_tag: version_tags.next(config_type),
                    properties: resolved.properties.clone(),
                    attributes: resolved.attributes.clone(),
                })
                .context(UpdateClusterConfigSnafu {
                    cluster_name,
                    config_type: config_type.as_str(),
                })?;
        }

        let components_by_service = components_by_service(stack, assignment);
        let services: BTreeSet<String> = components_by_service.keys().cloned().collect();

        info!(cluster_name, count = services.len(), "creating services");
        self.services
            .create_services(ServiceCreateRequest {
                cluster_name: cluster_name.to_owned(),
                services: services.clone(),
            })
            .context(CreateServicesSnafu { cluster_name })?;

        for (service_name, components) in components_by_service {
            info!(cluster_name, service_name, "creating components");
            self.components
                .create_components(ComponentCreateRequest {
                    cluster_name: cluster_name.to_owned(),
                    service_name: service_name.clone(),
                    components,
                })
                .context(CreateComponentsSnafu {
                    service_name: service_name.as_str(),
                })?;
        }

        let hosts: BTreeSet<String> = assignment
            .all_hosts()
            .into_iter()
            .map(str::to_owned)
            .collect();
        info!(cluster_name, count = hosts.len(), "creating hosts");
        self.hosts
            .create_hosts(HostCreateRequest {
                cluster_name: cluster_name.to_owned(),
                hosts,
            })
            .context(CreateHostsSnafu { cluster_name })?;

        let entries: BTreeSet<HostComponentEntry> = assignment
            .groups()
            .flat_map(|group| {
                group.hosts.iter().flat_map(move |host| {
                    group.components.iter().map(move |component| HostComponentEntry {
                        host: host.clone(),
                        component: component.clone(),
                    })
                })
            })
            .collect();
        info!(cluster_name, count = entries.len(), "creating host components");
        self.host_components
            .create_host_components(HostComponentCreateRequest {
                cluster_name: cluster_name.to_owned(),
                entries,
            })
            .context(CreateHostComponentsSnafu { cluster_name })?;

        let group_requests = config_group_requests(cluster_name, stack, blueprint, assignment);
        if !group_requests.is_empty() {
            info!(
                cluster_name,
                count = group_requests.len(),
                "creating configuration groups"
            );
            self.config_groups
                .create_config_groups(group_requests)
                .context(CreateConfigGroupsSnafu { cluster_name })?;
        }

        info!(cluster_name, "triggering install and start");
        self.services
            .install_and_start(cluster_name)
            .context(InstallAndStartSnafu { cluster_name })
    }
}

/// Every component referenced by any bound host group, bucketed by its
/// owning service. Unknown components have been rejected beforehand.
fn components_by_service(
    stack: &StackDefinition,
    assignment: &TopologyAssignment,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut by_service: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for component in assignment.components() {
        if let Some(service) = stack.service_for_component(component) {
            by_service
                .entry(service.to_owned())
                .or_default()
                .insert(component.to_owned());
        }
    }

    by_service
}

/// One request per host group carrying its own configuration overlay.
fn config_group_requests(
    cluster_name: &str,
    stack: &StackDefinition,
    blueprint: &Blueprint,
    assignment: &TopologyAssignment,
) -> Vec<ConfigGroupRequest> {
    let mut requests = Vec::new();

    for group in assignment.groups() {
        let Some(blueprint_group) = blueprint.host_group(&group.name) else {
            continue;
        };
        if blueprint_group.configurations.is_empty() {
            continue;
        }

        let tag = blueprint_group
            .configurations
            .iter()
            .find_map(|overlay| stack.service_for_config_type(&overlay.config_type))
            .unwrap_or(group.name.as_str())
            .to_owned();

        requests.push(ConfigGroupRequest {
            cluster_name: cluster_name.to_owned(),
            group_name: group.name.clone(),
            tag,
            description: CONFIG_GROUP_DESCRIPTION.to_owned(),
            hosts: group.hosts.clone(),
            configs: blueprint_group.configurations.clone(),
        });
    }

    requests
}
