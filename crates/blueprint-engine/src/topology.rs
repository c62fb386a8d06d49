//! Binding of concrete hosts to blueprint host groups, and the structural
//! checks that must pass before any downstream call is made.

use std::collections::{BTreeMap, BTreeSet};

use snafu::{Snafu, ensure};

use crate::{blueprint::Blueprint, request::HostGroupBinding, stack::StackDefinition};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("host group specified without a name"))]
    MissingHostGroupName,

    #[snafu(display("host group {host_group:?} is not defined in blueprint {blueprint:?}"))]
    UnknownHostGroup {
        blueprint: String,
        host_group: String,
    },

    #[snafu(display(
        "host group {host_group:?} has no hosts with a fully qualified domain name"
    ))]
    MissingHosts { host_group: String },

    #[snafu(display(
        "host {host:?} is mapped to both host group {first:?} and host group {second:?}"
    ))]
    DuplicateHost {
        host: String,
        first: String,
        second: String,
    },

    #[snafu(display(
        "component {component:?} of host group {host_group:?} is not part of stack {stack}"
    ))]
    UnknownComponent {
        component: String,
        host_group: String,
        stack: String,
    },
}

/// A blueprint host group bound to the hosts of one cluster instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundHostGroup {
    pub name: String,
    pub components: BTreeSet<String>,
    pub hosts: Vec<String>,
}

/// The validated host-group to host mapping: the only place real hostnames
/// enter the engine. Immutable for the duration of one provisioning pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyAssignment {
    groups: BTreeMap<String, BoundHostGroup>,
}

impl TopologyAssignment {
    /// Binds the request's host groups against the blueprint, running the
    /// structural checks in order. Any failure aborts the whole operation
    /// before a single side effect.
    pub fn bind(blueprint: &Blueprint, bindings: &[HostGroupBinding]) -> Result<Self> {
        let mut groups = BTreeMap::new();
        let mut host_owners: BTreeMap<&str, &str> = BTreeMap::new();

        for binding in bindings {
            ensure!(!binding.name.trim().is_empty(), MissingHostGroupNameSnafu);

            let group = blueprint
                .host_group(&binding.name)
                .ok_or_else(|| Error::UnknownHostGroup {
                    blueprint: blueprint.name.clone(),
                    host_group: binding.name.clone(),
                })?;

            let hosts: Vec<String> = binding
                .hosts
                .iter()
                .map(|host| host.fqdn.trim())
                .filter(|fqdn| !fqdn.is_empty())
                .map(str::to_owned)
                .collect();
            ensure!(
                !hosts.is_empty(),
                MissingHostsSnafu {
                    host_group: binding.name.as_str(),
                }
            );

            for host in &binding.hosts {
                let fqdn = host.fqdn.trim();
                if fqdn.is_empty() {
                    continue;
                }
                if let Some(first) = host_owners.insert(fqdn, binding.name.as_str()) {
                    return DuplicateHostSnafu {
                        host: fqdn,
                        first,
                        second: binding.name.as_str(),
                    }
                    .fail();
                }
            }

            groups.insert(
                binding.name.clone(),
                BoundHostGroup {
                    name: binding.name.clone(),
                    components: group.components.clone(),
                    hosts,
                },
            );
        }

        Ok(Self { groups })
    }

    /// Ensures every component referenced by a bound group exists in the
    /// stack. Run after the stack snapshot is loaded.
    pub fn validate_components(&self, stack: &StackDefinition) -> Result<()> {
        for group in self.groups.values() {
            for component in &group.components {
                ensure!(
                    stack.has_component(component),
                    UnknownComponentSnafu {
                        component: component.as_str(),
                        host_group: group.name.as_str(),
                        stack: stack.distribution(),
                    }
                );
            }
        }

        Ok(())
    }

    pub fn groups(&self) -> impl Iterator<Item = &BoundHostGroup> {
        self.groups.values()
    }

    pub fn group(&self, name: &str) -> Option<&BoundHostGroup> {
        self.groups.get(name)
    }

    /// All hosts, across every group, running the given component.
    pub fn hosts_running(&self, component: &str) -> Vec<&str> {
        self.groups
            .values()
            .filter(|group| group.components.contains(component))
            .flat_map(|group| group.hosts.iter().map(String::as_str))
            .collect()
    }

    /// The union of all assigned hosts.
    pub fn all_hosts(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|group| group.hosts.iter().map(String::as_str))
            .collect()
    }

    /// Every distinct component referenced by any bound group.
    pub fn components(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|group| group.components.iter().map(String::as_str))
            .collect()
    }
}
