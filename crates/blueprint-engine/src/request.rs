//! The user-facing cluster creation request.

use serde::{Deserialize, Serialize};

/// A request to instantiate a cluster from a named blueprint.
///
/// ```json
/// {
///   "cluster_name": "c1",
///   "blueprint": "test-blueprint",
///   "default_password": "super-secret-password",
///   "host_groups": [
///     { "name": "group1", "hosts": [{ "fqdn": "host.domain" }] }
///   ]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    pub cluster_name: String,

    /// Name of the blueprint to instantiate.
    pub blueprint: String,

    /// Cluster-wide fallback for password properties that have no value in
    /// the stack, the blueprint, or any host group overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_password: Option<String>,

    pub host_groups: Vec<HostGroupBinding>,
}

/// Binds the hosts of one cluster instance to a blueprint host group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroupBinding {
    pub name: String,

    #[serde(default)]
    pub hosts: Vec<HostBinding>,
}

impl HostGroupBinding {
    pub fn new(name: impl Into<String>, fqdns: &[&str]) -> Self {
        Self {
            name: name.into(),
            hosts: fqdns
                .iter()
                .map(|fqdn| HostBinding {
                    fqdn: (*fqdn).to_owned(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    pub fqdn: String,
}
