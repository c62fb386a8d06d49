//! Rewriting of configuration values that encode cluster topology.
//!
//! Stack defaults carry placeholder values: a single-host address pointing at
//! `localhost`, a one-element host list, a bare heap size. Once the concrete
//! host assignment is known, every property registered here is rewritten
//! against it; all other properties pass through unchanged.
//!
//! The registry is an explicit table of tagged rules, built once and passed
//! by reference into the resolution pass. Rewriting runs strictly after the
//! merge, because [`RewriteRule::CrossConfigLookup`] reads sibling config
//! types from the merged result.

use itertools::Itertools;
use snafu::{Snafu, ensure};
use tracing::{debug, warn};

use crate::{config::ClusterConfiguration, topology::TopologyAssignment};

type Result<T, E = Error> = std::result::Result<T, E>;

/// The placeholder token single-host stack defaults carry.
pub const HOST_PLACEHOLDER: &str = "localhost";

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display(
        "property {property:?} requires exactly one host running component {component:?}, \
         but the topology assigns {count}"
    ))]
    AmbiguousSingleHost {
        property: String,
        component: String,
        count: usize,
    },
}

/// One topology rewrite, keyed in the registry by property name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewriteRule {
    /// Replace the placeholder token inside the raw value with the one host
    /// running `component`, preserving all surrounding text.
    SingleHost { component: String },

    /// Replace the raw value with every host running `component`, in the raw
    /// value's list syntax. The host order is unspecified.
    MultiHost { component: String },

    /// Append a unit suffix to a bare numeric value.
    UnitSuffix { suffix: char },

    /// Single-host substitution gated on a companion config type: applied
    /// only while `config_type`/`property` holds `trigger_value` in the
    /// merged configuration.
    CrossConfigLookup {
        config_type: String,
        property: String,
        trigger_value: String,
        component: String,
    },
}

/// The fixed property-name to rewrite table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteRegistry {
    rules: Vec<(String, RewriteRule)>,
}

impl RewriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set the stacks shipped with this engine rely on.
    pub fn with_standard_rules() -> Self {
        let mut registry = Self::new();

        registry.register_single_host("NAMENODE", &[
            "dfs.http.address",
            "dfs.namenode.http-address",
            "dfs.https.address",
            "dfs.namenode.https-address",
            "fs.default.name",
            "fs.defaultFS",
            "hbase.rootdir",
        ]);
        registry.register_single_host("SECONDARY_NAMENODE", &[
            "dfs.secondary.http.address",
            "dfs.namenode.secondary.http-address",
        ]);
        registry.register_single_host("JOBTRACKER", &[
            "mapred.job.tracker",
            "mapred.job.tracker.http.address",
        ]);
        registry.register_single_host("HISTORYSERVER", &[
            "mapreduce.jobhistory.webapp.address",
            "mapreduce.jobhistory.address",
        ]);
        registry.register_single_host("RESOURCEMANAGER", &[
            "yarn.resourcemanager.hostname",
            "yarn.resourcemanager.resource-tracker.address",
            "yarn.resourcemanager.webapp.address",
            "yarn.resourcemanager.scheduler.address",
            "yarn.resourcemanager.address",
            "yarn.resourcemanager.admin.address",
        ]);
        registry.register_single_host("HIVE_SERVER", &["hive.metastore.uris"]);
        registry.register_single_host("OOZIE_SERVER", &["oozie.base.url"]);

        registry.register_multi_host("ZOOKEEPER_SERVER", &[
            "hbase.zookeeper.quorum",
            "storm.zookeeper.servers",
        ]);

        for property in [
            "namenode_heapsize",
            "namenode_opt_newsize",
            "namenode_opt_maxnewsize",
            "dtnode_heapsize",
        ] {
            registry.register(property, RewriteRule::UnitSuffix { suffix: 'm' });
        }

        registry.register("javax.jdo.option.ConnectionURL", RewriteRule::CrossConfigLookup {
            config_type: "hive-env".to_owned(),
            property: "hive_database".to_owned(),
            trigger_value: "New MySQL Database".to_owned(),
            component: "MYSQL_SERVER".to_owned(),
        });

        registry
    }

    pub fn register(&mut self, property: impl Into<String>, rule: RewriteRule) {
        self.rules.push((property.into(), rule));
    }

    fn register_single_host(&mut self, component: &str, properties: &[&str]) {
        for property in properties {
            self.register(*property, RewriteRule::SingleHost {
                component: component.to_owned(),
            });
        }
    }

    fn register_multi_host(&mut self, component: &str, properties: &[&str]) {
        for property in properties {
            self.register(*property, RewriteRule::MultiHost {
                component: component.to_owned(),
            });
        }
    }

    pub fn rule(&self, property: &str) -> Option<&RewriteRule> {
        self.rules
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, rule)| rule)
    }

    /// Rewrites every registered property in the merged configuration against
    /// the host assignment. Unregistered properties are left untouched.
    pub fn apply(
        &self,
        assignment: &TopologyAssignment,
        configuration: &mut ClusterConfiguration,
    ) -> Result<()> {
        // Planned updates are collected first: cross-config rules read
        // sibling config types of the same map.
        let mut updates = Vec::new();

        for (config_type, resolved) in configuration.iter() {
            for (property, value) in &resolved.properties {
                let Some(rule) = self.rule(property) else {
                    continue;
                };
                if let Some(rewritten) = rule.resolve(assignment, configuration, property, value)? {
                    debug!(
                        config_type,
                        property,
                        from = value,
                        to = rewritten,
                        "rewrote topology property"
                    );
                    updates.push((config_type.clone(), property.clone(), rewritten));
                }
            }
        }

        for (config_type, property, value) in updates {
            if let Some(resolved) = configuration.get_mut(&config_type) {
                resolved.properties.insert(property, value);
            }
        }

        Ok(())
    }
}

impl RewriteRule {
    /// The rewritten value, or `None` when this rule leaves the value as is.
    fn resolve(
        &self,
        assignment: &TopologyAssignment,
        configuration: &ClusterConfiguration,
        property: &str,
        value: &str,
    ) -> Result<Option<String>> {
        match self {
            Self::SingleHost { component } => {
                substitute_single_host(assignment, component, property, value)
            }

            Self::MultiHost { component } => {
                let hosts = assignment.hosts_running(component);
                if hosts.is_empty() {
                    warn!(
                        property,
                        component, "no host runs the component backing a multi-host property"
                    );
                    return Ok(None);
                }
                Ok(Some(render_host_list(&hosts, value)))
            }

            Self::UnitSuffix { suffix } => {
                if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
                    Ok(Some(format!("{value}{suffix}")))
                } else {
                    Ok(None)
                }
            }

            Self::CrossConfigLookup {
                config_type,
                property: companion_property,
                trigger_value,
                component,
            } => {
                let companion = configuration
                    .get(config_type)
                    .and_then(|resolved| resolved.properties.get(companion_property));
                if companion.map(String::as_str) == Some(trigger_value.as_str()) {
                    substitute_single_host(assignment, component, property, value)
                } else {
                    Ok(None)
                }
            }
        }
    }
}

fn substitute_single_host(
    assignment: &TopologyAssignment,
    component: &str,
    property: &str,
    value: &str,
) -> Result<Option<String>> {
    if !value.contains(HOST_PLACEHOLDER) {
        return Ok(None);
    }

    let hosts = assignment.hosts_running(component);
    ensure!(
        hosts.len() == 1,
        AmbiguousSingleHostSnafu {
            property,
            component,
            count: hosts.len(),
        }
    );

    Ok(Some(value.replace(HOST_PLACEHOLDER, hosts[0])))
}

/// Renders `hosts` in the raw value's list syntax: a bracket-wrapped value is
/// treated as a quoted-list literal, anything else as plain comma-separated.
fn render_host_list(hosts: &[&str], raw_value: &str) -> String {
    let trimmed = raw_value.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        format!("[{}]", hosts.iter().map(|host| format!("'{host}'")).join(","))
    } else {
        hosts.join(",")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::*;
    use crate::{
        blueprint::{Blueprint, HostGroup},
        config::ResolvedConfiguration,
        request::HostGroupBinding,
        topology::TopologyAssignment,
    };

    /// Two groups: group one runs the singleton services on h1, group two
    /// adds a second ZooKeeper on h2.
    fn assignment() -> TopologyAssignment {
        let blueprint = Blueprint {
            name: "test-blueprint".to_owned(),
            stack_name: "test".to_owned(),
            stack_version: "1.23".to_owned(),
            host_groups: vec![
                HostGroup {
                    name: "host_group_1".to_owned(),
                    components: BTreeSet::from([
                        "NAMENODE".to_owned(),
                        "HBASE_MASTER".to_owned(),
                        "HIVE_SERVER".to_owned(),
                        "ZOOKEEPER_SERVER".to_owned(),
                        "MYSQL_SERVER".to_owned(),
                    ]),
                    configurations: Vec::new(),
                },
                HostGroup {
                    name: "host_group_2".to_owned(),
                    components: BTreeSet::from(["ZOOKEEPER_SERVER".to_owned()]),
                    configurations: Vec::new(),
                },
            ],
            configurations: Vec::new(),
        };

        TopologyAssignment::bind(&blueprint, &[
            HostGroupBinding::new("host_group_1", &["h1"]),
            HostGroupBinding::new("host_group_2", &["h2"]),
        ])
        .expect("fixture binding must succeed")
    }

    fn configuration_with(config_type: &str, properties: &[(&str, &str)]) -> ClusterConfiguration {
        let mut configuration = ClusterConfiguration::new();
        let resolved: &mut ResolvedConfiguration =
            configuration.entry(config_type.to_owned()).or_default();
        for (property, value) in properties {
            resolved
                .properties
                .insert((*property).to_owned(), (*value).to_owned());
        }
        configuration
    }

    fn rewritten(configuration: &ClusterConfiguration, config_type: &str, property: &str) -> String {
        configuration
            .get(config_type)
            .and_then(|resolved| resolved.properties.get(property))
            .cloned()
            .unwrap_or_else(|| panic!("property {property} must exist"))
    }

    #[rstest]
    #[case::port_preserved("dfs.http.address", "localhost:50070", "h1:50070")]
    #[case::embedded_token("hive.metastore.uris", "prefix.localhost.suffix", "prefix.h1.suffix")]
    #[case::url_preserved("hbase.rootdir", "hdfs://localhost:8020/apps/hbase/", "hdfs://h1:8020/apps/hbase/")]
    fn single_host_preserves_surrounding_text(
        #[case] property: &str,
        #[case] raw: &str,
        #[case] expected: &str,
    ) {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration = configuration_with("hdfs-site", &[(property, raw)]);

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        assert_eq!(rewritten(&configuration, "hdfs-site", property), expected);
    }

    #[test]
    fn multi_host_plain_list_is_permutation_of_all_hosts() {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration =
            configuration_with("hbase-site", &[("hbase.zookeeper.quorum", "localhost")]);

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        let value = rewritten(&configuration, "hbase-site", "hbase.zookeeper.quorum");
        let hosts: BTreeSet<&str> = value.split(',').collect();
        assert_eq!(hosts, BTreeSet::from(["h1", "h2"]));
    }

    #[test]
    fn multi_host_quoted_list_keeps_its_syntax() {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration =
            configuration_with("storm-site", &[("storm.zookeeper.servers", "['localhost']")]);

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        let value = rewritten(&configuration, "storm-site", "storm.zookeeper.servers");
        assert!(
            value == "['h1','h2']" || value == "['h2','h1']",
            "unexpected quoted list {value:?}"
        );
    }

    #[rstest]
    #[case::bare_number("1025", Some("1025m"))]
    #[case::already_suffixed("1025m", None)]
    #[case::not_numeric("default", None)]
    fn unit_suffix_applies_to_bare_numbers_only(
        #[case] raw: &str,
        #[case] expected_update: Option<&str>,
    ) {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration = configuration_with("hadoop-env", &[("namenode_heapsize", raw)]);

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        let value = rewritten(&configuration, "hadoop-env", "namenode_heapsize");
        assert_eq!(value, expected_update.unwrap_or(raw));
    }

    #[test]
    fn cross_config_rule_rewrites_on_trigger_value() {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration = configuration_with(
            "hive-site",
            &[("javax.jdo.option.ConnectionURL", "localhost:12345")],
        );
        configuration
            .entry("hive-env".to_owned())
            .or_default()
            .properties
            .insert("hive_database".to_owned(), "New MySQL Database".to_owned());

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        assert_eq!(
            rewritten(&configuration, "hive-site", "javax.jdo.option.ConnectionURL"),
            "h1:12345"
        );
    }

    #[rstest]
    #[case::other_database(Some("External MySQL Database"))]
    #[case::companion_absent(None)]
    fn cross_config_rule_is_a_noop_otherwise(#[case] companion: Option<&str>) {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration = configuration_with(
            "hive-site",
            &[("javax.jdo.option.ConnectionURL", "localhost:12345")],
        );
        if let Some(database) = companion {
            configuration
                .entry("hive-env".to_owned())
                .or_default()
                .properties
                .insert("hive_database".to_owned(), database.to_owned());
        }

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        assert_eq!(
            rewritten(&configuration, "hive-site", "javax.jdo.option.ConnectionURL"),
            "localhost:12345"
        );
    }

    #[test]
    fn unregistered_properties_pass_through() {
        let registry = RewriteRegistry::with_standard_rules();
        let mut configuration =
            configuration_with("core-site", &[("some.random.property", "localhost:1234")]);

        registry
            .apply(&assignment(), &mut configuration)
            .expect("rewrite must succeed");

        assert_eq!(
            rewritten(&configuration, "core-site", "some.random.property"),
            "localhost:1234"
        );
    }

    #[test]
    fn single_host_with_component_on_two_hosts_fails() {
        let mut registry = RewriteRegistry::new();
        registry.register("zk.single.address", RewriteRule::SingleHost {
            component: "ZOOKEEPER_SERVER".to_owned(),
        });
        let mut configuration =
            configuration_with("zk-site", &[("zk.single.address", "localhost:2181")]);

        let error = registry
            .apply(&assignment(), &mut configuration)
            .expect_err("two candidate hosts cannot satisfy a single-host rule");

        assert_eq!(error, Error::AmbiguousSingleHost {
            property: "zk.single.address".to_owned(),
            component: "ZOOKEEPER_SERVER".to_owned(),
            count: 2,
        });
    }
}
