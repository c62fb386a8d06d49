//! Pre-flight gate for password properties.
//!
//! Runs after the configuration merge and strictly before topology rewriting
//! and any orchestrator dispatch: either every password-typed property is
//! resolvable, or the whole operation fails without a single downstream call.

use snafu::Snafu;
use tracing::debug;

use crate::{blueprint::MissingPropertyIndex, config::ClusterConfiguration};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display(
        "blueprint requires password properties which are not set anywhere: {missing:?}; \
         set them in the cluster or host group configuration or supply default_password"
    ))]
    MissingPasswords { missing: MissingPropertyIndex },
}

/// Resolves the missing-password index against the request's cluster-wide
/// default.
///
/// With a default supplied, every missing property is written into the merged
/// configuration of its config type. Without one, any missing property fails
/// the pass, naming host group, config type, and property set.
pub fn apply_default_password(
    missing: &MissingPropertyIndex,
    default_password: Option<&str>,
    configuration: &mut ClusterConfiguration,
) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }

    let Some(password) = default_password else {
        return MissingPasswordsSnafu {
            missing: missing.clone(),
        }
        .fail();
    };

    for (host_group, by_config_type) in missing {
        for (config_type, properties) in by_config_type {
            let resolved = configuration.entry(config_type.clone()).or_default();
            for property in properties {
                debug!(
                    host_group,
                    config_type, property, "filling password property from default_password"
                );
                resolved
                    .properties
                    .insert(property.clone(), password.to_owned());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn missing_index(entries: &[(&str, &str, &[&str])]) -> MissingPropertyIndex {
        let mut index = MissingPropertyIndex::new();
        for (group, config_type, properties) in entries {
            index
                .entry((*group).to_owned())
                .or_default()
                .entry((*config_type).to_owned())
                .or_default()
                .extend(properties.iter().map(|p| (*p).to_owned()));
        }
        index
    }

    #[test]
    fn empty_index_passes_without_default() {
        let mut configuration = ClusterConfiguration::new();
        apply_default_password(&MissingPropertyIndex::new(), None, &mut configuration)
            .expect("nothing missing, nothing to do");
        assert!(configuration.is_empty());
    }

    #[test]
    fn missing_passwords_without_default_fail() {
        let missing = missing_index(&[(
            "group1",
            "core-site",
            &["my.missing.password", "my.missing.password2"],
        )]);
        let mut configuration = ClusterConfiguration::new();

        let error = apply_default_password(&missing, None, &mut configuration)
            .expect_err("missing passwords without a default must fail");

        let message = error.to_string();
        assert!(message.contains("group1"));
        assert!(message.contains("core-site"));
        assert!(message.contains("my.missing.password"));
        assert!(configuration.is_empty());
    }

    #[test]
    fn default_password_fills_every_missing_property() {
        let missing = missing_index(&[(
            "group1",
            "core-site",
            &["my.missing.password", "my.missing.password2"],
        )]);
        let mut configuration = ClusterConfiguration::new();

        apply_default_password(&missing, Some("foo"), &mut configuration)
            .expect("a supplied default must resolve all missing passwords");

        let core_site = configuration
            .get("core-site")
            .expect("the config type must be materialized");
        assert_eq!(
            core_site.properties,
            BTreeMap::from([
                ("my.missing.password".to_owned(), "foo".to_owned()),
                ("my.missing.password2".to_owned(), "foo".to_owned()),
            ])
        );
    }

    #[test]
    fn default_password_spans_host_groups_and_config_types() {
        let missing = missing_index(&[
            ("group1", "core-site", &["pw.a"] as &[&str]),
            ("group2", "hive-site", &["pw.b"]),
        ]);
        let mut configuration = ClusterConfiguration::new();

        apply_default_password(&missing, Some("foo"), &mut configuration)
            .expect("a supplied default must resolve all missing passwords");

        assert_eq!(
            configuration
                .get("core-site")
                .and_then(|c| c.properties.get("pw.a")),
            Some(&"foo".to_owned())
        );
        assert_eq!(
            configuration
                .get("hive-site")
                .and_then(|c| c.properties.get("pw.b")),
            Some(&"foo".to_owned())
        );
    }
}
