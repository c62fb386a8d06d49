//! The resolution and provisioning pipeline.
//!
//! [`ProvisioningEngine::create_cluster`] turns a creation request into the
//! ordered downstream dispatch: blueprint lookup, topology validation, stack
//! snapshot, configuration merge, secret gate, topology rewrite,
//! orchestration. Everything up to orchestration is side-effect free apart
//! from oracle reads, so a request that fails validation leaves no trace.

use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info};

use crate::{
    blueprint::BlueprintStore,
    config::merge_cluster_configuration,
    provision::{Orchestrator, RequestStatusResponse},
    request::CreateClusterRequest,
    rewrite::RewriteRegistry,
    secrets,
    stack::{PropertyType, StackDefinition, StackMetadataOracle},
    topology::TopologyAssignment,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to load blueprint {blueprint:?}"))]
    BlueprintLookup {
        source: crate::blueprint::StoreError,
        blueprint: String,
    },

    #[snafu(display("no blueprint named {blueprint:?} exists"))]
    UnknownBlueprint { blueprint: String },

    #[snafu(display("the requested topology is structurally invalid"))]
    InvalidTopology { source: crate::topology::Error },

    #[snafu(display("stack metadata is unavailable"))]
    StackUnavailable { source: crate::stack::Error },

    #[snafu(display("required secrets are unresolved"))]
    UnresolvedSecrets { source: crate::secrets::Error },

    #[snafu(display("failed to resolve topology-bound configuration values"))]
    Rewrite { source: crate::rewrite::Error },

    #[snafu(display("provisioning failed after partial resource creation"))]
    Provision { source: crate::provision::Error },
}

/// Stateless facade over one resolution+provisioning pass. All collaborators
/// are borrowed; the engine owns nothing beyond the duration of a call.
pub struct ProvisioningEngine<'a> {
    store: &'a dyn BlueprintStore,
    oracle: &'a dyn StackMetadataOracle,
    rewrites: &'a RewriteRegistry,
    orchestrator: Orchestrator<'a>,
}

impl<'a> ProvisioningEngine<'a> {
    pub fn new(
        store: &'a dyn BlueprintStore,
        oracle: &'a dyn StackMetadataOracle,
        rewrites: &'a RewriteRegistry,
        orchestrator: Orchestrator<'a>,
    ) -> Self {
        Self {
            store,
            oracle,
            rewrites,
            orchestrator,
        }
    }

    /// Resolves and provisions one cluster. Returns the install/start status
    /// handle; the returned status is `InProgress` since the actual install
    /// runs asynchronously downstream.
    pub fn create_cluster(&self, request: &CreateClusterRequest) -> Result<RequestStatusResponse> {
        info!(
            cluster_name = request.cluster_name,
            blueprint = request.blueprint,
            "resolving cluster creation request"
        );

        let blueprint = self
            .store
            .find_by_name(&request.blueprint)
            .context(BlueprintLookupSnafu {
                blueprint: request.blueprint.as_str(),
            })?
            .context(UnknownBlueprintSnafu {
                blueprint: request.blueprint.as_str(),
            })?;

        let assignment = TopologyAssignment::bind(&blueprint, &request.host_groups)
            .context(InvalidTopologySnafu)?;

        let stack =
            StackDefinition::load(self.oracle, &blueprint.stack_name, &blueprint.stack_version)
                .context(StackUnavailableSnafu)?;
        assignment
            .validate_components(&stack)
            .context(InvalidTopologySnafu)?;

        let mut configuration = merge_cluster_configuration(&stack, &blueprint);
        debug!(
            config_types = configuration.len(),
            "merged cluster configuration"
        );

        let missing = blueprint.missing_properties(&stack, PropertyType::Password);
        secrets::apply_default_password(
            &missing,
            request.default_password.as_deref(),
            &mut configuration,
        )
        .context(UnresolvedSecretsSnafu)?;

        self.rewrites
            .apply(&assignment, &mut configuration)
            .context(RewriteSnafu)?;

        self.orchestrator
            .provision(
                &request.cluster_name,
                &stack,
                &blueprint,
                &assignment,
                &configuration,
            )
            .context(ProvisionSnafu)
    }
}
