//! In-memory fixtures shared by the unit tests.

use snafu::Snafu;

use crate::stack::{
    DependencyInfo, OracleError, StackComponent, StackConfigEntry, StackMetadataOracle,
    StackService,
};

#[derive(Debug, Snafu)]
#[snafu(display("{message}"))]
pub(crate) struct FixtureError {
    message: String,
}

/// One scripted stack service: name, components, default configuration.
pub(crate) struct ServiceFixture {
    pub name: String,
    pub components: Vec<String>,
    pub configurations: Vec<StackConfigEntry>,
}

impl ServiceFixture {
    pub fn new(
        name: &str,
        components: Vec<&str>,
        configurations: Vec<StackConfigEntry>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            components: components.into_iter().map(str::to_owned).collect(),
            configurations,
        }
    }
}

/// A scripted [`StackMetadataOracle`] backed by fixture data, or rigged to
/// fail every lookup.
pub(crate) struct StaticOracle {
    services: Vec<ServiceFixture>,
    failure: Option<String>,
}

impl StaticOracle {
    pub fn new(services: Vec<ServiceFixture>) -> Self {
        Self {
            services,
            failure: None,
        }
    }

    pub fn single(
        service: &str,
        components: Vec<&str>,
        configurations: Vec<StackConfigEntry>,
    ) -> Self {
        Self::new(vec![ServiceFixture::new(service, components, configurations)])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            services: Vec::new(),
            failure: Some(message.to_owned()),
        }
    }

    fn fail_if_rigged(&self) -> Result<(), OracleError> {
        match &self.failure {
            Some(message) => Err(Box::new(FixtureError {
                message: message.clone(),
            })),
            None => Ok(()),
        }
    }

    fn service(&self, service_name: &str) -> Result<&ServiceFixture, OracleError> {
        self.services
            .iter()
            .find(|service| service.name == service_name)
            .ok_or_else(|| {
                Box::new(FixtureError {
                    message: format!("unknown service {service_name}"),
                }) as OracleError
            })
    }
}

impl StackMetadataOracle for StaticOracle {
    fn services(
        &self,
        _stack_name: &str,
        _stack_version: &str,
    ) -> Result<Vec<StackService>, OracleError> {
        self.fail_if_rigged()?;
        Ok(self
            .services
            .iter()
            .map(|service| StackService {
                name: service.name.clone(),
            })
            .collect())
    }

    fn components(
        &self,
        _stack_name: &str,
        _stack_version: &str,
        service_name: &str,
    ) -> Result<Vec<StackComponent>, OracleError> {
        self.fail_if_rigged()?;
        Ok(self
            .service(service_name)?
            .components
            .iter()
            .map(|component| StackComponent {
                name: component.clone(),
            })
            .collect())
    }

    fn configurations(
        &self,
        _stack_name: &str,
        _stack_version: &str,
        service_name: &str,
    ) -> Result<Vec<StackConfigEntry>, OracleError> {
        self.fail_if_rigged()?;
        Ok(self.service(service_name)?.configurations.clone())
    }

    fn component_dependencies(
        &self,
        _stack_name: &str,
        _stack_version: &str,
        _service_name: &str,
        _component_name: &str,
    ) -> Result<Vec<DependencyInfo>, OracleError> {
        self.fail_if_rigged()?;
        Ok(Vec::new())
    }
}
