//! Strategy selection and dispatch.

use bytes::Bytes;
use confit_core::api::{ApiCatalog, ApiDefinition};
use confit_core::client::{ClassicClient, ObjectSource};
use confit_core::{ConfigObject, Error, Properties, RemoteType, ResolvedEntity, Result};
use std::sync::Arc;
use tracing::debug;

use crate::dry_run::DryRunClient;
use crate::{classic, external};

/// Deploy strategy applied to a config, selected by its remote type.
///
/// New remote types get a new variant here; the scheduler only ever talks to
/// [`Deployer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStrategy {
    /// Classic API with unique names: upsert by display name.
    NameKeyed(ApiDefinition),
    /// Classic API without unique names: upsert by a derived id.
    NonUniqueName(ApiDefinition),
    /// Objects correlated through their external id (SLOs, settings).
    ExternalId,
}

impl DeployStrategy {
    /// Select the strategy for a config.
    pub fn for_config(config: &ConfigObject, apis: &ApiCatalog) -> Result<Self> {
        match &config.remote_type {
            RemoteType::Classic { api } => {
                let api = apis
                    .get(api)
                    .ok_or_else(|| Error::UnknownRemoteType(api.clone()))?;
                if api.non_unique_name {
                    Ok(Self::NonUniqueName(api.clone()))
                } else {
                    Ok(Self::NameKeyed(api.clone()))
                }
            }
            RemoteType::Settings { .. } | RemoteType::Slo => Ok(Self::ExternalId),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NameKeyed(_) => "name-keyed",
            Self::NonUniqueName(_) => "non-unique-name",
            Self::ExternalId => "external-id",
        }
    }
}

/// Deploys configs against the remote-access collaborators.
#[derive(Clone)]
pub struct Deployer {
    classic: Arc<dyn ClassicClient>,
    objects: Arc<dyn ObjectSource>,
    apis: ApiCatalog,
}

impl Deployer {
    pub fn new(
        classic: Arc<dyn ClassicClient>,
        objects: Arc<dyn ObjectSource>,
        apis: ApiCatalog,
    ) -> Self {
        Self {
            classic,
            objects,
            apis,
        }
    }

    /// Deployer backed by the synthetic dry-run client.
    pub fn dry_run(apis: ApiCatalog) -> Self {
        let client = Arc::new(DryRunClient::new());
        Self::new(client.clone(), client, apis)
    }

    pub fn apis(&self) -> &ApiCatalog {
        &self.apis
    }

    pub fn strategy_for(&self, config: &ConfigObject) -> Result<DeployStrategy> {
        DeployStrategy::for_config(config, &self.apis)
    }

    /// `(api, name)` identity of a config whose remote type requires unique
    /// names, or `None` if names need not be unique.
    pub fn identity_key(
        &self,
        config: &ConfigObject,
        properties: &Properties,
    ) -> Result<Option<(String, String)>> {
        match self.strategy_for(config)? {
            DeployStrategy::NameKeyed(api) => {
                let name = classic::config_name(config, properties)?;
                Ok(Some((api.id, name)))
            }
            DeployStrategy::NonUniqueName(_) | DeployStrategy::ExternalId => Ok(None),
        }
    }

    /// Deploy a rendered config and return its resolved entity.
    ///
    /// The assigned remote id (and name, where the type has one) is injected
    /// into the returned properties so later configs can reference them.
    pub async fn deploy(
        &self,
        config: &ConfigObject,
        properties: Properties,
        rendered: Bytes,
    ) -> Result<ResolvedEntity> {
        let strategy = self.strategy_for(config)?;
        debug!(coordinate = %config.coordinate, strategy = strategy.name(), "Deploying config");

        match strategy {
            DeployStrategy::NameKeyed(api) => {
                classic::deploy_by_name(self.classic.as_ref(), &api, config, properties, rendered)
                    .await
            }
            DeployStrategy::NonUniqueName(api) => {
                classic::deploy_non_unique(
                    self.classic.as_ref(),
                    &api,
                    config,
                    properties,
                    rendered,
                )
                .await
            }
            DeployStrategy::ExternalId => {
                external::deploy_correlated(self.objects.as_ref(), config, properties, rendered)
                    .await
            }
        }
    }
}
