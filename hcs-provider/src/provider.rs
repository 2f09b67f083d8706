//! HCS Provider implementation
//!
//! This module contains the provider object handed to the framework. It owns
//! the configuration and the shared HTTP client, resolves the region of each
//! operation and dispatches to the resource and data source handlers.

use std::time::Duration;

use hcs_core::provider::{ProviderError, ProviderResult};
use hcs_core::resource::{Attributes, Resource, ResourceId, State};
use hcs_core::wait::StateChangeConf;

use crate::client::ServiceClient;
use crate::compute_instance;
use crate::config::{Config, PollSettings, Service};
use crate::data_sources;
use crate::error::{HcsError, HcsResult};

/// Everything an operation needs to reach the services of one region
#[derive(Debug, Clone, Copy)]
pub struct RegionContext<'a> {
    config: &'a Config,
    http: &'a reqwest::Client,
    region: &'a str,
}

impl<'a> RegionContext<'a> {
    pub fn new(config: &'a Config, http: &'a reqwest::Client, region: &'a str) -> Self {
        Self {
            config,
            http,
            region,
        }
    }

    pub fn region(&self) -> &'a str {
        self.region
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn poll(&self) -> PollSettings {
        self.config.poll
    }

    /// Client of `service` in this region
    pub fn client(&self, service: Service) -> HcsResult<ServiceClient> {
        self.config.service_client(self.http, service, self.region)
    }

    /// Wait parameters using the configured polling cadence
    pub fn state_change(
        &self,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> StateChangeConf {
        let poll = self.poll();
        StateChangeConf::new(pending, target, timeout)
            .with_delay(poll.delay)
            .with_poll_interval(poll.interval)
    }
}

/// Huawei Cloud Stack Provider
pub struct HcsProvider {
    config: Config,
    http: reqwest::Client,
}

impl HcsProvider {
    /// Create a provider from an explicit configuration
    pub fn new(config: Config) -> HcsResult<Self> {
        let http = config.http_client()?;
        Ok(Self { config, http })
    }

    /// Create a provider configured from `HCS_*` environment variables
    pub fn from_env() -> HcsResult<Self> {
        Self::new(Config::from_env()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Context of the region named by `region`, else the provider region
    pub fn context<'a>(&'a self, region: Option<&'a str>) -> RegionContext<'a> {
        RegionContext::new(
            &self.config,
            &self.http,
            self.config.region_or_default(region),
        )
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub async fn read_resource(&self, prior: &State) -> ProviderResult<State> {
        let ctx = self.context(prior.attributes.get_string("region"));
        match prior.id.resource_type.as_str() {
            compute_instance::RESOURCE_TYPE => compute_instance::read(&ctx, prior)
                .await
                .map_err(|e| provider_error(e, &prior.id)),
            other => Err(unknown_type(other, &prior.id)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let ctx = self.context(resource.attributes.get_string("region"));
        match resource.id.resource_type.as_str() {
            compute_instance::RESOURCE_TYPE => compute_instance::create(&ctx, resource)
                .await
                .map_err(|e| provider_error(e, &resource.id)),
            other => Err(unknown_type(other, &resource.id)),
        }
    }

    pub async fn update_resource(&self, from: &State, to: &Resource) -> ProviderResult<State> {
        let ctx = self.context(
            to.attributes
                .get_non_empty("region")
                .or_else(|| from.attributes.get_string("region")),
        );
        match to.id.resource_type.as_str() {
            compute_instance::RESOURCE_TYPE => compute_instance::update(&ctx, from, to)
                .await
                .map_err(|e| provider_error(e, &to.id)),
            other => Err(unknown_type(other, &to.id)),
        }
    }

    pub async fn delete_resource(&self, state: &State) -> ProviderResult<()> {
        let ctx = self.context(state.attributes.get_string("region"));
        match state.id.resource_type.as_str() {
            compute_instance::RESOURCE_TYPE => compute_instance::delete(&ctx, state)
                .await
                .map_err(|e| provider_error(e, &state.id)),
            other => Err(unknown_type(other, &state.id)),
        }
    }

    pub async fn import_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let ctx = self.context(None);
        match id.resource_type.as_str() {
            compute_instance::RESOURCE_TYPE => compute_instance::import(&ctx, id, identifier)
                .await
                .map_err(|e| provider_error(e, id)),
            other => Err(unknown_type(other, id)),
        }
    }

    pub async fn read_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let ctx = self.context(resource.attributes.get_string("region"));
        let result = match resource.id.resource_type.as_str() {
            data_sources::secgroups::DATA_SOURCE_TYPE => {
                data_sources::secgroups::read(&ctx, resource).await
            }
            data_sources::sfs_turbos::DATA_SOURCE_TYPE => {
                data_sources::sfs_turbos::read(&ctx, resource).await
            }
            other => {
                return Err(ProviderError::new(format!("Unknown data source type: {}", other))
                    .for_resource(resource.id.clone()));
            }
        };
        result.map_err(|e| provider_error(e, &resource.id))
    }
}

fn provider_error(e: HcsError, id: &ResourceId) -> ProviderError {
    ProviderError::from(e).for_resource(id.clone())
}

fn unknown_type(resource_type: &str, id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", resource_type)).for_resource(id.clone())
}
