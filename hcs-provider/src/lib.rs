//! Huawei Cloud Stack Provider
//!
//! Provider implementation for Huawei Cloud Stack (HCS): the
//! `compute_instance` resource and the `networking_secgroups` and
//! `sfs_turbos` data sources.
//!
//! ## Module Structure
//!
//! - `config` - Provider configuration and service endpoints
//! - `client` - Authenticated JSON client of one service
//! - `sdk` - Typed bodies and calls of the HCS REST APIs
//! - `provider` - HcsProvider and per-region dispatch
//! - `compute_instance` - Lifecycle of ECS instances
//! - `data_sources` - Read-only lookups
//! - `resources` / `schemas` - Resource types and their attribute schemas
//! - `utils` - Helper functions for value normalization

pub mod client;
pub mod compute_instance;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod sdk;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use error::{HcsError, HcsResult};
pub use provider::HcsProvider;

use hcs_core::provider::{BoxFuture, Provider, ProviderResult};
use hcs_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for HcsProvider {
    fn name(&self) -> &'static str {
        "hcs"
    }

    fn resource_types(&self) -> Vec<Box<dyn hcs_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move { self.read_resource(&prior).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(&self, from: &State, to: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&from, &to).await })
    }

    fn delete(&self, state: &State) -> BoxFuture<'_, ProviderResult<()>> {
        let state = state.clone();
        Box::pin(async move { self.delete_resource(&state).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { HcsProvider::read_data_source(self, &resource).await })
    }
}
