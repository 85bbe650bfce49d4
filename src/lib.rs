//! Block Federation - registry resolution and federated module loading
//!
//! Lets an application load UI blocks that are built and hosted
//! independently, addressed by block identifier or by (author, component
//! name). Two collaborating services do the work:
//!
//! 1. [`RegistryResolver`](module::registry::RegistryResolver) maps names to
//!    block identifiers from a TTL-cached server registry
//! 2. [`FederationLoader`](module::loader::FederationLoader) turns an
//!    identifier into exactly one fetched, executed and cached module
//!
//! [`BlockFederation`] is the composition root wiring them together:
//! name → identifier → module → mount.
//!
//! ## Design Principles
//!
//! 1. **No global state**: every cache belongs to an explicitly constructed
//!    service object
//! 2. **Host agnostic**: script injection and the federation scope are
//!    traits supplied by the embedder
//! 3. **One load per identifier**: concurrent requests share one in-flight
//!    episode

#![allow(clippy::module_inception)]

pub mod config;
pub mod module;
pub mod utils;

pub use config::{FederationConfig, LoggingConfig};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::module::loader::{
    CandidateRules, FederationLoader, LoadedModule, LoaderSettings, NamespaceLocator,
};
use crate::module::mount::{mount_module, MountedBlock};
use crate::module::registry::{BlockApi, BlockRef, HttpBlockApi, RegistryResolver};
use crate::module::traits::{BlockError, FederationScope, ScriptHost};
use crate::utils::timeout::with_custom_timeout;

/// Composition root owning one registry resolver and one loader
pub struct BlockFederation {
    resolver: Arc<RegistryResolver>,
    loader: FederationLoader,
}

impl BlockFederation {
    /// Build from configuration with an explicit block server API
    pub fn new(
        config: &FederationConfig,
        api: Arc<dyn BlockApi>,
        script_host: Arc<dyn ScriptHost>,
        scope: Arc<dyn FederationScope>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let rules = CandidateRules::from_config(&config.candidates)?;
        let locator = NamespaceLocator::new(scope)
            .with_rules(rules)
            .with_exposed_path(config.candidates.exposed_path.clone());

        let settings = LoaderSettings::new(config.server_url.clone())
            .with_cache_ttl(config.cache_ttl())
            .with_retry((&config.retry).into());

        let resolver = Arc::new(RegistryResolver::new(
            Arc::clone(&api),
            config.registry_ttl(),
        ));
        let loader = FederationLoader::new(settings, api, script_host, Arc::new(locator));

        Ok(Self { resolver, loader })
    }

    /// Build from configuration, talking HTTP to `config.server_url`
    pub fn from_config(
        config: &FederationConfig,
        script_host: Arc<dyn ScriptHost>,
        scope: Arc<dyn FederationScope>,
    ) -> anyhow::Result<Self> {
        let api = HttpBlockApi::new(&config.server_url)?;
        Self::new(config, Arc::new(api), script_host, scope)
    }

    pub fn resolver(&self) -> &Arc<RegistryResolver> {
        &self.resolver
    }

    pub fn loader(&self) -> &FederationLoader {
        &self.loader
    }

    /// Block identifier for a reference
    pub async fn resolve(&self, reference: &BlockRef) -> Result<String, BlockError> {
        let block_id = match reference {
            BlockRef::Id(block_id) => Some(block_id.clone()),
            BlockRef::Name(name) => self.resolver.resolve(name).await,
            BlockRef::AuthorName { author, name } => {
                self.resolver.resolve_for_author(author, name).await
            }
        };

        let block_id = block_id.ok_or_else(|| BlockError::NameNotFound(reference.to_string()))?;
        debug!("Resolved {} to block {}", reference, block_id);
        Ok(block_id)
    }

    /// Resolve and load, applying the configured retry policy
    pub async fn load(&self, reference: &BlockRef) -> Result<LoadedModule, BlockError> {
        let block_id = self.resolve(reference).await?;
        self.loader.load_with_retry(&block_id).await
    }

    /// `load` with a deadline
    ///
    /// On timeout the underlying load keeps running and still fills the
    /// cache.
    pub async fn load_with_timeout(
        &self,
        reference: &BlockRef,
        timeout: Duration,
    ) -> Result<LoadedModule, BlockError> {
        with_custom_timeout(self.load(reference), timeout)
            .await
            .map_err(|_| BlockError::Timeout(reference.to_string()))?
    }

    /// Resolve, load and mount into `container`
    pub async fn mount(
        &self,
        reference: &BlockRef,
        container: &str,
        props: &serde_json::Value,
    ) -> Result<MountedBlock, BlockError> {
        let handle = self.load(reference).await?;
        mount_module(&handle, container, props)
    }
}
