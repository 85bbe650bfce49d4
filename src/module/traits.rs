//! Block system traits and interfaces
//!
//! Defines the seams between the loader and the environment that executes
//! remote bundles: script injection, the shared federation scope, the
//! containers published into it, and the mountable modules they expose.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::module::registry::manifest::BuildStatus;

/// Block loading errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    /// Registry refresh failed; lookups fall back to the last known state
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("No block identifier for name: {0}")]
    NameNotFound(String),

    #[error("Invalid block reference: {0}")]
    InvalidReference(String),

    #[error("Failed to fetch metadata for block {block_id}: {message}")]
    MetadataFetch { block_id: String, message: String },

    #[error("Block {block_id} is not ready (build status: {status})")]
    NotReady {
        block_id: String,
        status: BuildStatus,
    },

    #[error("Block {0} is not ready: no federation URL")]
    MissingFederationUrl(String),

    #[error("Failed to load script {url}: {message}")]
    ScriptLoad { url: String, message: String },

    /// The bundle executed but no candidate published a usable container
    #[error("Module container not found for block {block_id} (tried: {})", tried.join(", "))]
    ModuleNotFound {
        block_id: String,
        tried: Vec<String>,
    },

    /// A container answered but the exposed value has no mount capability
    #[error("Exposed module for block {block_id} is not a function (tried: {})", tried.join(", "))]
    NotCallable {
        block_id: String,
        tried: Vec<String>,
    },

    #[error("Mount failed for block {block_id}: {message}")]
    MountFailed { block_id: String, message: String },

    #[error("Load of block {block_id} aborted: {message}")]
    LoadAborted { block_id: String, message: String },

    #[error("Timed out loading {0}")]
    Timeout(String),
}

impl BlockError {
    /// Whether the error looks like a registration race rather than a
    /// permanent failure: the bundle ran but its container was not (yet)
    /// usable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlockError::ModuleNotFound { .. } | BlockError::NotCallable { .. }
        )
    }
}

/// Cleanup returned by a mount, run on unmount
pub type MountCleanup = Box<dyn FnOnce() + Send>;

/// A loaded remote module exposing the mount capability
pub trait BlockModule: Send + Sync {
    /// Render into `container` with the given props
    fn mount(
        &self,
        container: &str,
        props: &serde_json::Value,
    ) -> Result<Option<MountCleanup>, String>;
}

/// Factory handed out by a container; yields the exposed module, or `None`
/// when the exposed value carries no mount capability.
pub type ModuleFactory = Box<dyn FnOnce() -> Option<Arc<dyn BlockModule>> + Send>;

/// A container published by a remote bundle into the federation scope
#[async_trait]
pub trait ModuleContainer: Send + Sync {
    /// Resolve an exposed module path to its factory
    async fn get(&self, path: &str) -> Result<ModuleFactory, String>;
}

/// The shared namespace remote bundles register their containers in
pub trait FederationScope: Send + Sync {
    /// Look up a container by its global name
    fn container(&self, name: &str) -> Option<Arc<dyn ModuleContainer>>;
}

/// The environment that executes remote scripts
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Whether a script with exactly this URL is already present
    fn has_script(&self, url: &str) -> bool;

    /// Inject the script and wait for its load or error signal
    async fn inject(&self, url: &str) -> Result<(), String>;
}
