//! Block system
//!
//! ## Architecture
//!
//! - **Registry**: resolves component names, global or author-scoped, to
//!   block identifiers from a TTL-cached server registry
//! - **Loader**: turns an identifier into one fetched, injected and cached
//!   remote module, deduplicating concurrent loads
//! - **Host traits**: the executing environment (script injection, the
//!   shared federation scope) is supplied by the embedder

pub mod loader;
pub mod mount;
pub mod registry;
pub mod traits;

pub use loader::{FederationLoader, LoadedModule, LoaderSettings, RetryPolicy};
pub use mount::{mount_module, MountedBlock};
pub use registry::{BlockApi, BlockMetadata, BlockRef, RegistryEntry, RegistryResolver};
pub use traits::{
    BlockError, BlockModule, FederationScope, ModuleContainer, ModuleFactory, MountCleanup,
    ScriptHost,
};
