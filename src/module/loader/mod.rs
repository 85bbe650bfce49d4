//! Federated module loading
//!
//! Fetches block metadata, injects bundles once per URL, locates the
//! published module and caches it with a TTL.

pub mod cache;
pub mod loader;
pub mod locator;
pub mod policy;
pub mod script;

pub use cache::{CachedModule, LoadedModule, ModuleCache, DEFAULT_MODULE_TTL};
pub use loader::{resolve_script_url, FederationLoader, LoaderSettings};
pub use locator::{
    CandidateName, CandidateRule, CandidateRules, ModuleLocator, NamespaceLocator,
    DEFAULT_EXPOSED_PATH, LEGACY_CONTAINER_NAME,
};
pub use policy::RetryPolicy;
pub use script::ScriptLoader;
