//! Loaded module cache
//!
//! Entries are keyed by block identifier and valid for a fixed window
//! after they were loaded. Expired entries count as absent and are evicted
//! on access.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::module::registry::manifest::BlockMetadata;
use crate::module::traits::BlockModule;

/// Default freshness window for loaded modules
pub const DEFAULT_MODULE_TTL: Duration = Duration::from_secs(300);

/// Handle to a successfully loaded block
#[derive(Clone)]
pub struct LoadedModule {
    pub block_id: String,
    /// Final script URL the module was loaded from
    pub source_url: String,
    /// Metadata the load was based on
    pub metadata: BlockMetadata,
    pub module: Arc<dyn BlockModule>,
}

impl LoadedModule {
    /// Whether both handles point at the same module instance
    pub fn same_module(&self, other: &LoadedModule) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.module) as *const (),
            Arc::as_ptr(&other.module) as *const (),
        )
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("block_id", &self.block_id)
            .field("source_url", &self.source_url)
            .field("build_status", &self.metadata.build_status)
            .finish_non_exhaustive()
    }
}

/// Cached module entry
#[derive(Debug, Clone)]
pub struct CachedModule {
    pub handle: LoadedModule,
    /// Monotonic load instant, used for expiry
    pub loaded_at: Instant,
    /// Unix timestamp of the load, for inspection
    pub loaded_at_unix: u64,
}

impl CachedModule {
    pub fn source_url(&self) -> &str {
        &self.handle.source_url
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// TTL cache of loaded modules
#[derive(Debug)]
pub struct ModuleCache {
    entries: HashMap<String, CachedModule>,
    ttl: Duration,
}

impl ModuleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Fresh handle for the block, evicting an expired entry
    pub fn get(&mut self, block_id: &str) -> Option<LoadedModule> {
        let fresh = self.entries.get(block_id)?.is_fresh(self.ttl);
        if fresh {
            self.entries.get(block_id).map(|cached| cached.handle.clone())
        } else {
            self.entries.remove(block_id);
            None
        }
    }

    /// Store a freshly loaded module
    pub fn insert(&mut self, handle: LoadedModule) {
        let cached = CachedModule {
            loaded_at: Instant::now(),
            loaded_at_unix: crate::utils::current_timestamp(),
            handle,
        };
        self.entries.insert(cached.handle.block_id.clone(), cached);
    }

    pub fn remove(&mut self, block_id: &str) -> bool {
        self.entries.remove(block_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Evict expired entries, returning how many were removed
    pub fn clear_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.is_fresh(ttl));
        before - self.entries.len()
    }

    /// Shallow copy of every entry, expired ones included
    pub fn snapshot(&self) -> HashMap<String, CachedModule> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
