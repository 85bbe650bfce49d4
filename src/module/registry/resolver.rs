//! Registry resolver
//!
//! Keeps a TTL-gated copy of the server registry and answers name lookups
//! from it. Both mappings are replaced wholesale on every successful
//! refresh. A failed refresh keeps whatever was last known.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::module::registry::client::BlockApi;
use crate::module::registry::manifest::{RegistryDocument, RegistryEntry};
use crate::module::traits::BlockError;

/// Default freshness window for the registry
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(300);

/// Point-in-time copy of the registry mappings
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Component name -> entry
    pub global: HashMap<String, RegistryEntry>,
    /// Author -> component name -> entry
    pub by_author: HashMap<String, HashMap<String, RegistryEntry>>,
    /// When the server registry was last fetched successfully
    pub last_fetched: Option<Instant>,
}

impl RegistrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_author.is_empty()
    }
}

#[derive(Default)]
struct RegistryState {
    global: HashMap<String, RegistryEntry>,
    by_author: HashMap<String, HashMap<String, RegistryEntry>>,
    /// Local registrations, consulted after `global`; never merged into it
    local: HashMap<String, RegistryEntry>,
    last_fetched: Option<Instant>,
}

impl RegistryState {
    fn is_stale(&self, ttl: Duration) -> bool {
        if self.global.is_empty() && self.by_author.is_empty() {
            return true;
        }
        match self.last_fetched {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            global: self.global.clone(),
            by_author: self.by_author.clone(),
            last_fetched: self.last_fetched,
        }
    }
}

/// Name -> block identifier resolver backed by the server registry
pub struct RegistryResolver {
    api: Arc<dyn BlockApi>,
    ttl: Duration,
    state: RwLock<RegistryState>,
    /// Serialises refreshes triggered by concurrent stale lookups
    refresh_lock: Mutex<()>,
}

impl RegistryResolver {
    /// Create a resolver with an empty registry
    pub fn new(api: Arc<dyn BlockApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            state: RwLock::new(RegistryState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch the full registry from the server
    ///
    /// On failure the current mappings are kept and returned; the error is
    /// only logged.
    pub async fn refresh(&self) -> RegistrySnapshot {
        match self.try_refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{}, keeping last known registry", e);
                self.state.read().await.snapshot()
            }
        }
    }

    /// `refresh` that reports a failed fetch instead of falling back
    ///
    /// The current mappings are left untouched on error.
    pub async fn try_refresh(&self) -> Result<RegistrySnapshot, BlockError> {
        let document = self
            .api
            .fetch_registry()
            .await
            .map_err(|e| BlockError::RegistryUnavailable(e.to_string()))?;
        Ok(self.replace(document).await)
    }

    async fn replace(&self, document: RegistryDocument) -> RegistrySnapshot {
        let RegistryDocument {
            registry,
            author_registry,
        } = document;

        let mut state = self.state.write().await;
        state.global = registry;
        state.by_author = author_registry;
        state.last_fetched = Some(Instant::now());

        info!(
            "Registry refreshed: {} components, {} authors",
            state.global.len(),
            state.by_author.len()
        );
        state.snapshot()
    }

    /// Refresh if the registry is empty or older than the TTL
    async fn ensure_fresh(&self) {
        if !self.state.read().await.is_stale(self.ttl) {
            return;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if !self.state.read().await.is_stale(self.ttl) {
            return;
        }
        debug!("Registry stale, refreshing");
        self.refresh().await;
    }

    /// Whether the next lookup will trigger a refresh
    pub async fn is_stale(&self) -> bool {
        self.state.read().await.is_stale(self.ttl)
    }

    /// Block identifier for a global component name
    pub async fn resolve(&self, name: &str) -> Option<String> {
        self.entry(name).await.map(|entry| entry.block_id)
    }

    /// Block identifier for an author-scoped component name
    pub async fn resolve_for_author(&self, author: &str, name: &str) -> Option<String> {
        self.entry_for_author(author, name)
            .await
            .map(|entry| entry.block_id)
    }

    /// Full registry entry for a global component name
    pub async fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.ensure_fresh().await;
        let entry = {
            let state = self.state.read().await;
            state
                .global
                .get(name)
                .or_else(|| state.local.get(name))
                .cloned()
        };
        if entry.is_none() {
            debug!("No registry entry for {}", name);
        }
        entry
    }

    /// Full registry entry for an author-scoped component name
    pub async fn entry_for_author(&self, author: &str, name: &str) -> Option<RegistryEntry> {
        self.ensure_fresh().await;
        let entry = self
            .state
            .read()
            .await
            .by_author
            .get(author)
            .and_then(|components| components.get(name))
            .cloned();
        if entry.is_none() {
            debug!("No registry entry for {}/{}", author, name);
        }
        entry
    }

    /// Sorted global component names, local registrations included
    pub async fn list_components(&self) -> Vec<String> {
        self.ensure_fresh().await;
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .global
            .keys()
            .chain(state.local.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Sorted author names
    pub async fn list_authors(&self) -> Vec<String> {
        self.ensure_fresh().await;
        let mut authors: Vec<String> = self.state.read().await.by_author.keys().cloned().collect();
        authors.sort();
        authors
    }

    /// Sorted component names published by one author
    pub async fn list_components_for_author(&self, author: &str) -> Vec<String> {
        self.ensure_fresh().await;
        let mut names: Vec<String> = self
            .state
            .read()
            .await
            .by_author
            .get(author)
            .map(|components| components.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Insert or overwrite a global entry without contacting the server
    ///
    /// Meant for local development. The next successful refresh replaces
    /// the global mapping with the server's; until `invalidate` the entry
    /// still answers names the server does not know.
    pub async fn register_local(&self, name: &str, entry: RegistryEntry) {
        debug!("Registering local component {} -> {}", name, entry.block_id);
        let mut state = self.state.write().await;
        state.local.insert(name.to_string(), entry.clone());
        state.global.insert(name.to_string(), entry);
    }

    /// Drop all mappings and force a refresh on next access
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        *state = RegistryState::default();
        debug!("Registry invalidated");
    }

    /// Current mappings, without a staleness check
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.snapshot()
    }
}
