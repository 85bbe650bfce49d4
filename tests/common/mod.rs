//! In-memory host and server doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use block_federation::module::registry::{
    BlockApi, BlockMetadata, BuildStatus, RegistryDocument, RegistryEntry, RegistryError,
};
use block_federation::module::traits::{
    BlockModule, FederationScope, ModuleContainer, ModuleFactory, MountCleanup, ScriptHost,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SERVER_URL: &str = "http://blocks.test";

pub fn ready_block(block_id: &str) -> BlockMetadata {
    BlockMetadata {
        block_id: block_id.to_string(),
        federation_url: Some(format!("/federation/{block_id}/remoteEntry.js")),
        build_status: BuildStatus::Success,
        props_schema: None,
    }
}

pub fn script_url(block_id: &str) -> String {
    format!("{SERVER_URL}/federation/{block_id}/remoteEntry.js")
}

pub fn entry(block_id: &str, name: &str, author: Option<&str>) -> RegistryEntry {
    RegistryEntry {
        author: author.map(str::to_string),
        ..RegistryEntry::new(block_id, name)
    }
}

/// Block server double
#[derive(Default)]
pub struct MockApi {
    blocks: Mutex<HashMap<String, BlockMetadata>>,
    registry: Mutex<Option<RegistryDocument>>,
    /// Simulated latency of every call
    latency: Mutex<Option<Duration>>,
    pub block_fetches: AtomicUsize,
    pub registry_fetches: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_block(&self, metadata: BlockMetadata) {
        self.blocks
            .lock()
            .unwrap()
            .insert(metadata.block_id.clone(), metadata);
    }

    /// `None` makes registry fetches fail
    pub fn set_registry(&self, document: Option<RegistryDocument>) {
        *self.registry.lock().unwrap() = document;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    pub fn registry_fetches(&self) -> usize {
        self.registry_fetches.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BlockApi for MockApi {
    async fn fetch_block(&self, block_id: &str) -> Result<BlockMetadata, RegistryError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.blocks
            .lock()
            .unwrap()
            .get(block_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(block_id.to_string()))
    }

    async fn fetch_registry(&self) -> Result<RegistryDocument, RegistryError> {
        self.registry_fetches.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.registry
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RegistryError::NetworkError("connection refused".to_string()))
    }
}

/// Script host double; every injection succeeds unless the URL is marked
/// as failing
#[derive(Default)]
pub struct MockHost {
    scripts: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    pub injections: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal_url(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn injection_count(&self) -> usize {
        self.injections.lock().unwrap().len()
    }

    pub fn injections_of(&self, url: &str) -> usize {
        self.injections
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl ScriptHost for MockHost {
    fn has_script(&self, url: &str) -> bool {
        self.scripts.lock().unwrap().contains(url)
    }

    async fn inject(&self, url: &str) -> Result<(), String> {
        self.injections.lock().unwrap().push(url.to_string());
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().unwrap().contains(url) {
            return Err("network error".to_string());
        }
        self.scripts.lock().unwrap().insert(url.to_string());
        Ok(())
    }
}

/// Mountable module double
#[derive(Default)]
pub struct MockModule {
    pub fail_mount: AtomicBool,
    pub mounts: AtomicUsize,
    pub cleanups: Arc<AtomicUsize>,
}

impl MockModule {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mounts(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

impl BlockModule for MockModule {
    fn mount(
        &self,
        _container: &str,
        _props: &serde_json::Value,
    ) -> Result<Option<MountCleanup>, String> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        if self.fail_mount.load(Ordering::SeqCst) {
            return Err("render threw".to_string());
        }
        let cleanups = Arc::clone(&self.cleanups);
        Ok(Some(Box::new(move || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        })))
    }
}

/// Container double
pub struct MockContainer {
    /// `None` exposes a value without a mount capability
    module: Option<Arc<MockModule>>,
    /// Number of initial `get` calls that fail
    failures_left: AtomicUsize,
    pub gets: AtomicUsize,
    pub requested_paths: Mutex<Vec<String>>,
}

impl MockContainer {
    pub fn exposing(module: Arc<MockModule>) -> Arc<Self> {
        Arc::new(Self {
            module: Some(module),
            failures_left: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            requested_paths: Mutex::new(Vec::new()),
        })
    }

    pub fn without_mount() -> Arc<Self> {
        Arc::new(Self {
            module: None,
            failures_left: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            requested_paths: Mutex::new(Vec::new()),
        })
    }

    /// Container whose first `failures` lookups fail
    pub fn flaky(module: Arc<MockModule>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            module: Some(module),
            failures_left: AtomicUsize::new(failures),
            gets: AtomicUsize::new(0),
            requested_paths: Mutex::new(Vec::new()),
        })
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleContainer for MockContainer {
    async fn get(&self, path: &str) -> Result<ModuleFactory, String> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.requested_paths.lock().unwrap().push(path.to_string());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err("container not initialised".to_string());
        }

        let module = self.module.clone();
        Ok(Box::new(move || {
            module.map(|module| module as Arc<dyn BlockModule>)
        }))
    }
}

/// Federation scope double recording every lookup
#[derive(Default)]
pub struct MockScope {
    containers: Mutex<HashMap<String, Arc<dyn ModuleContainer>>>,
    pub lookups: Mutex<Vec<String>>,
}

impl MockScope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, name: &str, container: Arc<dyn ModuleContainer>) {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), container);
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

impl FederationScope for MockScope {
    fn container(&self, name: &str) -> Option<Arc<dyn ModuleContainer>> {
        self.lookups.lock().unwrap().push(name.to_string());
        self.containers.lock().unwrap().get(name).cloned()
    }
}
