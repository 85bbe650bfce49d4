//! Federation loader implementation
//!
//! Turns a block identifier into a cached, mountable module. Each
//! identifier is in one of three states: absent, loading (one in-flight
//! episode shared by every caller), or cached until its TTL expires.
//!
//! A load episode runs as its own task. It writes the cache and clears its
//! in-flight marker under the state lock before its result is observed, so
//! a caller that sees a failure can immediately start a fresh episode, and
//! a caller that gives up waiting does not stop the episode from
//! populating the cache.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::module::loader::cache::{CachedModule, LoadedModule, ModuleCache, DEFAULT_MODULE_TTL};
use crate::module::loader::locator::ModuleLocator;
use crate::module::loader::policy::RetryPolicy;
use crate::module::loader::script::ScriptLoader;
use crate::module::registry::client::BlockApi;
use crate::module::traits::{BlockError, ScriptHost};
use crate::utils::retry::retry_async_with_backoff_if;

type LoadFuture = Shared<BoxFuture<'static, Result<LoadedModule, BlockError>>>;

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Base URL prepended to server-relative bundle URLs
    pub server_url: String,
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
}

impl LoaderSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            cache_ttl: DEFAULT_MODULE_TTL,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct InFlight {
    episode: u64,
    future: LoadFuture,
}

struct LoaderState {
    cache: ModuleCache,
    in_flight: HashMap<String, InFlight>,
    next_episode: u64,
}

struct LoaderInner {
    api: Arc<dyn BlockApi>,
    scripts: ScriptLoader,
    locator: Arc<dyn ModuleLocator>,
    server_url: String,
    state: Mutex<LoaderState>,
}

/// Loads, deduplicates and caches federated block modules
#[derive(Clone)]
pub struct FederationLoader {
    inner: Arc<LoaderInner>,
    retry: RetryPolicy,
}

impl FederationLoader {
    pub fn new(
        settings: LoaderSettings,
        api: Arc<dyn BlockApi>,
        script_host: Arc<dyn ScriptHost>,
        locator: Arc<dyn ModuleLocator>,
    ) -> Self {
        let LoaderSettings {
            server_url,
            cache_ttl,
            retry,
        } = settings;

        Self {
            inner: Arc::new(LoaderInner {
                api,
                scripts: ScriptLoader::new(script_host),
                locator,
                server_url,
                state: Mutex::new(LoaderState {
                    cache: ModuleCache::new(cache_ttl),
                    in_flight: HashMap::new(),
                    next_episode: 0,
                }),
            }),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Load a block, with no retry
    ///
    /// Returns the cached handle while it is fresh, joins the in-flight
    /// episode if one exists, and otherwise starts a new one.
    pub async fn load(&self, block_id: &str) -> Result<LoadedModule, BlockError> {
        let future = {
            let mut state = self.inner.state.lock().await;

            if let Some(handle) = state.cache.get(block_id) {
                debug!("Block {} served from cache", block_id);
                return Ok(handle);
            }

            match state.in_flight.get(block_id) {
                Some(in_flight) => {
                    debug!("Block {} already loading, joining", block_id);
                    in_flight.future.clone()
                }
                None => {
                    state.next_episode += 1;
                    let episode = state.next_episode;
                    let future = self.start_episode(block_id, episode);
                    state.in_flight.insert(
                        block_id.to_string(),
                        InFlight {
                            episode,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    /// Spawn a load episode; must be called with the state lock held
    fn start_episode(&self, block_id: &str, episode: u64) -> LoadFuture {
        let inner = Arc::clone(&self.inner);
        let id = block_id.to_string();
        let task = tokio::spawn(async move {
            let result = inner.run_load(&id).await;
            inner.finish(&id, episode, &result).await;
            result
        });

        let inner = Arc::clone(&self.inner);
        let id = block_id.to_string();
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Load task for block {} failed: {}", id, e);
                    let aborted = Err(BlockError::LoadAborted {
                        block_id: id.clone(),
                        message: e.to_string(),
                    });
                    inner.finish(&id, episode, &aborted).await;
                    aborted
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Load a block, retrying errors the retry policy classifies as
    /// retryable
    pub async fn load_with_retry(&self, block_id: &str) -> Result<LoadedModule, BlockError> {
        retry_async_with_backoff_if(
            &self.retry.config,
            || self.load(block_id),
            |e| self.retry.is_retryable(e),
        )
        .await
    }

    /// Remove one cache entry, or all of them
    ///
    /// In-flight loads are not cancelled and still populate the cache.
    pub async fn clear_cache(&self, block_id: Option<&str>) {
        let mut state = self.inner.state.lock().await;
        match block_id {
            Some(block_id) => {
                if state.cache.remove(block_id) {
                    debug!("Cleared cached block {}", block_id);
                }
            }
            None => {
                state.cache.clear();
                debug!("Cleared module cache");
            }
        }
    }

    /// Evict expired entries, returning how many were removed
    pub async fn clear_expired(&self) -> usize {
        self.inner.state.lock().await.cache.clear_expired()
    }

    /// Copy of the cache contents
    pub async fn cache_snapshot(&self) -> HashMap<String, CachedModule> {
        self.inner.state.lock().await.cache.snapshot()
    }

    pub async fn cache_ttl(&self) -> Duration {
        self.inner.state.lock().await.cache.ttl()
    }

    /// Change the TTL; applies to existing entries too
    pub async fn set_cache_ttl(&self, ttl: Duration) {
        self.inner.state.lock().await.cache.set_ttl(ttl);
    }

    pub async fn is_loading(&self, block_id: &str) -> bool {
        self.inner.state.lock().await.in_flight.contains_key(block_id)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.inner.state.lock().await.in_flight.len()
    }

    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }
}

impl LoaderInner {
    async fn run_load(&self, block_id: &str) -> Result<LoadedModule, BlockError> {
        info!("Loading block {}", block_id);

        let metadata = self
            .api
            .fetch_block(block_id)
            .await
            .map_err(|e| BlockError::MetadataFetch {
                block_id: block_id.to_string(),
                message: e.to_string(),
            })?;

        if !metadata.build_status.is_ready() {
            return Err(BlockError::NotReady {
                block_id: block_id.to_string(),
                status: metadata.build_status,
            });
        }
        let federation_url = metadata
            .federation_url()
            .ok_or_else(|| BlockError::MissingFederationUrl(block_id.to_string()))?;

        let source_url = resolve_script_url(&self.server_url, federation_url);
        self.scripts.ensure_loaded(&source_url).await?;

        let module = self.locator.locate(block_id).await?;

        info!("Loaded block {} from {}", block_id, source_url);
        Ok(LoadedModule {
            block_id: block_id.to_string(),
            source_url,
            metadata,
            module,
        })
    }

    /// Record the outcome of an episode and clear its in-flight marker
    async fn finish(&self, block_id: &str, episode: u64, result: &Result<LoadedModule, BlockError>) {
        let mut state = self.state.lock().await;
        if let Ok(handle) = result {
            state.cache.insert(handle.clone());
        }
        if state
            .in_flight
            .get(block_id)
            .is_some_and(|in_flight| in_flight.episode == episode)
        {
            state.in_flight.remove(block_id);
        }
        if let Err(e) = result {
            debug!("Load episode {} for block {} failed: {}", episode, block_id, e);
        }
    }
}

/// `http(s)` URLs are used verbatim, protocol-relative ones take the
/// server's scheme, and anything else is joined to the server base URL.
pub fn resolve_script_url(server_url: &str, federation_url: &str) -> String {
    if has_http_scheme(federation_url) {
        return federation_url.to_string();
    }
    if federation_url.starts_with("//") {
        let scheme = reqwest::Url::parse(server_url)
            .map(|url| url.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        return format!("{scheme}:{federation_url}");
    }
    format!(
        "{}/{}",
        server_url.trim_end_matches('/'),
        federation_url.trim_start_matches('/')
    )
}

fn has_http_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    })
}
