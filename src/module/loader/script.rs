//! Script injection with per-URL deduplication
//!
//! A URL is injected at most once. Concurrent requests for the same URL
//! share one injection; a failed injection is forgotten so a later request
//! may try again.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::module::traits::{BlockError, ScriptHost};

type InjectFuture = Shared<BoxFuture<'static, Result<(), BlockError>>>;

/// Deduplicating front for a `ScriptHost`
pub struct ScriptLoader {
    host: Arc<dyn ScriptHost>,
    loaded: Mutex<HashSet<String>>,
    pending: Mutex<HashMap<String, InjectFuture>>,
}

impl ScriptLoader {
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Self {
            host,
            loaded: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure the script at `url` has been loaded once
    pub async fn ensure_loaded(&self, url: &str) -> Result<(), BlockError> {
        if self.loaded.lock().await.contains(url) || self.host.has_script(url) {
            debug!("Script already present: {}", url);
            return Ok(());
        }

        let injection = {
            let mut pending = self.pending.lock().await;
            match pending.get(url) {
                Some(injection) => {
                    debug!("Joining pending injection of {}", url);
                    injection.clone()
                }
                // Finished between the first check and taking the lock
                None if self.loaded.lock().await.contains(url) => return Ok(()),
                None => {
                    info!("Injecting script {}", url);
                    let host = Arc::clone(&self.host);
                    let owned_url = url.to_string();
                    let injection = async move {
                        let result = host.inject(&owned_url).await;
                        result.map_err(|message| BlockError::ScriptLoad {
                            url: owned_url,
                            message,
                        })
                    }
                    .boxed()
                    .shared();
                    pending.insert(url.to_string(), injection.clone());
                    injection
                }
            }
        };

        let result = injection.clone().await;

        let mut pending = self.pending.lock().await;
        if pending
            .get(url)
            .is_some_and(|current| current.ptr_eq(&injection))
        {
            pending.remove(url);
            match &result {
                Ok(()) => {
                    self.loaded.lock().await.insert(url.to_string());
                }
                Err(e) => warn!("{}", e),
            }
        }
        result
    }

    /// Whether this loader has seen the script load successfully
    pub async fn is_loaded(&self, url: &str) -> bool {
        self.loaded.lock().await.contains(url)
    }
}
