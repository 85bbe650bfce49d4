//! Timeout helpers
//!
//! Loads are never cancelled by the loader itself. Callers that want a
//! deadline race the load against a timer here; the abandoned load keeps
//! running in the background.

use std::future::Future;
use std::time::Duration;

/// Run a future with a custom timeout
pub async fn with_custom_timeout<F, T>(
    future: F,
    timeout: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await
}
