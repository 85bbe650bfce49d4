//! Tests for the federation loader: deduplication, TTL caching, the build
//! status gate, candidate search and retry

mod common;

use block_federation::module::loader::{
    FederationLoader, LoaderSettings, NamespaceLocator, RetryPolicy, DEFAULT_EXPOSED_PATH,
};
use block_federation::module::registry::BuildStatus;
use block_federation::module::traits::BlockError;
use block_federation::utils::retry::RetryConfig;
use common::*;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    api: Arc<MockApi>,
    host: Arc<MockHost>,
    scope: Arc<MockScope>,
    loader: FederationLoader,
}

fn harness_with_retry(retry: RetryPolicy) -> Harness {
    let api = MockApi::new();
    let host = MockHost::new();
    let scope = MockScope::new();
    let settings = LoaderSettings::new(SERVER_URL).with_retry(retry);
    let loader = FederationLoader::new(
        settings,
        api.clone(),
        host.clone(),
        Arc::new(NamespaceLocator::new(scope.clone())),
    );
    Harness {
        api,
        host,
        scope,
        loader,
    }
}

fn harness() -> Harness {
    harness_with_retry(RetryPolicy::new(RetryConfig::new(3, Duration::from_millis(10))))
}

/// Harness with one ready block published under its raw identifier
fn harness_with_block(block_id: &str) -> (Harness, Arc<MockModule>, Arc<MockContainer>) {
    let h = harness();
    let module = MockModule::new();
    let container = MockContainer::exposing(module.clone());
    h.api.put_block(ready_block(block_id));
    h.scope.publish(block_id, container.clone());
    (h, module, container)
}

// ===== Deduplication =====

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_episode() {
    let (h, _module, container) = harness_with_block("b1");
    h.api.set_latency(Duration::from_millis(100));

    let results = join_all((0..5).map(|_| h.loader.load("b1"))).await;

    let handles: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    for handle in &handles {
        assert!(handle.same_module(&handles[0]));
        assert_eq!(handle.source_url, script_url("b1"));
    }
    assert_eq!(h.api.block_fetches(), 1);
    assert_eq!(h.host.injection_count(), 1);
    assert_eq!(h.scope.lookup_count(), 1);
    assert_eq!(container.gets(), 1);
    assert_eq!(h.loader.in_flight_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_failure() {
    let h = harness();
    h.api.set_latency(Duration::from_millis(100));

    let results = join_all((0..3).map(|_| h.loader.load("missing"))).await;

    for result in results {
        assert!(matches!(
            result,
            Err(BlockError::MetadataFetch { ref block_id, .. }) if block_id == "missing"
        ));
    }
    assert_eq!(h.api.block_fetches(), 1);
    assert!(!h.loader.is_loading("missing").await);
}

#[tokio::test(start_paused = true)]
async fn test_different_blocks_load_independently() {
    let h = harness();
    for id in ["b1", "b2"] {
        h.api.put_block(ready_block(id));
        h.scope
            .publish(id, MockContainer::exposing(MockModule::new()));
    }
    h.api.set_latency(Duration::from_millis(100));

    let (a, b) = tokio::join!(h.loader.load("b1"), h.loader.load("b2"));

    assert!(!a.unwrap().same_module(&b.unwrap()));
    assert_eq!(h.api.block_fetches(), 2);
    assert_eq!(h.host.injection_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_load_still_fills_cache() {
    let (h, _module, _container) = harness_with_block("b1");
    h.api.set_latency(Duration::from_secs(1));

    let abandoned = tokio::time::timeout(Duration::from_millis(100), h.loader.load("b1")).await;
    assert!(abandoned.is_err());
    assert!(h.loader.is_loading("b1").await);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!h.loader.is_loading("b1").await);
    assert!(h.loader.cache_snapshot().await.contains_key("b1"));
    h.loader.load("b1").await.unwrap();
    assert_eq!(h.api.block_fetches(), 1);
}

// ===== TTL cache =====

#[tokio::test(start_paused = true)]
async fn test_cached_handle_reused_within_ttl() {
    let (h, _module, _container) = harness_with_block("b1");

    let first = h.loader.load("b1").await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    let second = h.loader.load("b1").await.unwrap();

    assert!(first.same_module(&second));
    assert_eq!(h.api.block_fetches(), 1);
    assert_eq!(h.scope.lookup_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_triggers_fresh_load() {
    let (h, _module, _container) = harness_with_block("b1");

    h.loader.load("b1").await.unwrap();
    tokio::time::advance(Duration::from_secs(300)).await;
    h.loader.load("b1").await.unwrap();

    assert_eq!(h.api.block_fetches(), 2);
    assert_eq!(h.scope.lookup_count(), 2);
    // Same URL: the script step finds it already loaded
    assert_eq!(h.host.injections_of(&script_url("b1")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shorter_ttl_applies_to_existing_entries() {
    let (h, _module, _container) = harness_with_block("b1");

    h.loader.load("b1").await.unwrap();
    h.loader.set_cache_ttl(Duration::from_secs(10)).await;
    assert_eq!(h.loader.cache_ttl().await, Duration::from_secs(10));

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(h.loader.clear_expired().await, 1);
    h.loader.load("b1").await.unwrap();
    assert_eq!(h.api.block_fetches(), 2);
}

#[tokio::test]
async fn test_new_build_url_is_injected() {
    let (h, _module, _container) = harness_with_block("b1");

    h.loader.load("b1").await.unwrap();

    let mut rebuilt = ready_block("b1");
    rebuilt.federation_url = Some("/federation/b1/v2/remoteEntry.js".to_string());
    h.api.put_block(rebuilt);
    h.loader.clear_cache(Some("b1")).await;

    let handle = h.loader.load("b1").await.unwrap();
    assert_eq!(
        handle.source_url,
        format!("{SERVER_URL}/federation/b1/v2/remoteEntry.js")
    );
    assert_eq!(h.host.injection_count(), 2);
}

// ===== Cache clearing =====

#[tokio::test]
async fn test_clear_cache_forces_full_reload() {
    let (h, _module, _container) = harness_with_block("b1");

    h.loader.load("b1").await.unwrap();
    h.loader.clear_cache(Some("b1")).await;
    assert!(h.loader.cache_snapshot().await.is_empty());

    h.loader.load("b1").await.unwrap();
    assert_eq!(h.api.block_fetches(), 2);
    assert_eq!(h.scope.lookup_count(), 2);
}

#[tokio::test]
async fn test_clear_all_and_snapshot() {
    let h = harness();
    for id in ["b1", "b2"] {
        h.api.put_block(ready_block(id));
        h.scope
            .publish(id, MockContainer::exposing(MockModule::new()));
        h.loader.load(id).await.unwrap();
    }

    let snapshot = h.loader.cache_snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["b2"].source_url(), script_url("b2"));
    assert!(snapshot["b1"].loaded_at_unix > 0);

    h.loader.clear_cache(None).await;
    assert!(h.loader.cache_snapshot().await.is_empty());
    // The snapshot taken earlier is a copy
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_does_not_cancel_in_flight_load() {
    let (h, _module, _container) = harness_with_block("b1");
    h.api.set_latency(Duration::from_millis(100));

    let (result, ()) = tokio::join!(h.loader.load("b1"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.loader.clear_cache(None).await;
    });

    result.unwrap();
    assert!(h.loader.cache_snapshot().await.contains_key("b1"));
}

// ===== Build status gate =====

#[tokio::test]
async fn test_unready_builds_are_not_injected() {
    for status in [
        BuildStatus::Pending,
        BuildStatus::Building,
        BuildStatus::Failed,
        BuildStatus::Unknown,
    ] {
        let h = harness();
        let mut metadata = ready_block("b1");
        metadata.build_status = status;
        h.api.put_block(metadata);

        let result = h.loader.load("b1").await;

        assert_eq!(
            result.unwrap_err(),
            BlockError::NotReady {
                block_id: "b1".to_string(),
                status,
            }
        );
        assert_eq!(h.host.injection_count(), 0);
        assert_eq!(h.scope.lookup_count(), 0);
    }
}

#[tokio::test]
async fn test_missing_federation_url_fails() {
    let h = harness();
    let mut metadata = ready_block("b1");
    metadata.federation_url = None;
    h.api.put_block(metadata);

    let result = h.loader.load("b1").await;

    assert_eq!(
        result.unwrap_err(),
        BlockError::MissingFederationUrl("b1".to_string())
    );
    assert_eq!(h.host.injection_count(), 0);
}

#[tokio::test]
async fn test_absolute_federation_url_used_verbatim() {
    let (h, _module, _container) = harness_with_block("b1");
    let mut metadata = ready_block("b1");
    metadata.federation_url = Some("https://cdn.example.com/b1.js".to_string());
    h.api.put_block(metadata);

    let handle = h.loader.load("b1").await.unwrap();

    assert_eq!(handle.source_url, "https://cdn.example.com/b1.js");
    assert_eq!(h.host.injections_of("https://cdn.example.com/b1.js"), 1);
}

// ===== Script loading =====

#[tokio::test]
async fn test_script_failure_clears_in_flight_and_allows_retry() {
    let (h, _module, _container) = harness_with_block("b1");
    h.host.fail_url(&script_url("b1"));

    let result = h.loader.load("b1").await;
    assert!(matches!(result, Err(BlockError::ScriptLoad { .. })));
    assert!(!h.loader.is_loading("b1").await);
    assert!(h.loader.cache_snapshot().await.is_empty());

    h.host.heal_url(&script_url("b1"));
    h.loader.load("b1").await.unwrap();
    assert_eq!(h.host.injections_of(&script_url("b1")), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shared_script_url_injected_once() {
    let h = harness();
    for id in ["a1", "a2"] {
        let mut metadata = ready_block(id);
        metadata.federation_url = Some("/federation/shared/remoteEntry.js".to_string());
        h.api.put_block(metadata);
        h.scope
            .publish(id, MockContainer::exposing(MockModule::new()));
    }
    h.host.set_latency(Duration::from_millis(50));

    let (a1, a2) = tokio::join!(h.loader.load("a1"), h.loader.load("a2"));

    a1.unwrap();
    a2.unwrap();
    assert_eq!(h.host.injection_count(), 1);
    // Each block still ran its own module search
    assert!(h.scope.lookups().contains(&"a1".to_string()));
    assert!(h.scope.lookups().contains(&"a2".to_string()));
}

// ===== Candidate search =====

#[tokio::test]
async fn test_candidate_search_order() {
    let h = harness();
    let container = MockContainer::exposing(MockModule::new());
    h.api.put_block(ready_block("chart-42"));
    h.scope.publish("block_chart42", container.clone());

    h.loader.load("chart-42").await.unwrap();

    assert_eq!(
        h.scope.lookups(),
        vec!["chart-42", "chart42", "block_chart42"]
    );
    assert_eq!(
        *container.requested_paths.lock().unwrap(),
        vec![DEFAULT_EXPOSED_PATH.to_string()]
    );
}

#[tokio::test]
async fn test_container_without_mount_is_skipped() {
    let h = harness();
    let module = MockModule::new();
    h.api.put_block(ready_block("chart-42"));
    h.scope.publish("chart-42", MockContainer::without_mount());
    h.scope.publish("chart42", MockContainer::exposing(module.clone()));

    let handle = h.loader.load("chart-42").await.unwrap();

    handle.module.mount("root", &serde_json::Value::Null).unwrap();
    assert_eq!(module.mounts(), 1);
}

#[tokio::test]
async fn test_no_candidate_lists_every_name_tried() {
    let h = harness_with_retry(RetryPolicy::none());
    h.api.put_block(ready_block("chart-42"));

    let error = h.loader.load("chart-42").await.unwrap_err();

    assert_eq!(
        error,
        BlockError::ModuleNotFound {
            block_id: "chart-42".to_string(),
            tried: vec![
                "chart-42".to_string(),
                "chart42".to_string(),
                "block_chart42".to_string(),
                "blockContainer".to_string(),
            ],
        }
    );
    assert!(error.to_string().contains("blockContainer"));
    assert!(!h.loader.is_loading("chart-42").await);
}

#[tokio::test]
async fn test_only_uncallable_exports_reports_not_callable() {
    let h = harness();
    h.api.put_block(ready_block("b1"));
    h.scope.publish("blockContainer", MockContainer::without_mount());

    let error = h.loader.load("b1").await.unwrap_err();

    assert!(matches!(error, BlockError::NotCallable { .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_legacy_container_name_is_last_resort() {
    let h = harness();
    h.api.put_block(ready_block("b1"));
    h.scope.publish(
        "blockContainer",
        MockContainer::exposing(MockModule::new()),
    );

    h.loader.load("b1").await.unwrap();

    assert_eq!(h.scope.lookups(), vec!["b1", "block_b1", "blockContainer"]);
}

// ===== Retry policy =====

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_registration_race() {
    let h = harness();
    let container = MockContainer::flaky(MockModule::new(), 2);
    h.api.put_block(ready_block("abc"));
    h.scope.publish("abc", container.clone());

    h.loader.load_with_retry("abc").await.unwrap();

    assert_eq!(container.gets(), 3);
    assert_eq!(h.api.block_fetches(), 3);
    assert_eq!(h.host.injection_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts() {
    let h = harness();
    let container = MockContainer::flaky(MockModule::new(), 5);
    h.api.put_block(ready_block("abc"));
    h.scope.publish("abc", container.clone());

    let error = h.loader.load_with_retry("abc").await.unwrap_err();

    assert!(matches!(error, BlockError::ModuleNotFound { .. }));
    assert_eq!(container.gets(), 3);
    assert_eq!(h.api.block_fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_errors_are_not_retried() {
    let h = harness();
    let mut metadata = ready_block("b1");
    metadata.build_status = BuildStatus::Failed;
    h.api.put_block(metadata);

    let error = h.loader.load_with_retry("b1").await.unwrap_err();

    assert!(matches!(error, BlockError::NotReady { .. }));
    assert_eq!(h.api.block_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_predicate() {
    let retry = RetryPolicy::new(RetryConfig::new(4, Duration::from_millis(10)))
        .with_predicate(|e| matches!(e, BlockError::ScriptLoad { .. }));
    let h = harness_with_retry(retry);
    h.api.put_block(ready_block("b1"));
    h.host.fail_url(&script_url("b1"));

    let error = h.loader.load_with_retry("b1").await.unwrap_err();

    assert!(matches!(error, BlockError::ScriptLoad { .. }));
    assert_eq!(h.host.injections_of(&script_url("b1")), 4);
}
