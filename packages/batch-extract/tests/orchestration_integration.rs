//! Integration tests for the orchestration layer.
//!
//! These tests verify the full workflow end to end:
//! 1. Route between the realtime and batch paths
//! 2. Deduplicate against the cache and submit only missing work
//! 3. Drive batch jobs to a terminal state under a wait budget
//! 4. Reassemble results in input order from either path

use std::time::Duration;

use batch_extract::testing::{canned_result, MockProvider, UnavailableStore};
use batch_extract::{
    CacheEntry, CacheStore, Engine, ExtractionResult, Fingerprint, JobState, JobStatus,
    MemoryStore, ModelParams, PromptItem, RunConfig, RunError,
};
use tokio_util::sync::CancellationToken;

const THRESHOLD: usize = 10;

fn params() -> ModelParams {
    ModelParams::new("test-model")
}

fn config() -> RunConfig {
    RunConfig::default()
        .with_enabled(true)
        .with_threshold(THRESHOLD)
        .with_poll_interval_secs(30)
        .with_timeout_secs(300)
}

fn engine_with(
    provider: MockProvider,
    config: RunConfig,
) -> Engine<MemoryStore, MockProvider> {
    Engine::with_config(MemoryStore::new(), provider, params(), config)
}

/// Helper: distinct prompts "p0".."p{n-1}".
fn prompts(n: usize) -> Vec<PromptItem> {
    PromptItem::from_prompts((0..n).map(|i| format!("p{i}")))
}

/// Helper: the fingerprint the engine will compute for prompt `i`.
fn fingerprint_of(i: usize) -> Fingerprint {
    Fingerprint::compute(&PromptItem::new(0, format!("p{i}")), &params()).unwrap()
}

/// Helper: the result every path produces for prompt `i`.
fn expected_result(i: usize) -> ExtractionResult {
    canned_result(&format!("p{i}"))
}

fn assert_in_input_order(results: &[ExtractionResult]) {
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result, &expected_result(i), "result {i} out of place");
    }
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_below_threshold_takes_realtime_path() {
    let engine = engine_with(MockProvider::new(), config());
    let results = engine.run(prompts(THRESHOLD - 1)).await.unwrap();

    assert_eq!(results.len(), THRESHOLD - 1);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().realtime_count(), THRESHOLD - 1);
    assert_eq!(engine.provider().submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_at_threshold_takes_batch_path() {
    let engine = engine_with(MockProvider::new(), config());
    let results = engine.run(prompts(THRESHOLD)).await.unwrap();

    assert_eq!(results.len(), THRESHOLD);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().realtime_count(), 0);
    assert_eq!(engine.provider().submission_count(), 1);
}

#[tokio::test]
async fn test_batch_disabled_always_realtime() {
    let engine = engine_with(MockProvider::new(), config().with_enabled(false));
    let results = engine.run(prompts(THRESHOLD * 3)).await.unwrap();

    assert_eq!(results.len(), THRESHOLD * 3);
    assert_eq!(engine.provider().submission_count(), 0);
}

// =========================================================================
// Ordering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_outputs_delivered_out_of_order_merge_in_input_order() {
    let provider = MockProvider::new().deliver_outputs_reversed();
    let engine = engine_with(provider, config());

    let results = engine.run(prompts(25)).await.unwrap();

    assert_eq!(results.len(), 25);
    assert_in_input_order(&results);
}

#[tokio::test(start_paused = true)]
async fn test_paths_produce_structurally_identical_results() {
    let realtime_engine = engine_with(MockProvider::new(), config().with_enabled(false));
    let batch_engine = engine_with(MockProvider::new(), config());

    let from_realtime = realtime_engine.run(prompts(12)).await.unwrap();
    let from_batch = batch_engine.run(prompts(12)).await.unwrap();

    assert_eq!(from_realtime, from_batch);
}

// =========================================================================
// Caching and idempotent reruns
// =========================================================================

#[tokio::test]
async fn test_realtime_rerun_submits_only_missing() {
    let engine = engine_with(MockProvider::new(), config());
    let n = THRESHOLD - 2;

    // Pre-populate a cached subset, as if a prior run completed them.
    for i in 0..3 {
        engine
            .store()
            .put(CacheEntry::realtime(fingerprint_of(i), expected_result(i)))
            .await
            .unwrap();
    }

    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    // New network operations equal input minus cached.
    assert_eq!(engine.provider().realtime_count(), n - 3);
}

#[tokio::test(start_paused = true)]
async fn test_batch_rerun_submits_only_missing() {
    let engine = engine_with(MockProvider::new(), config());
    let n = 20;
    let cached = 8;

    for i in 0..cached {
        engine
            .store()
            .put(CacheEntry::realtime(fingerprint_of(i), expected_result(i)))
            .await
            .unwrap();
    }

    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().submission_count(), 1);
    assert_eq!(engine.provider().job_members("job-1").len(), n - cached);
}

#[tokio::test(start_paused = true)]
async fn test_full_cache_hit_performs_zero_network_operations() {
    let engine = engine_with(MockProvider::new(), config());
    let items = prompts(15);

    let first = engine.run(items.clone()).await.unwrap();
    assert_eq!(engine.provider().submission_count(), 1);

    engine.provider().clear_calls();
    let second = engine.run(items).await.unwrap();

    assert_eq!(engine.provider().network_ops(), 0);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_full_cache_hit_realtime_path() {
    let engine = engine_with(MockProvider::new(), config());
    let items = prompts(5);

    let first = engine.run(items.clone()).await.unwrap();
    engine.provider().clear_calls();
    let second = engine.run(items).await.unwrap();

    assert_eq!(engine.provider().network_ops(), 0);
    assert_eq!(first, second);
}

// =========================================================================
// Resumability
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_then_reattach_completes_without_resubmission() {
    let n = 16;
    let provider = MockProvider::new();
    let engine = engine_with(provider, config());

    // First call: the job never finishes inside the wait budget.
    // job-1 is the first id the mock assigns.
    engine
        .provider()
        .script_job_states("job-1", [JobState::Running]);

    let err = engine.run(prompts(n)).await.unwrap_err();
    match err {
        RunError::PollTimeout { ref job_id, waited_secs } => {
            assert_eq!(job_id, "job-1");
            assert_eq!(waited_secs, 300);
        }
        other => panic!("expected poll timeout, got {other:?}"),
    }
    assert_eq!(
        engine.store().manifest("job-1").unwrap().status,
        JobStatus::TimedOut
    );

    // A separate completing process cached part of the job's members.
    for i in 0..6 {
        engine
            .store()
            .put(CacheEntry::from_job(
                fingerprint_of(i),
                expected_result(i),
                "job-1",
            ))
            .await
            .unwrap();
    }

    // Second call: the remote job has finished in the meantime. The
    // manifest still covers all missing members, so the call re-attaches
    // instead of resubmitting.
    engine
        .provider()
        .script_job_states("job-1", [JobState::Succeeded]);

    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().submission_count(), 1);
    assert_eq!(
        engine.store().manifest("job-1").unwrap().status,
        JobStatus::Succeeded
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_rerun_resubmits_only_missing_members() {
    let n = 16;
    let cached = 5;
    let engine = engine_with(MockProvider::new(), config());

    engine.provider().script_job_states(
        "job-1",
        [JobState::Failed {
            message: "quota exceeded".into(),
        }],
    );

    let err = engine.run(prompts(n)).await.unwrap_err();
    assert!(matches!(err, RunError::JobFailed { .. }));
    // A failed job writes no member entries.
    assert_eq!(engine.store().entry_count(), 0);

    // Some members complete elsewhere before the rerun.
    for i in 0..cached {
        engine
            .store()
            .put(CacheEntry::realtime(fingerprint_of(i), expected_result(i)))
            .await
            .unwrap();
    }

    // The FAILED manifest is not re-attachable: the rerun submits a new
    // job covering exactly the still-missing members.
    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().submission_count(), 2);
    assert_eq!(engine.provider().job_members("job-2").len(), n - cached);
}

#[tokio::test(start_paused = true)]
async fn test_failed_submission_writes_no_manifest_and_rerun_recovers() {
    let engine = engine_with(MockProvider::new().fail_submission(), config());

    let err = engine.run(prompts(12)).await.unwrap_err();
    assert!(matches!(err, RunError::Submission(_)));
    assert_eq!(engine.store().manifest_count(), 0);

    engine.provider().set_fail_submission(false);
    let results = engine.run(prompts(12)).await.unwrap();

    assert_eq!(results.len(), 12);
    assert_in_input_order(&results);
}

// =========================================================================
// Failure handling
// =========================================================================

#[tokio::test]
async fn test_storage_outage_aborts_before_any_provider_traffic() {
    let engine = Engine::with_config(
        UnavailableStore,
        MockProvider::new(),
        params(),
        config(),
    );

    let err = engine.run(prompts(5)).await.unwrap_err();

    assert!(matches!(err, RunError::Storage(_)));
    assert!(!err.is_resumable());
    // Never silently degrades to "treat everything as a cache miss".
    assert_eq!(engine.provider().network_ops(), 0);
    assert!(engine.provider().calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_realtime_failures_are_retried() {
    let provider = MockProvider::new().fail_realtime_transient("p0", 2);
    let engine = engine_with(provider, config());

    let results = engine.run(prompts(1)).await.unwrap();

    assert_eq!(results.len(), 1);
    // Two transient failures plus the success.
    assert_eq!(engine.provider().realtime_count(), 3);
}

#[tokio::test]
async fn test_permanent_realtime_failure_keeps_siblings_cached() {
    let provider = MockProvider::new().fail_realtime("p2");
    let engine = engine_with(provider, config());
    let n = 5;

    let err = engine.run(prompts(n)).await.unwrap_err();
    assert!(matches!(err, RunError::Provider(_)));
    // Successful siblings were cached; only the failure is unpaid.
    assert_eq!(engine.store().entry_count(), n - 1);

    engine.provider().clear_realtime_failures();
    engine.provider().clear_calls();
    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    assert_eq!(engine.provider().realtime_count(), 1);
}

// =========================================================================
// Configuration behavior
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_without_caching_completes_but_persists_nothing() {
    let engine = engine_with(MockProvider::new(), config().with_caching(false));

    let results = engine.run(prompts(12)).await.unwrap();

    assert_eq!(results.len(), 12);
    assert_in_input_order(&results);
    assert_eq!(engine.store().entry_count(), 0);
    assert_eq!(engine.store().manifest_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sharding_respects_max_items_per_job() {
    let engine = engine_with(
        MockProvider::new(),
        config().with_max_items_per_job(6),
    );
    let n = 16;

    let results = engine.run(prompts(n)).await.unwrap();

    assert_eq!(results.len(), n);
    assert_in_input_order(&results);
    // 16 items with a limit of 6 means three consecutive jobs.
    assert_eq!(engine.provider().submission_count(), 3);
    assert_eq!(engine.provider().job_members("job-1").len(), 6);
    assert_eq!(engine.provider().job_members("job-3").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_batch_wait() {
    let provider = MockProvider::new();
    let engine = engine_with(provider, config());
    engine
        .provider()
        .script_job_states("job-1", [JobState::Running]);

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        canceller.cancel();
    });

    let err = engine
        .run_with_cancel(prompts(12), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled));
    // The manifest survives; a rerun can re-attach.
    assert!(engine.store().manifest("job-1").is_some());
}
