//! The Engine - main entry point for orchestrated extraction runs.
//!
//! The engine owns the routing decision, the cache delta, both execution
//! paths, and the final order-restoring merge. All resumability state
//! lives in the cache store: nothing here assumes a prior run's memory
//! survived a crash.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;

use futures::future::join_all;
use governor::{Quota, RateLimiter};
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, RunError};
use crate::pipeline::merge::merge_results;
use crate::pipeline::poll::drive_job;
use crate::pipeline::retry::retry_transient;
use crate::pipeline::router::{route, Route};
use crate::pipeline::submit::{shard_items, submit_shard, PendingItem};
use crate::traits::provider::Provider;
use crate::traits::store::CacheStore;
use crate::types::config::RunConfig;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::{ExtractionResult, ModelParams, PromptItem};
use crate::types::job::CacheEntry;

/// The main entry point - submits a workload through the realtime or
/// batch path and returns results in input order.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::with_config(store, provider, params, config);
///
/// let items = PromptItem::from_prompts(prompts);
/// let results = engine.run(items).await?;
///
/// // A rerun after any failure is safe: only work missing from the
/// // cache is resubmitted.
/// ```
pub struct Engine<S: CacheStore, P: Provider> {
    store: S,
    provider: P,
    params: ModelParams,
    config: RunConfig,
}

impl<S: CacheStore, P: Provider> Engine<S, P> {
    /// Create a new engine with default configuration.
    pub fn new(store: S, provider: P, params: ModelParams) -> Self {
        Self {
            store,
            provider,
            params,
            config: RunConfig::default(),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(store: S, provider: P, params: ModelParams, config: RunConfig) -> Self {
        Self {
            store,
            provider,
            params,
            config,
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run a workload to completion.
    ///
    /// Returns one result per input item, in input order, regardless of
    /// which path produced each element.
    pub async fn run(&self, items: Vec<PromptItem>) -> Result<Vec<ExtractionResult>> {
        self.run_inner(&items, &CancellationToken::new()).await
    }

    /// Run with cancellation support.
    pub async fn run_with_cancel(
        &self,
        items: Vec<PromptItem>,
        cancel: CancellationToken,
    ) -> Result<Vec<ExtractionResult>> {
        tokio::select! {
            result = self.run_inner(&items, &cancel) => result,
            _ = cancel.cancelled() => Err(RunError::Cancelled),
        }
    }

    async fn run_inner(
        &self,
        items: &[PromptItem],
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractionResult>> {
        // Fail fast, before any network or storage activity.
        self.config.validate()?;

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let fingerprints: Vec<Fingerprint> = items
            .iter()
            .map(|item| Fingerprint::compute(item, &self.params))
            .collect::<Result<_>>()?;

        let pending = self.pending_items(items, &fingerprints).await?;
        debug!(
            total = items.len(),
            missing = pending.len(),
            "cache delta computed"
        );

        let (realtime, batch) = match route(items.len(), &self.config) {
            Route::Realtime => {
                let by_fp = self.run_realtime(&pending).await?;
                (self.spread_by_index(items, &fingerprints, by_fp), IndexMap::new())
            }
            Route::Batch => (HashMap::new(), self.run_batch(pending, cancel).await?),
        };

        merge_results(items, &fingerprints, &realtime, &batch, self.cache_store()).await
    }

    /// The store, when caching is enabled.
    fn cache_store(&self) -> Option<&S> {
        self.config.enable_caching.then_some(&self.store)
    }

    /// Items whose fingerprints are not yet cached, deduplicated so each
    /// fingerprint becomes exactly one unit of work.
    async fn pending_items(
        &self,
        items: &[PromptItem],
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<PendingItem>> {
        let missing: HashSet<Fingerprint> = match self.cache_store() {
            Some(store) => store
                .list_missing(fingerprints)
                .await?
                .into_iter()
                .collect(),
            None => fingerprints.iter().cloned().collect(),
        };

        let mut seen = HashSet::new();
        Ok(items
            .iter()
            .zip(fingerprints)
            .filter(|(_, fp)| missing.contains(*fp) && seen.insert((*fp).clone()))
            .map(|(item, fp)| PendingItem {
                item: item.clone(),
                fingerprint: fp.clone(),
            })
            .collect())
    }

    /// Fan fingerprint-keyed results back out to every input position
    /// that shares the fingerprint.
    fn spread_by_index(
        &self,
        items: &[PromptItem],
        fingerprints: &[Fingerprint],
        by_fp: HashMap<Fingerprint, ExtractionResult>,
    ) -> HashMap<usize, ExtractionResult> {
        items
            .iter()
            .zip(fingerprints)
            .filter_map(|(item, fp)| {
                by_fp.get(fp).map(|result| (item.index, result.clone()))
            })
            .collect()
    }

    /// Realtime path: a bounded pool of concurrent workers.
    ///
    /// Completion order across workers is unconstrained; results are
    /// keyed by fingerprint and reassembled by the merger. Successful
    /// results are cached even when sibling workers fail, so a rerun
    /// re-pays only for the failures.
    async fn run_realtime(
        &self,
        pending: &[PendingItem],
    ) -> Result<HashMap<Fingerprint, ExtractionResult>> {
        if pending.is_empty() {
            return Ok(HashMap::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.realtime_concurrency));
        let limiter = self
            .config
            .realtime_rps
            .and_then(NonZeroU32::new)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        let futures = pending.iter().map(|p| {
            let semaphore = semaphore.clone();
            let limiter = limiter.clone();
            async move {
                let _permit = semaphore.acquire().await.unwrap();
                if let Some(limiter) = &limiter {
                    limiter.until_ready().await;
                }
                let result = retry_transient(&self.config.retry, || {
                    self.provider.submit_realtime(&p.item, &self.params)
                })
                .await;
                (p, result)
            }
        });

        let completed = join_all(futures).await;

        let mut by_fp = HashMap::with_capacity(completed.len());
        let mut first_err = None;
        for (p, result) in completed {
            match result {
                Ok(result) => {
                    if let Some(store) = self.cache_store() {
                        store
                            .put(CacheEntry::realtime(p.fingerprint.clone(), result.clone()))
                            .await?;
                    }
                    by_fp.insert(p.fingerprint.clone(), result);
                }
                Err(e) => {
                    warn!(index = p.item.index, error = %e, "realtime extraction failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_err {
            return Err(RunError::Provider(e));
        }

        info!(items = by_fp.len(), "realtime extraction complete");
        Ok(by_fp)
    }

    /// Batch path: re-attach to an in-flight job when one covers the
    /// missing work, otherwise submit and drive new jobs one at a time.
    async fn run_batch(
        &self,
        pending: Vec<PendingItem>,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<Fingerprint, ExtractionResult>> {
        let mut outputs = IndexMap::new();
        if pending.is_empty() {
            return Ok(outputs);
        }

        let store = self.cache_store();
        if store.is_none() {
            warn!(
                "batch path running with caching disabled; a failure or timeout \
                 will re-pay for the whole job on rerun"
            );
        }

        // One shared wait budget for the whole call.
        let deadline = Instant::now() + self.config.timeout();

        let missing_fps: Vec<Fingerprint> =
            pending.iter().map(|p| p.fingerprint.clone()).collect();

        if let Some(store) = store {
            if let Some(mut job) = store.find_manifest(&missing_fps).await? {
                info!(job_id = %job.id, "re-attaching to in-flight batch job");
                let fetched = drive_job(
                    &mut job,
                    &self.provider,
                    Some(store),
                    &self.config,
                    deadline,
                    cancel,
                )
                .await?;
                outputs.extend(fetched);
                return Ok(outputs);
            }
        }

        for shard in shard_items(&pending, self.config.max_items_per_job) {
            let mut job = submit_shard(&shard, &self.params, &self.provider, store).await?;
            let fetched = drive_job(
                &mut job,
                &self.provider,
                store,
                &self.config,
                deadline,
                cancel,
            )
            .await?;
            outputs.extend(fetched);
        }

        Ok(outputs)
    }
}
