//! Cache store trait: the single source of truth for resumability.
//!
//! Entries are immutable once written and `put` is idempotent, so the
//! store is safe under concurrent duplicate writers with no extra locking.
//! A backend failure always propagates; treating it as a cache miss would
//! silently re-pay for completed work.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::fingerprint::Fingerprint;
use crate::types::job::{BatchJob, CacheEntry, JobStatus};

/// Persisted mapping from fingerprint to completed result, plus the job
/// manifests that make in-flight work discoverable across restarts.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the entry for a fingerprint, if completed.
    async fn lookup(&self, fingerprint: &Fingerprint) -> StoreResult<Option<CacheEntry>>;

    /// Store a completed entry. First writer wins: if an entry already
    /// exists for the key, the call is a no-op.
    async fn put(&self, entry: CacheEntry) -> StoreResult<()>;

    /// Fingerprints from the given set that have no entry yet, preserving
    /// input order.
    async fn list_missing(&self, fingerprints: &[Fingerprint]) -> StoreResult<Vec<Fingerprint>> {
        let mut missing = Vec::new();
        for fingerprint in fingerprints {
            if self.lookup(fingerprint).await?.is_none() {
                missing.push(fingerprint.clone());
            }
        }
        Ok(missing)
    }

    /// Durably associate a job with its member fingerprints. Called at
    /// submission time, before the job completes, so a crashed or
    /// restarted caller can discover and await the job instead of
    /// resubmitting it.
    async fn record_manifest(&self, job: &BatchJob) -> StoreResult<()>;

    /// Most recently submitted re-attachable manifest whose member set
    /// covers every given fingerprint.
    async fn find_manifest(&self, fingerprints: &[Fingerprint])
        -> StoreResult<Option<BatchJob>>;

    /// Record an observed status transition for a job.
    async fn update_manifest_status(&self, job_id: &str, status: JobStatus) -> StoreResult<()>;
}
