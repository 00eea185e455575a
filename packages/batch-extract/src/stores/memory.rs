//! In-memory storage implementation for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::traits::store::CacheStore;
use crate::types::fingerprint::Fingerprint;
use crate::types::job::{BatchJob, CacheEntry, JobStatus};

/// In-memory cache store.
///
/// Useful for testing and development. Not suitable for production as
/// entries and manifests are lost on restart, which defeats resumability.
pub struct MemoryStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    manifests: RwLock<HashMap<String, BatchJob>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            manifests: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
        self.manifests.write().unwrap().clear();
    }

    /// Get the number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Get the number of stored manifests.
    pub fn manifest_count(&self) -> usize {
        self.manifests.read().unwrap().len()
    }

    /// Get a manifest by job id (for assertions in tests).
    pub fn manifest(&self, job_id: &str) -> Option<BatchJob> {
        self.manifests.read().unwrap().get(job_id).cloned()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> StoreResult<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap().get(fingerprint).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> StoreResult<()> {
        self.entries
            .write()
            .unwrap()
            .entry(entry.fingerprint.clone())
            .or_insert(entry);
        Ok(())
    }

    async fn list_missing(&self, fingerprints: &[Fingerprint]) -> StoreResult<Vec<Fingerprint>> {
        let entries = self.entries.read().unwrap();
        Ok(fingerprints
            .iter()
            .filter(|fp| !entries.contains_key(*fp))
            .cloned()
            .collect())
    }

    async fn record_manifest(&self, job: &BatchJob) -> StoreResult<()> {
        self.manifests
            .write()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_manifest(
        &self,
        fingerprints: &[Fingerprint],
    ) -> StoreResult<Option<BatchJob>> {
        let manifests = self.manifests.read().unwrap();
        Ok(manifests
            .values()
            .filter(|job| job.status.is_reattachable() && job.covers(fingerprints))
            .max_by_key(|job| job.submitted_at)
            .cloned())
    }

    async fn update_manifest_status(&self, job_id: &str, status: JobStatus) -> StoreResult<()> {
        if let Some(job) = self.manifests.write().unwrap().get_mut(job_id) {
            job.status = status;
        }
        Ok(())
    }
}
