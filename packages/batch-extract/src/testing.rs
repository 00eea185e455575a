//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the orchestration
//! layer without making real provider or network calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;

use crate::error::{ProviderError, ProviderResult, StoreError, StoreResult};
use crate::traits::provider::{BatchRequest, Provider};
use crate::traits::store::CacheStore;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::{ExtractionResult, ModelParams, PromptItem};
use crate::types::job::{BatchJob, CacheEntry, JobState, JobStatus};

/// The deterministic result the mock produces for a prompt.
///
/// Identical for the realtime and batch paths, so merged outputs are
/// structurally indistinguishable across paths.
pub fn canned_result(prompt: &str) -> ExtractionResult {
    ExtractionResult::new(json!({ "extraction": prompt }))
}

/// Record of a call made to the mock provider.
#[derive(Debug, Clone)]
pub enum MockProviderCall {
    Realtime { prompt: String },
    SubmitBatch { members: usize },
    PollStatus { job_id: String },
    FetchOutputs { job_id: String },
}

/// A mock provider for testing.
///
/// Returns deterministic, configurable responses for all provider
/// operations, with failure injection and call tracking. Submitted jobs
/// get sequential ids (`job-1`, `job-2`, ...) so tests can script their
/// status sequences up front.
#[derive(Default)]
pub struct MockProvider {
    /// Predefined realtime results by prompt
    realtime_results: Arc<RwLock<HashMap<String, ExtractionResult>>>,

    /// Prompts whose realtime calls fail permanently
    fail_realtime: Arc<RwLock<HashSet<String>>>,

    /// Prompts whose realtime calls fail transiently N times, then succeed
    transient_failures: Arc<RwLock<HashMap<String, u32>>>,

    /// Whether batch submission fails
    fail_submission: Arc<RwLock<bool>>,

    /// Job members by job id (fingerprint plus prompt when known)
    jobs: Arc<RwLock<HashMap<String, Vec<(Fingerprint, Option<String>)>>>>,

    /// Scripted status sequences by job id; the last state repeats
    job_states: Arc<RwLock<HashMap<String, VecDeque<JobState>>>>,

    /// Fingerprints withheld from job outputs
    withheld: Arc<RwLock<HashSet<Fingerprint>>>,

    /// Deliver job outputs in reverse member order
    reverse_outputs: Arc<RwLock<bool>>,

    /// Sequential job id counter
    next_job: Arc<AtomicUsize>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockProviderCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with default behavior: realtime calls
    /// succeed with [`canned_result`], submitted jobs succeed on the
    /// first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined realtime result for a prompt.
    pub fn with_realtime_result(self, prompt: impl Into<String>, result: ExtractionResult) -> Self {
        self.realtime_results
            .write()
            .unwrap()
            .insert(prompt.into(), result);
        self
    }

    /// Mark a prompt's realtime call as permanently failing.
    pub fn fail_realtime(self, prompt: impl Into<String>) -> Self {
        self.fail_realtime.write().unwrap().insert(prompt.into());
        self
    }

    /// Make a prompt's realtime call fail transiently `times` times
    /// before succeeding.
    pub fn fail_realtime_transient(self, prompt: impl Into<String>, times: u32) -> Self {
        self.transient_failures
            .write()
            .unwrap()
            .insert(prompt.into(), times);
        self
    }

    /// Make batch submission fail.
    pub fn fail_submission(self) -> Self {
        self.set_fail_submission(true);
        self
    }

    /// Pre-register a job by id with fingerprint-only members (for
    /// driving the poller against a job this process never submitted).
    pub fn with_job(
        self,
        job_id: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let members = members
            .into_iter()
            .map(|fp| (Fingerprint::from_hex(fp.into()), None))
            .collect();
        self.jobs.write().unwrap().insert(job_id.into(), members);
        self
    }

    /// Script the status sequence for a job. The final state repeats on
    /// later polls.
    pub fn with_job_states(
        self,
        job_id: impl Into<String>,
        states: impl IntoIterator<Item = JobState>,
    ) -> Self {
        self.script_job_states(job_id, states);
        self
    }

    /// Re-script a job's status sequence mid-test (e.g. the remote job
    /// finished between two calls).
    pub fn script_job_states(
        &self,
        job_id: impl Into<String>,
        states: impl IntoIterator<Item = JobState>,
    ) {
        self.job_states
            .write()
            .unwrap()
            .insert(job_id.into(), states.into_iter().collect());
    }

    /// Toggle submission failure mid-test.
    pub fn set_fail_submission(&self, fail: bool) {
        *self.fail_submission.write().unwrap() = fail;
    }

    /// Clear permanent realtime failure injection.
    pub fn clear_realtime_failures(&self) {
        self.fail_realtime.write().unwrap().clear();
    }

    /// Withhold one fingerprint from every job's outputs.
    pub fn withhold_output(self, fingerprint: impl Into<String>) -> Self {
        self.withheld
            .write()
            .unwrap()
            .insert(Fingerprint::from_hex(fingerprint.into()));
        self
    }

    /// Deliver job outputs in reverse member order.
    pub fn deliver_outputs_reversed(self) -> Self {
        *self.reverse_outputs.write().unwrap() = true;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockProviderCall> {
        self.calls.read().unwrap().clone()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Number of realtime calls made.
    pub fn realtime_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockProviderCall::Realtime { .. }))
            .count()
    }

    /// Number of batch submissions made.
    pub fn submission_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockProviderCall::SubmitBatch { .. }))
            .count()
    }

    /// Number of status polls for a job.
    pub fn poll_count(&self, job_id: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockProviderCall::PollStatus { job_id: id } if id == job_id))
            .count()
    }

    /// Paid network operations: realtime calls plus batch submissions.
    /// Status polls and output fetches are tracked separately.
    pub fn network_ops(&self) -> usize {
        self.realtime_count() + self.submission_count()
    }

    /// Member fingerprints of a submitted or registered job.
    pub fn job_members(&self, job_id: &str) -> Vec<Fingerprint> {
        self.jobs
            .read()
            .unwrap()
            .get(job_id)
            .map(|members| members.iter().map(|(fp, _)| fp.clone()).collect())
            .unwrap_or_default()
    }

    fn result_for(&self, fingerprint: &Fingerprint, prompt: Option<&str>) -> ExtractionResult {
        match prompt {
            Some(prompt) => self.realtime_result(prompt),
            // Fingerprint-only members (jobs this process never built).
            None => ExtractionResult::new(json!({ "extraction": fingerprint.as_str() })),
        }
    }

    fn realtime_result(&self, prompt: &str) -> ExtractionResult {
        self.realtime_results
            .read()
            .unwrap()
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| canned_result(prompt))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn submit_realtime(
        &self,
        item: &PromptItem,
        _params: &ModelParams,
    ) -> ProviderResult<ExtractionResult> {
        self.calls.write().unwrap().push(MockProviderCall::Realtime {
            prompt: item.prompt.clone(),
        });

        if self.fail_realtime.read().unwrap().contains(&item.prompt) {
            return Err(ProviderError::Request(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "mock permanent failure",
            ))));
        }

        {
            let mut transient = self.transient_failures.write().unwrap();
            if let Some(remaining) = transient.get_mut(&item.prompt) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::RateLimited("mock 429".into()));
                }
            }
        }

        Ok(self.realtime_result(&item.prompt))
    }

    async fn submit_batch(&self, request: BatchRequest) -> ProviderResult<String> {
        self.calls
            .write()
            .unwrap()
            .push(MockProviderCall::SubmitBatch {
                members: request.members.len(),
            });

        if *self.fail_submission.read().unwrap() {
            return Err(ProviderError::Unavailable("mock submission outage".into()));
        }

        let id = format!("job-{}", self.next_job.fetch_add(1, Ordering::SeqCst) + 1);
        let members = request
            .members
            .into_iter()
            .map(|m| (m.fingerprint, Some(m.prompt)))
            .collect();
        self.jobs.write().unwrap().insert(id.clone(), members);
        Ok(id)
    }

    async fn poll_status(&self, job_id: &str) -> ProviderResult<JobState> {
        self.calls
            .write()
            .unwrap()
            .push(MockProviderCall::PollStatus {
                job_id: job_id.to_string(),
            });

        if !self.jobs.read().unwrap().contains_key(job_id) {
            return Err(ProviderError::UnknownJob(job_id.to_string()));
        }

        let mut states = self.job_states.write().unwrap();
        match states.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) => Ok(queue.front().cloned().unwrap_or(JobState::Succeeded)),
            // Unscripted jobs succeed immediately.
            None => Ok(JobState::Succeeded),
        }
    }

    async fn fetch_outputs(
        &self,
        job_id: &str,
    ) -> ProviderResult<IndexMap<Fingerprint, ExtractionResult>> {
        self.calls
            .write()
            .unwrap()
            .push(MockProviderCall::FetchOutputs {
                job_id: job_id.to_string(),
            });

        let members = self
            .jobs
            .read()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownJob(job_id.to_string()))?;

        let withheld = self.withheld.read().unwrap();
        let mut outputs: IndexMap<Fingerprint, ExtractionResult> = members
            .iter()
            .filter(|(fp, _)| !withheld.contains(fp))
            .map(|(fp, prompt)| (fp.clone(), self.result_for(fp, prompt.as_deref())))
            .collect();

        if *self.reverse_outputs.read().unwrap() {
            outputs.reverse();
        }

        Ok(outputs)
    }
}

/// A cache store whose backend is unreachable.
///
/// Every operation fails with [`StoreError::Unavailable`], for asserting
/// that storage outages abort the call instead of silently degrading to
/// cache misses.
pub struct UnavailableStore;

fn outage() -> StoreError {
    StoreError::Unavailable(Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "mock storage outage",
    )))
}

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn lookup(&self, _fingerprint: &Fingerprint) -> StoreResult<Option<CacheEntry>> {
        Err(outage())
    }

    async fn put(&self, _entry: CacheEntry) -> StoreResult<()> {
        Err(outage())
    }

    async fn record_manifest(&self, _job: &BatchJob) -> StoreResult<()> {
        Err(outage())
    }

    async fn find_manifest(
        &self,
        _fingerprints: &[Fingerprint],
    ) -> StoreResult<Option<BatchJob>> {
        Err(outage())
    }

    async fn update_manifest_status(&self, _job_id: &str, _status: JobStatus) -> StoreResult<()> {
        Err(outage())
    }
}
