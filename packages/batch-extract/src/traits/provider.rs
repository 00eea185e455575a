//! Provider trait for LLM service calls.
//!
//! The trait abstracts the four network operations the orchestration layer
//! needs: one realtime request, one bulk submission, one status poll, and
//! one output fetch. Implementations wrap specific providers and own the
//! wire formats; nothing here knows about HTTP.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::ProviderResult;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::{ExtractionResult, ModelParams, PromptItem};
use crate::types::job::JobState;

/// One member of a batch request: a prompt keyed by its fingerprint.
///
/// The fingerprint travels with the prompt so the provider adapter can key
/// the job's outputs without recomputing hashes.
#[derive(Debug, Clone)]
pub struct BatchMember {
    /// Cache key for this prompt under the request's parameters.
    pub fingerprint: Fingerprint,

    /// Fully constructed prompt text.
    pub prompt: String,
}

/// A bulk submission request covering many prompts.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Unique, provider-safe display name for the job.
    pub display_name: String,

    /// Model parameters shared by every member.
    pub params: ModelParams,

    /// Members in submission order.
    pub members: Vec<BatchMember>,
}

/// Provider client trait.
///
/// Implementations wrap a specific LLM service (Gemini, Vertex, etc.) and
/// handle request construction and response parsing.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Issue one synchronous extraction request.
    async fn submit_realtime(
        &self,
        item: &PromptItem,
        params: &ModelParams,
    ) -> ProviderResult<ExtractionResult>;

    /// Submit one asynchronous bulk job. Returns the provider job id.
    async fn submit_batch(&self, request: BatchRequest) -> ProviderResult<String>;

    /// Query the current state of a job.
    async fn poll_status(&self, job_id: &str) -> ProviderResult<JobState>;

    /// Fetch the per-member outputs of a succeeded job, keyed by
    /// fingerprint. Delivery order is unconstrained.
    async fn fetch_outputs(
        &self,
        job_id: &str,
    ) -> ProviderResult<IndexMap<Fingerprint, ExtractionResult>>;
}
