//! Typed errors for the orchestration layer.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Each variant of [`RunError`]
//! is distinguishable so a caller can decide between "fix configuration and
//! retry" and "simply rerun, it is safe and will resume".

use thiserror::Error;

/// Errors that can occur during an orchestrated extraction run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Invalid or conflicting configuration. Raised before any network
    /// activity.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Credential or identity failure.
    #[error("authentication error: {reason}")]
    Auth { reason: String },

    /// Cache backend failed. Terminal for the whole call when caching is
    /// enabled: a silent fallback to "cache miss" would hide unbounded
    /// resubmission cost.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The batch job could not be created. No manifest was written, so a
    /// rerun safely retries submission.
    #[error("batch submission failed: {0}")]
    Submission(#[source] ProviderError),

    /// Realtime call or other provider interaction failed after retries.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The remote job terminated in error. Members of the job are not
    /// cached; a rerun resubmits only what is still missing.
    #[error("batch job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// The local wait budget ran out before the job reached a terminal
    /// state. The remote job may still complete; the manifest is left
    /// intact so a later call can re-attach.
    #[error("timed out after {waited_secs}s waiting for batch job {job_id}")]
    PollTimeout { job_id: String, waited_secs: u64 },

    /// A fingerprint was unresolved at merge time. The run never returns a
    /// partial or misordered list.
    #[error("incomplete results: {missing} of {total} items unresolved")]
    Incomplete { missing: usize, total: usize },

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// JSON serialization error (fingerprinting or payload handling).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunError {
    /// Whether a plain rerun of the same input is a safe response to this
    /// error. Cached results and manifests make the rerun cheap; the
    /// alternative errors need a configuration or environment fix first.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::PollTimeout { .. }
                | Self::JobFailed { .. }
                | Self::Incomplete { .. }
                | Self::Cancelled
        )
    }
}

/// Errors from the cache storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store cannot be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted record could not be decoded.
    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Serialization of an entry or manifest failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the provider collaborator.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credential rejected by the provider.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider rejected the request rate; transient.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider temporarily unavailable (5xx, overload); transient.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Request failed for a non-transient reason.
    #[error("request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The provider response could not be interpreted.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The provider does not know the referenced job.
    #[error("unknown job: {0}")]
    UnknownJob(String),
}

impl ProviderError {
    /// Transient errors are retried with backoff; everything else
    /// propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, RunError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
