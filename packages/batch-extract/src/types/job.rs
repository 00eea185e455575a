//! Batch job records and cache entries.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::types::fingerprint::Fingerprint;
use crate::types::item::ExtractionResult;

/// Persisted status of a batch job manifest.
///
/// `Succeeded`, `Failed` and `TimedOut` are terminal for the call that
/// observed them, but `TimedOut` is a local verdict: the remote job may
/// still be running, so such manifests remain eligible for re-attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Whether a later call may resume polling this job instead of
    /// resubmitting its members.
    pub fn is_reattachable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::TimedOut)
    }

    /// String form used by persistent stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMEDOUT",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "TIMEDOUT" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

/// Job state as reported by the provider.
///
/// Separate from [`JobStatus`]: the provider never reports a local timeout,
/// and failure carries the provider's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
}

/// A provider-side grouped asynchronous unit of work, tracked to a
/// terminal status.
///
/// The member set is fixed at submission and never mutated; it is recorded
/// durably (the manifest) before the job completes so a crashed caller can
/// discover and await the job instead of resubmitting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Provider job identifier.
    pub id: String,

    /// Last known status.
    pub status: JobStatus,

    /// Ordered member fingerprints, in submission order.
    pub members: IndexSet<Fingerprint>,

    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl BatchJob {
    /// Create a freshly submitted job record.
    pub fn new(id: impl Into<String>, members: IndexSet<Fingerprint>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            members,
            submitted_at: Utc::now(),
        }
    }

    /// Whether this manifest's members cover every given fingerprint.
    pub fn covers(&self, fingerprints: &[Fingerprint]) -> bool {
        fingerprints.iter().all(|fp| self.members.contains(fp))
    }
}

/// Where a cached result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "job_id")]
pub enum ResultOrigin {
    /// Produced by a synchronous per-item call.
    Realtime,
    /// Produced by the named batch job.
    Job(String),
}

/// A completed, persisted result keyed by fingerprint.
///
/// Write-once: results are a pure function of their fingerprint, so a
/// second write for the same key is assumed identical and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The fingerprint this entry belongs to.
    pub fingerprint: Fingerprint,

    /// The extraction result payload.
    pub result: ExtractionResult,

    /// Owning job id, or realtime.
    pub origin: ResultOrigin,

    /// When the result was completed and stored.
    pub completed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry for a result produced by the realtime path.
    pub fn realtime(fingerprint: Fingerprint, result: ExtractionResult) -> Self {
        Self {
            fingerprint,
            result,
            origin: ResultOrigin::Realtime,
            completed_at: Utc::now(),
        }
    }

    /// Entry for a result fetched from a batch job's outputs.
    pub fn from_job(
        fingerprint: Fingerprint,
        result: ExtractionResult,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint,
            result,
            origin: ResultOrigin::Job(job_id.into()),
            completed_at: Utc::now(),
        }
    }
}
