//! Job polling: drive a batch job to a terminal state within a budget.
//!
//! The poll loop is a cooperative scheduled wait on the tokio clock (no
//! busy waiting, testable under a paused clock) and is cancellable. The
//! timeout budget is the only thing that cuts polling short of a terminal
//! provider status.

use indexmap::IndexMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, RunError};
use crate::pipeline::retry::retry_transient;
use crate::traits::provider::Provider;
use crate::traits::store::CacheStore;
use crate::types::config::RunConfig;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::ExtractionResult;
use crate::types::job::{BatchJob, CacheEntry, JobState, JobStatus};

/// Poll `job` until it reaches a terminal state or the deadline passes,
/// then collect its outputs.
///
/// On provider success every member's output is written to the store
/// (when caching is on) and returned in-memory; the job counts as
/// complete only once all members are written. On provider failure no
/// member entries are written. On a local timeout the manifest is marked
/// TIMEDOUT but stays re-attachable: the remote job may still finish, and
/// a later call can resume waiting instead of resubmitting.
pub async fn drive_job<P, S>(
    job: &mut BatchJob,
    provider: &P,
    store: Option<&S>,
    config: &RunConfig,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<IndexMap<Fingerprint, ExtractionResult>>
where
    P: Provider,
    S: CacheStore,
{
    let started = Instant::now();

    loop {
        if Instant::now() >= deadline {
            return timed_out(job, store, started).await;
        }

        let state = retry_transient(&config.retry, || provider.poll_status(&job.id)).await?;
        debug!(job_id = %job.id, state = ?state, "polled job status");

        match state {
            JobState::Succeeded => {
                return collect_outputs(job, provider, store, config).await;
            }
            JobState::Failed { message } => {
                set_status(job, store, JobStatus::Failed).await?;
                return Err(RunError::JobFailed {
                    job_id: job.id.clone(),
                    message,
                });
            }
            JobState::Pending => {}
            JobState::Running => {
                if job.status != JobStatus::Running {
                    set_status(job, store, JobStatus::Running).await?;
                }
            }
        }

        let now = Instant::now();
        let sleep_for = config.poll_interval().min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

/// Fetch a succeeded job's outputs and persist every member entry.
async fn collect_outputs<P, S>(
    job: &mut BatchJob,
    provider: &P,
    store: Option<&S>,
    config: &RunConfig,
) -> Result<IndexMap<Fingerprint, ExtractionResult>>
where
    P: Provider,
    S: CacheStore,
{
    let mut outputs = retry_transient(&config.retry, || provider.fetch_outputs(&job.id)).await?;

    let mut collected = IndexMap::with_capacity(job.members.len());
    let mut missing = 0usize;

    for fingerprint in &job.members {
        match outputs.swap_remove(fingerprint) {
            Some(result) => {
                if let Some(store) = store {
                    store
                        .put(CacheEntry::from_job(
                            fingerprint.clone(),
                            result.clone(),
                            &job.id,
                        ))
                        .await?;
                }
                collected.insert(fingerprint.clone(), result);
            }
            None => missing += 1,
        }
    }

    if missing > 0 {
        // Entries that did arrive are kept (the work is paid for), but the
        // job cannot count as complete.
        warn!(
            job_id = %job.id,
            missing,
            members = job.members.len(),
            "job outputs incomplete"
        );
        set_status(job, store, JobStatus::Failed).await?;
        return Err(RunError::JobFailed {
            job_id: job.id.clone(),
            message: format!(
                "outputs missing {missing} of {} members",
                job.members.len()
            ),
        });
    }

    set_status(job, store, JobStatus::Succeeded).await?;
    info!(job_id = %job.id, members = job.members.len(), "batch job complete");
    Ok(collected)
}

async fn timed_out<S>(
    job: &mut BatchJob,
    store: Option<&S>,
    started: Instant,
) -> Result<IndexMap<Fingerprint, ExtractionResult>>
where
    S: CacheStore,
{
    set_status(job, store, JobStatus::TimedOut).await?;
    warn!(job_id = %job.id, "local wait budget exhausted; job may still complete remotely");
    Err(RunError::PollTimeout {
        job_id: job.id.clone(),
        waited_secs: started.elapsed().as_secs(),
    })
}

async fn set_status<S>(job: &mut BatchJob, store: Option<&S>, status: JobStatus) -> Result<()>
where
    S: CacheStore,
{
    job.status = status;
    if let Some(store) = store {
        store.update_manifest_status(&job.id, status).await?;
    }
    Ok(())
}
