//! Batch submission: group uncached items into jobs and record manifests.

use indexmap::IndexSet;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, RunError};
use crate::traits::provider::{BatchMember, BatchRequest, Provider};
use crate::traits::store::CacheStore;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::{ModelParams, PromptItem};
use crate::types::job::BatchJob;

/// An uncached item paired with its fingerprint, ready for submission.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub item: PromptItem,
    pub fingerprint: Fingerprint,
}

/// Split pending items into shards no larger than the provider's job
/// limit. With no limit configured everything lands in one shard.
pub fn shard_items(pending: &[PendingItem], max_items_per_job: Option<usize>) -> Vec<Vec<PendingItem>> {
    match max_items_per_job {
        Some(max) if pending.len() > max => {
            pending.chunks(max).map(|chunk| chunk.to_vec()).collect()
        }
        _ => vec![pending.to_vec()],
    }
}

/// Submit one shard as a batch job and durably record its manifest.
///
/// The manifest is written immediately after submission succeeds and
/// before any polling, so a crashed caller can rediscover the job. A
/// submission failure writes no manifest: a rerun then safely retries
/// the submission.
pub async fn submit_shard<P, S>(
    shard: &[PendingItem],
    params: &ModelParams,
    provider: &P,
    store: Option<&S>,
) -> Result<BatchJob>
where
    P: Provider,
    S: CacheStore,
{
    let members: Vec<BatchMember> = shard
        .iter()
        .map(|pending| BatchMember {
            fingerprint: pending.fingerprint.clone(),
            prompt: pending.item.prompt.clone(),
        })
        .collect();

    let request = BatchRequest {
        display_name: display_name(),
        params: params.clone(),
        members,
    };

    let job_id = provider
        .submit_batch(request)
        .await
        .map_err(RunError::Submission)?;

    let member_set: IndexSet<Fingerprint> = shard
        .iter()
        .map(|pending| pending.fingerprint.clone())
        .collect();

    let job = BatchJob::new(job_id, member_set);
    info!(job_id = %job.id, members = job.members.len(), "batch job submitted");

    if let Some(store) = store {
        store.record_manifest(&job).await?;
    }

    Ok(job)
}

/// Unique, provider-safe job display name.
fn display_name() -> String {
    format!("extract-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(n: usize) -> Vec<PendingItem> {
        (0..n)
            .map(|i| PendingItem {
                item: PromptItem::new(i, format!("prompt {i}")),
                fingerprint: Fingerprint::from_hex(format!("fp{i}")),
            })
            .collect()
    }

    #[test]
    fn test_no_limit_single_shard() {
        let shards = shard_items(&pending(100), None);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 100);
    }

    #[test]
    fn test_limit_splits_into_consecutive_shards() {
        let shards = shard_items(&pending(10), Some(4));
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].len(), 4);
        assert_eq!(shards[2].len(), 2);
        // Order is preserved across shards.
        assert_eq!(shards[1][0].item.index, 4);
    }

    #[test]
    fn test_limit_larger_than_input_single_shard() {
        let shards = shard_items(&pending(3), Some(10));
        assert_eq!(shards.len(), 1);
    }

    #[test]
    fn test_display_names_are_unique_and_safe() {
        let a = display_name();
        let b = display_name();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}
