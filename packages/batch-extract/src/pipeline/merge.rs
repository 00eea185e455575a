//! Result merging: reassemble outputs in original input order.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Result, RunError};
use crate::traits::store::CacheStore;
use crate::types::fingerprint::Fingerprint;
use crate::types::item::{ExtractionResult, PromptItem};

/// Resolve one result per input item, in input order.
///
/// Resolution order per item: the realtime results from this call, then
/// the batch outputs fetched by this call, then the cache store. The
/// output is structurally identical regardless of which source produced
/// each element. Any unresolved fingerprint is a contract violation: the
/// call fails as incomplete rather than returning a partial or misordered
/// list.
pub async fn merge_results<S>(
    items: &[PromptItem],
    fingerprints: &[Fingerprint],
    realtime: &HashMap<usize, ExtractionResult>,
    batch: &IndexMap<Fingerprint, ExtractionResult>,
    store: Option<&S>,
) -> Result<Vec<ExtractionResult>>
where
    S: CacheStore,
{
    debug_assert_eq!(items.len(), fingerprints.len());

    let mut merged = Vec::with_capacity(items.len());
    let mut missing = 0usize;

    for (item, fingerprint) in items.iter().zip(fingerprints) {
        if let Some(result) = realtime.get(&item.index) {
            merged.push(result.clone());
        } else if let Some(result) = batch.get(fingerprint) {
            merged.push(result.clone());
        } else if let Some(store) = store {
            match store.lookup(fingerprint).await? {
                Some(entry) => merged.push(entry.result),
                None => missing += 1,
            }
        } else {
            missing += 1;
        }
    }

    if missing > 0 {
        return Err(RunError::Incomplete {
            missing,
            total: items.len(),
        });
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::job::CacheEntry;
    use proptest::prelude::*;
    use serde_json::json;

    fn fp(i: usize) -> Fingerprint {
        Fingerprint::from_hex(format!("fp{i}"))
    }

    fn result(i: usize) -> ExtractionResult {
        ExtractionResult::new(json!({ "item": i }))
    }

    fn inputs(n: usize) -> (Vec<PromptItem>, Vec<Fingerprint>) {
        let items = (0..n).map(|i| PromptItem::new(i, format!("p{i}"))).collect();
        let fps = (0..n).map(fp).collect();
        (items, fps)
    }

    #[tokio::test]
    async fn test_merges_across_sources_in_input_order() {
        let (items, fps) = inputs(3);

        // Item 0 realtime, item 1 batch, item 2 cached.
        let realtime = HashMap::from([(0, result(0))]);
        let batch = IndexMap::from([(fp(1), result(1))]);
        let store = MemoryStore::new();
        store
            .put(CacheEntry::realtime(fp(2), result(2)))
            .await
            .unwrap();

        let merged = merge_results(&items, &fps, &realtime, &batch, Some(&store))
            .await
            .unwrap();

        assert_eq!(merged.len(), 3);
        for (i, r) in merged.iter().enumerate() {
            assert_eq!(r.payload["item"], i);
        }
    }

    #[tokio::test]
    async fn test_unresolved_fingerprint_is_incomplete() {
        let (items, fps) = inputs(3);
        let realtime = HashMap::from([(0, result(0))]);
        let batch = IndexMap::new();
        let store = MemoryStore::new();

        let err = merge_results(&items, &fps, &realtime, &batch, Some(&store))
            .await
            .unwrap_err();

        match err {
            RunError::Incomplete { missing, total } => {
                assert_eq!(missing, 2);
                assert_eq!(total, 3);
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (items, fps) = inputs(1);
        let store = crate::testing::UnavailableStore;

        let err = merge_results(&items, &fps, &HashMap::new(), &IndexMap::new(), Some(&store))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Storage(_)));
    }

    proptest! {
        // Batch outputs arrive in arbitrary order; merged output always
        // follows input order.
        #[test]
        fn prop_order_restored_for_any_delivery_permutation(
            n in 1usize..40,
            seed in any::<u64>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let (items, fps) = inputs(n);

                // Deterministic shuffle of delivery order from the seed.
                let mut order: Vec<usize> = (0..n).collect();
                let mut state = seed;
                for i in (1..n).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                    let j = (state >> 33) as usize % (i + 1);
                    order.swap(i, j);
                }

                let mut batch = IndexMap::new();
                for &i in &order {
                    batch.insert(fp(i), result(i));
                }

                let merged = merge_results::<MemoryStore>(
                    &items,
                    &fps,
                    &HashMap::new(),
                    &batch,
                    None,
                )
                .await
                .unwrap();

                assert_eq!(merged.len(), n);
                for (i, r) in merged.iter().enumerate() {
                    assert_eq!(r.payload["item"], i);
                }
            });
        }
    }
}
