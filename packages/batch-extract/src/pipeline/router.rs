//! Execution path selection.

use crate::types::config::RunConfig;

/// Which path a workload takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Synchronous per-item calls through the bounded worker pool.
    Realtime,
    /// One asynchronous bulk job, polled to completion.
    Batch,
}

/// Choose the execution path for a workload.
///
/// Pure decision on the full input count: the batch path is taken only
/// when it is enabled and the workload reaches the threshold. The cache
/// delta later limits what is actually submitted on either path.
pub fn route(item_count: usize, config: &RunConfig) -> Route {
    if !config.enabled || item_count < config.threshold {
        Route::Realtime
    } else {
        Route::Batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, threshold: usize) -> RunConfig {
        RunConfig::default()
            .with_enabled(enabled)
            .with_threshold(threshold)
    }

    #[test]
    fn test_boundary_below_threshold_is_realtime() {
        assert_eq!(route(49, &config(true, 50)), Route::Realtime);
    }

    #[test]
    fn test_boundary_at_threshold_is_batch() {
        assert_eq!(route(50, &config(true, 50)), Route::Batch);
        assert_eq!(route(51, &config(true, 50)), Route::Batch);
    }

    #[test]
    fn test_disabled_always_realtime() {
        assert_eq!(route(10_000, &config(false, 50)), Route::Realtime);
    }

    #[test]
    fn test_zero_items_realtime() {
        assert_eq!(route(0, &config(true, 50)), Route::Realtime);
    }
}
