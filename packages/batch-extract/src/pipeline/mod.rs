//! Orchestration pipeline: routing, submission, polling, and merging.

pub mod engine;
pub mod merge;
pub mod poll;
pub mod retry;
pub mod router;
pub mod submit;

pub use engine::Engine;
pub use merge::merge_results;
pub use poll::drive_job;
pub use retry::retry_transient;
pub use router::{route, Route};
pub use submit::{shard_items, submit_shard, PendingItem};
