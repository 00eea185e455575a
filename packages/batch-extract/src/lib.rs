//! Bulk LLM Extraction Orchestration Library
//!
//! An orchestration and caching layer for submitting large numbers of
//! structured-extraction prompts to a remote LLM service. Small workloads
//! go through synchronous per-item calls; large workloads go through the
//! provider's asynchronous bulk path, which is cheaper but slower,
//! tolerant of partial failure, and resumable across process restarts.
//!
//! # Design Philosophy
//!
//! **"Pay for each prompt once"**
//!
//! - Every unit of work is a pure function of its content fingerprint
//! - Completed results persist; reruns resubmit only what is missing
//! - In-flight jobs are discoverable via durable manifests
//! - Output order always equals input order, whichever path ran
//! - Library handles orchestration mechanics, collaborators handle
//!   prompts and wire formats
//!
//! # Usage
//!
//! ```rust,ignore
//! use batch_extract::{Engine, MemoryStore, ModelParams, PromptItem, RunConfig};
//! use batch_extract::testing::MockProvider;
//!
//! let store = MemoryStore::new();
//! let provider = MockProvider::new();
//! let params = ModelParams::new("gemini-2.5-flash");
//! let config = RunConfig::default().with_enabled(true).with_threshold(50);
//!
//! let engine = Engine::with_config(store, provider, params, config);
//!
//! let items = PromptItem::from_prompts(prompts);
//! let results = engine.run(items).await?;
//! assert_eq!(results.len(), prompts.len());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Provider, CacheStore)
//! - [`types`] - Data model (items, fingerprints, jobs, config)
//! - [`pipeline`] - Routing, submission, polling, and merging
//! - [`stores`] - Storage implementations (MemoryStore, etc.)
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{ProviderError, Result, RunError, StoreError};
pub use traits::{
    provider::{BatchMember, BatchRequest, Provider},
    store::CacheStore,
};
pub use types::{
    config::{Namespace, RetryPolicy, RunConfig},
    fingerprint::Fingerprint,
    item::{ExtractionResult, ModelParams, PromptItem},
    job::{BatchJob, CacheEntry, JobState, JobStatus, ResultOrigin},
};

// Re-export Engine from pipeline
pub use pipeline::Engine;

// Re-export pipeline components
pub use pipeline::{drive_job, merge_results, retry_transient, route, Route};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export security types
pub use security::credentials::{ProviderCredentials, SecretString};
