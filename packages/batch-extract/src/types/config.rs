//! Run configuration and cache namespace derivation.

use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, RunError};
use crate::security::credentials::ProviderCredentials;

/// Configuration for the orchestration layer.
///
/// Every recognized option has a documented default; loosely-typed option
/// maps go through [`RunConfig::from_options`], which rejects unknown keys
/// instead of silently ignoring them.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Whether the batch path is available at all.
    ///
    /// Default: false (everything runs realtime).
    pub enabled: bool,

    /// Minimum item count at which the batch path is preferred.
    ///
    /// Default: 50.
    pub threshold: usize,

    /// Delay between job-status checks, in seconds.
    ///
    /// Default: 30.
    pub poll_interval_secs: u64,

    /// Maximum total wait for a job before declaring a local timeout, in
    /// seconds.
    ///
    /// Default: 3600.
    pub timeout_secs: u64,

    /// Whether completed results are persisted for resumability.
    ///
    /// Default: true. Running the batch path with caching off is allowed
    /// but forfeits resumability; see the warning logged by the engine.
    pub enable_caching: bool,

    /// Bounded worker pool size for the realtime path.
    ///
    /// Default: 8.
    pub realtime_concurrency: usize,

    /// Optional requests-per-second cap across realtime workers.
    pub realtime_rps: Option<u32>,

    /// Optional provider limit on items per batch job. When the uncached
    /// set is larger, it is split into consecutive jobs driven one at a
    /// time.
    pub max_items_per_job: Option<usize>,

    /// Retry policy for transient provider errors.
    pub retry: RetryPolicy,

    /// Provider credentials, validated before any network activity.
    pub credentials: Option<ProviderCredentials>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 50,
            poll_interval_secs: 30,
            timeout_secs: 3600,
            enable_caching: true,
            realtime_concurrency: 8,
            realtime_rps: None,
            max_items_per_job: None,
            retry: RetryPolicy::default(),
            credentials: None,
        }
    }
}

impl RunConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the batch path.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the batch threshold.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the poll interval in seconds.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the total wait budget in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Enable or disable result caching.
    pub fn with_caching(mut self, enable: bool) -> Self {
        self.enable_caching = enable;
        self
    }

    /// Set the realtime worker pool size.
    pub fn with_realtime_concurrency(mut self, workers: usize) -> Self {
        self.realtime_concurrency = workers;
        self
    }

    /// Cap realtime requests per second.
    pub fn with_realtime_rps(mut self, rps: u32) -> Self {
        self.realtime_rps = Some(rps);
        self
    }

    /// Set the provider's maximum items per job.
    pub fn with_max_items_per_job(mut self, max: usize) -> Self {
        self.max_items_per_job = Some(max);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set provider credentials.
    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Wait budget as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build a config from a loosely-typed options object.
    ///
    /// Unknown keys are rejected rather than silently ignored.
    pub fn from_options(options: serde_json::Value) -> Result<Self> {
        let raw: RawOptions =
            serde_json::from_value(options).map_err(|e| RunError::Config {
                reason: e.to_string(),
            })?;

        let credentials = ProviderCredentials::from_parts(raw.api_key, raw.credentials_path);

        Ok(Self {
            enabled: raw.enabled,
            threshold: raw.threshold,
            poll_interval_secs: raw.poll_interval_secs,
            timeout_secs: raw.timeout_secs,
            enable_caching: raw.enable_caching,
            realtime_concurrency: raw.realtime_concurrency,
            realtime_rps: raw.realtime_rps,
            max_items_per_job: raw.max_items_per_job,
            retry: raw.retry,
            credentials,
        })
    }

    /// Validate the configuration. Called before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(RunError::Config {
                reason: "threshold must be at least 1".into(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(RunError::Config {
                reason: "poll_interval_secs must be positive".into(),
            });
        }
        if self.timeout_secs < self.poll_interval_secs {
            return Err(RunError::Config {
                reason: format!(
                    "timeout_secs ({}) must be at least poll_interval_secs ({})",
                    self.timeout_secs, self.poll_interval_secs
                ),
            });
        }
        if self.realtime_concurrency == 0 {
            return Err(RunError::Config {
                reason: "realtime_concurrency must be at least 1".into(),
            });
        }
        if self.realtime_rps == Some(0) {
            return Err(RunError::Config {
                reason: "realtime_rps must be positive when set".into(),
            });
        }
        if self.max_items_per_job == Some(0) {
            return Err(RunError::Config {
                reason: "max_items_per_job must be positive when set".into(),
            });
        }
        self.retry.validate()?;
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

/// Exponential backoff policy for transient provider errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try. Default: 3.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds. Default: 1000.
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt. Default: 2.0.
    pub backoff_factor: f64,

    /// Upper bound on the delay between attempts, in milliseconds.
    /// Default: 60000.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backoff_factor < 1.0 {
            return Err(RunError::Config {
                reason: "retry.backoff_factor must be at least 1.0".into(),
            });
        }
        Ok(())
    }
}

/// Raw option map accepted by [`RunConfig::from_options`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawOptions {
    enabled: bool,
    threshold: usize,
    poll_interval_secs: u64,
    timeout_secs: u64,
    enable_caching: bool,
    realtime_concurrency: usize,
    realtime_rps: Option<u32>,
    max_items_per_job: Option<usize>,
    retry: RetryPolicy,
    api_key: Option<String>,
    credentials_path: Option<String>,
}

impl Default for RawOptions {
    fn default() -> Self {
        let config = RunConfig::default();
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            poll_interval_secs: config.poll_interval_secs,
            timeout_secs: config.timeout_secs,
            enable_caching: config.enable_caching,
            realtime_concurrency: config.realtime_concurrency,
            realtime_rps: config.realtime_rps,
            max_items_per_job: config.max_items_per_job,
            retry: config.retry,
            api_key: None,
            credentials_path: None,
        }
    }
}

/// A storage namespace derived from deployment identity.
///
/// Independent processes targeting the same deployment derive the same
/// namespace and therefore share one cache. The value is computed once and
/// passed down; nothing reads deployment identity from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    /// Derive the namespace for a deployment.
    pub fn for_deployment(project: &str, region: &str) -> Result<Self> {
        if project.trim().is_empty() || region.trim().is_empty() {
            return Err(RunError::Config {
                reason: "namespace requires a non-empty project and region".into(),
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(project.as_bytes());
        hasher.update([0u8]);
        hasher.update(region.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Ok(Self(format!(
            "extract-cache-{}-{}-{}",
            sanitize(project),
            sanitize(region),
            &digest[..8]
        )))
    }

    /// The namespace string, safe for file names and bucket-style ids.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, keep alphanumerics and dashes, collapse the rest.
fn sanitize(value: &str) -> String {
    let mut out: String = value
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    const MAX_LEN: usize = 40;
    if out.len() > MAX_LEN {
        out.truncate(MAX_LEN);
    }
    out
}
