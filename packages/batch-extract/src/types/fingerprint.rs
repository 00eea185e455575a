//! Content fingerprints for deduplication and resumability.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::item::{ModelParams, PromptItem};

/// A deterministic content hash identifying a unique, reproducible
/// extraction request.
///
/// Computed over the prompt text and the serialized model parameters, so
/// equal inputs always collide and any difference in either component
/// yields a distinct key. Hex-encoded SHA-256, treated as collision-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a prompt under the given parameters.
    pub fn compute(item: &PromptItem, params: &ModelParams) -> Result<Self> {
        // Struct field order is fixed and `extra` is a BTreeMap, so the
        // params serialization is deterministic.
        let params_json = serde_json::to_vec(params)?;

        let mut hasher = Sha256::new();
        hasher.update(item.prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(&params_json);

        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct from a previously persisted digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests are noisy in logs; the prefix is enough to correlate.
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}
