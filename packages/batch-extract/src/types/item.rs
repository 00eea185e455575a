//! Input and output units for an extraction run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One unit of extraction work: a constructed prompt and its position in
/// the input sequence.
///
/// The position is assigned once and is the sole ordering key; results are
/// reassembled by it regardless of which path produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptItem {
    /// Zero-based position in the input sequence.
    pub index: usize,

    /// Fully constructed prompt text.
    pub prompt: String,
}

impl PromptItem {
    /// Create a new prompt item.
    pub fn new(index: usize, prompt: impl Into<String>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
        }
    }

    /// Build items from an iterator of prompts, assigning positions in
    /// iteration order.
    pub fn from_prompts(prompts: impl IntoIterator<Item = impl Into<String>>) -> Vec<Self> {
        prompts
            .into_iter()
            .enumerate()
            .map(|(index, prompt)| Self::new(index, prompt))
            .collect()
    }
}

/// Model parameters that affect extraction output.
///
/// These are part of the fingerprint: a change to any field makes a prompt
/// a different unit of work. `extra` is a sorted map so serialization is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Provider model identifier.
    pub model_id: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum output tokens, if capped.
    pub max_output_tokens: Option<u32>,

    /// Additional provider knobs that influence output.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ModelParams {
    /// Create params for a model with default sampling.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            temperature: 0.0,
            max_output_tokens: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap output tokens.
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    /// Add a provider-specific parameter.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The structured output for one prompt item.
///
/// The payload is opaque to the orchestration layer: it only needs to be
/// cloneable, serializable, and placeable at its item's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Structured extraction payload as returned by the provider.
    pub payload: serde_json::Value,
}

impl ExtractionResult {
    /// Wrap a payload.
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}
