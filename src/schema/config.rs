//! Configuration types for sequence decoding and playback.

use serde::{Deserialize, Serialize};

/// Default minimum vertex count before records are decoded in parallel.
fn default_parallel_threshold() -> usize {
    4096
}

fn default_parallel() -> bool {
    true
}

/// How repeated header declarations are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Use the first occurrence and ignore later ones.
    #[default]
    FirstWins,
    /// Fail when a recognized key is repeated with a different value.
    Reject,
}

/// How blank lines between frames are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingLinePolicy {
    /// Skip any number of blank lines before a frame header.
    #[default]
    Optional,
    /// Every frame body must be followed by exactly one blank line.
    Required,
    /// No blank lines may appear between frames.
    Forbidden,
}

/// Pacing used when a decode overruns its tick period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Wait one full period after each tick completes (playback falls behind).
    #[default]
    Serialized,
    /// Keep ticks on a fixed wall-clock grid, skipping missed slots.
    CatchUp,
}

/// Options for the header parser and record decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Handling of repeated declarations.
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    /// Handling of blank lines after frame bodies.
    #[serde(default)]
    pub trailing_lines: TrailingLinePolicy,
    /// Decode ASCII records on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Minimum vertex count for parallel decoding.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::FirstWins,
            trailing_lines: TrailingLinePolicy::Optional,
            parallel: default_parallel(),
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

impl DecoderConfig {
    /// Sequential decoding with default header policies.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }
}

/// Top-level playback configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Pacing policy for the playback loop.
    #[serde(default)]
    pub tick_policy: TickPolicy,
    /// Framerate to use instead of the sequence's declared one.
    #[serde(default)]
    pub framerate_override: Option<f32>,
    /// Parser and decoder options.
    #[serde(default)]
    pub decoder: DecoderConfig,
}

impl PlaybackConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.framerate_override {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::InvalidFramerate(rate));
            }
        }
        if self.decoder.parallel && self.decoder.parallel_threshold == 0 {
            return Err(ConfigError::InvalidParallelThreshold);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Framerate override must be positive and finite, got {0}")]
    InvalidFramerate(f32),
    #[error("Parallel threshold must be non-zero when parallel decoding is enabled")]
    InvalidParallelThreshold,
}
