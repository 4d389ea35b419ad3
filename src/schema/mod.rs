//! Schema module - Configuration types for sequence decoding and playback.

mod config;

pub use config::*;
