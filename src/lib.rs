//! PLYS - point cloud sequence decoding and playback.
//!
//! A PLYS file is a short sequence header carrying a framerate, followed by
//! a stream of PLY frames. This crate reads such streams one frame at a
//! time, decodes ASCII and binary vertex records (optionally in parallel),
//! and plays them back at the declared framerate.
//!
//! # Architecture
//!
//! - `sequence`: Stream format, header parsing, record decoding, frame source and writer
//! - `playback`: Tick scheduler and pacing
//! - `schema`: Decoder and playback configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use plys::{
//!     playback::PlaybackScheduler,
//!     schema::PlaybackConfig,
//!     sequence::Frame,
//! };
//!
//! let config = PlaybackConfig::default();
//! let mut scheduler = PlaybackScheduler::from_path(
//!     "capture.plys",
//!     |index: u64, frame: Frame| println!("frame {}: {} points", index, frame.len()),
//!     config,
//! )?;
//!
//! let stats = scheduler.run()?;
//! println!("Played {}", stats);
//! # Ok::<(), plys::sequence::SequenceError>(())
//! ```

pub mod playback;
pub mod schema;
pub mod sequence;

// Re-export commonly used types
pub use playback::{FrameSink, PlaybackScheduler, PlaybackState, PlaybackStats, StopReason};
pub use schema::{DecoderConfig, PlaybackConfig};
pub use sequence::{Frame, FrameSource, PointRecord, SequenceError, SequenceWriter};
