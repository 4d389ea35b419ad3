//! Timed playback of decoded sequences.
//!
//! The [`PlaybackScheduler`] pulls one frame per tick from a
//! [`FrameSource`](crate::sequence::FrameSource) and hands it to a
//! [`FrameSink`]. Ticks can be driven directly with
//! [`tick`](PlaybackScheduler::tick), or by [`run`](PlaybackScheduler::run),
//! which paces them with a [`Pacer`] at the sequence framerate.
//!
//! ```text
//! Idle -> Opened -> Playing -> Stopped(EndOfSequence | Failed | Cancelled)
//! ```

mod pacer;
mod scheduler;

pub use pacer::{Pacer, period_for};
pub use scheduler::{
    FrameSink, PlaybackScheduler, PlaybackState, PlaybackStats, StopReason, Tick,
};
