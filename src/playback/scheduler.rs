//! Playback scheduler: drives a frame source at the sequence framerate.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::pacer::{Pacer, period_for};
use crate::schema::PlaybackConfig;
use crate::sequence::{DynReader, Frame, FrameSource, Result, SequenceError};

/// Longest single sleep between cancellation checks.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Receives decoded frames, e.g. a renderer.
pub trait FrameSink {
    /// Take ownership of frame `index`.
    fn present(&mut self, index: u64, frame: Frame);
}

impl<F: FnMut(u64, Frame)> FrameSink for F {
    fn present(&mut self, index: u64, frame: Frame) {
        (*self)(index, frame)
    }
}

/// Why playback stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last frame was delivered.
    EndOfSequence,
    /// A read or decode error occurred.
    Failed,
    /// Stopped by the caller.
    Cancelled,
}

/// Scheduler lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// Sequence header read, no frame delivered yet.
    Opened,
    Playing,
    Stopped(StopReason),
}

impl PlaybackState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped(_))
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A frame was handed to the sink.
    Presented { index: u64, vertex_count: usize },
    /// The sequence ended on this tick.
    Finished,
    /// Playback had already stopped.
    Stopped,
}

/// Statistics from a playback run.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackStats {
    /// Frames handed to the sink.
    pub frames_presented: u64,
    /// Total points across presented frames.
    pub points_presented: u64,
    /// Tick slots skipped by `TickPolicy::CatchUp`.
    pub ticks_skipped: u64,
    /// Wall-clock time spent in `run`.
    pub elapsed: Duration,
}

impl std::fmt::Display for PlaybackStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} points in {:.2}s",
            self.frames_presented,
            self.points_presented,
            self.elapsed.as_secs_f32()
        )?;
        if self.ticks_skipped > 0 {
            write!(f, " ({} ticks skipped)", self.ticks_skipped)?;
        }
        Ok(())
    }
}

/// Pulls one frame per tick from a [`FrameSource`] and presents it.
///
/// Frame K+1 is never decoded before frame K has been handed to the sink.
/// The source is dropped, closing its stream, as soon as playback stops.
///
/// Usage:
/// ```ignore
/// let source = FrameSource::new(reader, config.decoder.clone());
/// let mut scheduler = PlaybackScheduler::new(source, |index, frame: Frame| {
///     renderer.upload(index, frame);
/// }, config);
///
/// let stats = scheduler.run()?;
/// println!("{}", stats);
/// ```
pub struct PlaybackScheduler<R, S> {
    source: Option<FrameSource<R>>,
    sink: S,
    config: PlaybackConfig,
    state: PlaybackState,
    framerate: Option<f32>,
    cancelled: Arc<AtomicBool>,
    frames_presented: u64,
    points_presented: u64,
}

impl<S: FrameSink> PlaybackScheduler<DynReader, S> {
    /// Validate the configuration and open a sequence file for playback.
    pub fn from_path<P: AsRef<Path>>(path: P, sink: S, config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        let source = FrameSource::from_path(path, config.decoder.clone())?;
        Ok(Self::new(source, sink, config))
    }
}

impl<R: BufRead, S: FrameSink> PlaybackScheduler<R, S> {
    /// Create a scheduler. It starts `Opened` if the source's header was
    /// already read, `Idle` otherwise.
    pub fn new(source: FrameSource<R>, sink: S, config: PlaybackConfig) -> Self {
        let framerate = source.framerate();
        let state = if framerate.is_some() {
            PlaybackState::Opened
        } else {
            PlaybackState::Idle
        };

        Self {
            source: Some(source),
            sink,
            config,
            state,
            framerate,
            cancelled: Arc::new(AtomicBool::new(false)),
            frames_presented: 0,
            points_presented: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Framerate in effect: the configured override, else the declared one.
    pub fn framerate(&self) -> Option<f32> {
        self.config.framerate_override.or(self.framerate)
    }

    /// Tick period, once the framerate is known.
    pub fn period(&self) -> Option<Duration> {
        self.framerate().map(period_for)
    }

    /// Frames handed to the sink so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the scheduler and return its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Read the sequence header. Has no effect once opened or stopped.
    pub fn open(&mut self) -> Result<()> {
        if self.state != PlaybackState::Idle {
            return Ok(());
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };

        match source.open().map(|header| header.framerate) {
            Ok(framerate) => {
                self.framerate = Some(framerate);
                self.state = PlaybackState::Opened;
                Ok(())
            }
            Err(e) => {
                self.halt(StopReason::Failed);
                Err(e)
            }
        }
    }

    /// Decode the next frame and hand it to the sink.
    ///
    /// End of sequence stops playback and returns `Tick::Finished`. Any other
    /// error stops playback and is returned.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.state.is_stopped() {
            return Ok(Tick::Stopped);
        }
        if self.state == PlaybackState::Idle {
            self.open()?;
        }
        if self.cancelled.load(Ordering::Relaxed) {
            self.halt(StopReason::Cancelled);
            return Ok(Tick::Stopped);
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(Tick::Stopped);
        };

        match source.next_frame() {
            Ok(frame) => {
                let index = self.frames_presented;
                let vertex_count = frame.len();
                self.state = PlaybackState::Playing;
                self.sink.present(index, frame);
                self.frames_presented += 1;
                self.points_presented += vertex_count as u64;
                debug!("Presented frame {} ({} points)", index, vertex_count);
                Ok(Tick::Presented {
                    index,
                    vertex_count,
                })
            }
            Err(SequenceError::EndOfSequence) => {
                self.halt(StopReason::EndOfSequence);
                Ok(Tick::Finished)
            }
            Err(e) => {
                warn!("Playback failed after {} frames: {}", self.frames_presented, e);
                self.halt(StopReason::Failed);
                Err(e)
            }
        }
    }

    /// Stop playback and release the stream.
    pub fn stop(&mut self) {
        if !self.state.is_stopped() {
            self.halt(StopReason::Cancelled);
        }
    }

    /// Tick at the configured period until the sequence ends or playback is
    /// cancelled.
    ///
    /// An invalid configuration stops playback with `InvalidConfig` before
    /// any frame is read.
    pub fn run(&mut self) -> Result<PlaybackStats> {
        let start = Instant::now();
        if let Err(e) = self.config.validate() {
            if !self.state.is_stopped() {
                self.halt(StopReason::Failed);
            }
            return Err(e.into());
        }
        self.open()?;

        let mut pacer = match self.period() {
            Some(period) => Pacer::new(period, self.config.tick_policy),
            None => return Ok(self.stats(start.elapsed(), 0)),
        };
        info!(
            "Playing at {} fps ({:?} pacing)",
            self.framerate().unwrap_or_default(),
            pacer.policy()
        );
        pacer.start(Instant::now());

        loop {
            match self.tick()? {
                Tick::Presented { .. } => {}
                Tick::Finished | Tick::Stopped => break,
            }

            let delay = pacer.delay_after_tick(Instant::now());
            if !self.wait(delay) {
                self.stop();
                break;
            }
        }

        Ok(self.stats(start.elapsed(), pacer.ticks_skipped()))
    }

    /// Sleep for `delay`, returning false if cancelled meanwhile.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now().checked_add(delay);
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return false;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => CANCEL_POLL_INTERVAL,
            };
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
        }
    }

    fn stats(&self, elapsed: Duration, ticks_skipped: u64) -> PlaybackStats {
        PlaybackStats {
            frames_presented: self.frames_presented,
            points_presented: self.points_presented,
            ticks_skipped,
            elapsed,
        }
    }

    fn halt(&mut self, reason: StopReason) {
        self.state = PlaybackState::Stopped(reason);
        self.source = None;
        info!(
            "Playback stopped ({:?}) after {} frames",
            reason, self.frames_presented
        );
    }
}
