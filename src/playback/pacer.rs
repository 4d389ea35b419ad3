//! Tick pacing for the playback loop.

use std::time::{Duration, Instant};

use crate::schema::TickPolicy;

/// Convert a framerate into a tick period.
///
/// Rates too small to represent as a `Duration` saturate to `Duration::MAX`.
pub fn period_for(framerate: f32) -> Duration {
    Duration::try_from_secs_f64(1.0 / f64::from(framerate)).unwrap_or(Duration::MAX)
}

/// Computes how long to wait between ticks.
///
/// The pacer never reads the clock itself; callers pass the current time,
/// so both policies can be exercised with synthetic instants.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    policy: TickPolicy,
    /// Grid slot of the most recent tick (`CatchUp` only).
    slot: Option<Instant>,
    ticks_skipped: u64,
}

impl Pacer {
    pub fn new(period: Duration, policy: TickPolicy) -> Self {
        Self {
            period,
            policy,
            slot: None,
            ticks_skipped: 0,
        }
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn policy(&self) -> TickPolicy {
        self.policy
    }

    /// Anchor the tick grid at the time the first tick starts.
    pub fn start(&mut self, now: Instant) {
        self.slot = Some(now);
    }

    /// Number of grid slots skipped because a tick overran.
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }

    /// Delay before the next tick, given the time the last tick completed.
    pub fn delay_after_tick(&mut self, now: Instant) -> Duration {
        match self.policy {
            TickPolicy::Serialized => self.period,
            TickPolicy::CatchUp => self.next_slot_delay(now),
        }
    }

    fn next_slot_delay(&mut self, now: Instant) -> Duration {
        if self.period.is_zero() {
            return Duration::ZERO;
        }

        let slot = self.slot.unwrap_or(now);
        let Some(mut next) = slot.checked_add(self.period) else {
            return Duration::MAX;
        };

        if next < now {
            let period = self.period.as_nanos();
            let missed = (now - next).as_nanos().div_ceil(period);
            let advance = Duration::from_nanos(
                u64::try_from(missed.saturating_mul(period)).unwrap_or(u64::MAX),
            );
            next = match next.checked_add(advance) {
                Some(next) => next,
                None => return Duration::MAX,
            };
            self.ticks_skipped += u64::try_from(missed).unwrap_or(u64::MAX);
        }

        self.slot = Some(next);
        next - now
    }
}
