//! Save and refresh scheduling.
//!
//! Deadlines that were missed while the process was stalled are skipped,
//! never queued: after a long stall exactly one event fires and the next
//! deadline lands on the first future boundary of the configured cadence.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::DispatchError;

/// Saves are aligned to this many minutes past the hour.
pub const SAVE_ALIGNMENT_MINUTES: u64 = 30;
/// Lower bound on the delay before the first aligned save.
pub const MIN_FIRST_SAVE_DELAY: Duration = Duration::from_secs(60);

/// How often checkpoints and progress refreshes happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub save_interval: Duration,
    pub refresh_interval: Duration,
    /// Delay from coordinator construction to the first save.
    pub first_save: Duration,
    /// Delay from coordinator construction to the first refresh.
    pub first_refresh: Duration,
}

impl Cadence {
    /// First refresh immediately, first save one interval out.
    pub fn new(save_interval: Duration, refresh_interval: Duration) -> crate::Result<Self> {
        if save_interval.is_zero() || refresh_interval.is_zero() {
            return Err(DispatchError::InvalidCadence {
                reason: format!(
                    "intervals must be > 0, got save {save_interval:?}, refresh {refresh_interval:?}"
                ),
            });
        }
        Ok(Self {
            save_interval,
            refresh_interval,
            first_save: save_interval,
            first_refresh: Duration::ZERO,
        })
    }

    /// Move the first save onto the next :00 / :30 boundary that is at least
    /// a minute after `now`.
    pub fn aligned_to(self, now: SystemTime) -> Self {
        Self {
            first_save: delay_to_aligned_save(now),
            ..self
        }
    }
}

/// Delay from `now` to the next half-hour boundary that is strictly after the
/// whole minute following `now + 60s`.
pub fn delay_to_aligned_save(now: SystemTime) -> Duration {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let earliest = since_epoch + MIN_FIRST_SAVE_DELAY;
    let minute = earliest.as_secs() / 60 + 1;
    let aligned_minute = (minute / SAVE_ALIGNMENT_MINUTES + 1) * SAVE_ALIGNMENT_MINUTES;
    Duration::from_secs(aligned_minute * 60).saturating_sub(since_epoch)
}

/// Advance `deadline` by whole `interval`s until it is after `now`.
pub(crate) fn catch_up(deadline: Instant, now: Instant, interval: Duration) -> Instant {
    if deadline > now {
        return deadline;
    }
    let behind = now.duration_since(deadline).as_nanos();
    let steps = behind / interval.as_nanos() + 1;
    deadline + nanos(interval.as_nanos() * steps)
}

/// Pull `deadline` back by whole `interval`s until it is not after `now`,
/// keeping the cadence's phase.
pub(crate) fn pull_forward(deadline: Instant, now: Instant, interval: Duration) -> Instant {
    if deadline <= now {
        return deadline;
    }
    let ahead = deadline.duration_since(now).as_nanos();
    let steps = ahead.div_ceil(interval.as_nanos());
    deadline
        .checked_sub(nanos(interval.as_nanos() * steps))
        .unwrap_or(now)
}

fn nanos(n: u128) -> Duration {
    Duration::from_nanos(n.min(u64::MAX as u128) as u64)
}
