//! Time seams: wall-clock reads ([`Clock`]) and delayed execution ([`Timer`]).
//!
//! Production code uses [`SystemClock`] and [`TokioTimer`]. Tests substitute
//! [`ManualClock`] to move wall-clock time by hand, and either run under a
//! paused tokio runtime or use [`ScaledTimer`] to compress simulated delays.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        DateTime::from_timestamp_millis(self.now_millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// "After this long, continue" capability used by simulated work.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer wheel. Honors `tokio::time::pause()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeps for a fixed fraction of every requested duration.
#[derive(Debug, Clone, Copy)]
pub struct ScaledTimer {
    factor: f64,
}

impl ScaledTimer {
    /// `factor` is clamped to `0.0..=1.0`; `0.01` turns a minute into 600ms.
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Timer for ScaledTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration.mul_f64(self.factor)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now().timestamp_millis(), start.timestamp_millis());

        clock.advance(Duration::from_secs(90));
        assert_eq!(
            clock.now().timestamp_millis(),
            start.timestamp_millis() + 90_000
        );
    }

    #[test]
    fn scaled_timer_clamps_factor() {
        assert_eq!(ScaledTimer::new(4.0).factor, 1.0);
        assert_eq!(ScaledTimer::new(-1.0).factor, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn scaled_timer_shortens_sleep() {
        let started = tokio::time::Instant::now();
        ScaledTimer::new(0.1).sleep(Duration::from_secs(10)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }
}
