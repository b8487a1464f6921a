//! Display-refresh tick sources.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Source of refresh ticks driving the frame scheduler.
#[allow(async_fn_in_trait)]
pub trait RefreshClock {
    /// Wait for the next refresh. Returns `false` once the source has ended
    /// (for example the display went away) and no more ticks will come.
    async fn next_tick(&mut self) -> bool;
}

/// Fixed-rate refresh emulation for hosts without a vsync signal.
///
/// Refreshes that pass while a tick is still running are skipped rather than
/// delivered in a burst, so a slow tick delays the pipeline instead of
/// building a backlog.
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    /// Must be called from within a tokio runtime.
    pub fn new(refresh_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_rate.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

impl RefreshClock for IntervalClock {
    async fn next_tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn period_follows_refresh_rate() {
        let clock = IntervalClock::new(50);
        assert_eq!(clock.period(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_does_not_panic() {
        let clock = IntervalClock::new(0);
        assert_eq!(clock.period(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn missed_refreshes_are_not_replayed() {
        let mut clock = IntervalClock::new(10);
        assert!(clock.next_tick().await);

        // a tick that overran two and a half refresh periods
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(clock.next_tick().await);
        let after_overrun = Instant::now();
        assert!(clock.next_tick().await);

        // the next refresh lands back on the 100ms grid instead of bursting
        assert!(Instant::now() - after_overrun >= Duration::from_millis(40));
    }
}
