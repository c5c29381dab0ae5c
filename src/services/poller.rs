//! Bounded-interval status polling
//!
//! Status observation is pull-only: a caller watches a record by polling at a
//! fixed cadence until a terminal status appears. The poller enforces a floor
//! interval so a misconfigured caller cannot hammer the store, and skips
//! missed ticks instead of bursting to catch up.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::env::constants::POLL_FLOOR;

/// Fixed-cadence poller with a floor interval
pub struct StatusPoller {
    interval: Duration,
}

impl StatusPoller {
    /// Intervals below the floor are clamped up to it
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(POLL_FLOOR),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until `should_stop` accepts an observation, returning it
    ///
    /// The first poll fires immediately; subsequent polls wait out the
    /// interval. A poll that overruns its slot is not compensated for.
    pub async fn run<S, Fut>(
        &self,
        mut poll_once: impl FnMut() -> Fut,
        should_stop: impl Fn(&S) -> bool,
    ) -> S
    where
        Fut: Future<Output = S>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let observed = poll_once().await;
            if should_stop(&observed) {
                return observed;
            }
        }
    }

    /// As `run`, but gives up when the token fires
    pub async fn run_until<S, Fut>(
        &self,
        cancel: &CancellationToken,
        poll_once: impl FnMut() -> Fut,
        should_stop: impl Fn(&S) -> bool,
    ) -> Option<S>
    where
        Fut: Future<Output = S>,
    {
        tokio::select! {
            observed = self.run(poll_once, should_stop) => Some(observed),
            _ = cancel.cancelled() => None,
        }
    }
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(POLL_FLOOR)
    }
}
