//! Periodic auto-scan timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Timer that calls back on a fixed period while armed.
///
/// The scheduler keeps no decision logic: it is armed for one key (the live
/// source id) and torn down whenever the key changes.
#[derive(Debug)]
pub(crate) struct AutoScanScheduler {
    period: Duration,
    armed: Option<(u64, JoinHandle<()>)>,
}

impl AutoScanScheduler {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            armed: None,
        }
    }

    /// Arms, re-arms, or disarms the timer so it matches `key`.
    ///
    /// `on_tick` is called on every period boundary after the first; it
    /// returns `false` to stop the timer from inside.
    pub(crate) fn sync<F>(&mut self, key: Option<u64>, on_tick: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        let current = self.armed.as_ref().map(|(armed_key, _)| *armed_key);
        if current == key {
            return;
        }

        self.disarm();
        let Some(key) = key else {
            return;
        };

        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        tracing::debug!(source_id = key, period_ms = period.as_millis() as u64, "auto-scan armed");
        self.armed = Some((key, handle));
    }

    pub(crate) fn disarm(&mut self) {
        if let Some((key, handle)) = self.armed.take() {
            handle.abort();
            tracing::debug!(source_id = key, "auto-scan disarmed");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for AutoScanScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
