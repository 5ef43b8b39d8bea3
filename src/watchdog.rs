//! Per-session liveness watchdog. Ported from the original's
//! `threading.Thread` + 1-second tick `Event` idiom: a counter starts at
//! the timeout value, ticks down once a second, and is reset to the
//! timeout on every `kick()`. Reaching zero fires the expiry signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A cheap, cloneable handle that can only kick the countdown. Handed to
/// the receive loop, which has no other business with the watchdog.
#[derive(Clone)]
pub struct KickHandle {
    counter: Arc<AtomicU64>,
    timeout_s: u64,
}

impl KickHandle {
    pub fn kick(&self) {
        self.counter.store(self.timeout_s, Ordering::SeqCst);
    }
}

pub struct Watchdog {
    counter: Arc<AtomicU64>,
    timeout_s: u64,
    stopped: Arc<AtomicBool>,
    pub expired: Arc<Notify>,
}

impl Watchdog {
    pub fn new(timeout_s: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(timeout_s)),
            timeout_s,
            stopped: Arc::new(AtomicBool::new(false)),
            expired: Arc::new(Notify::new()),
        }
    }

    /// Resets the countdown to the configured timeout. Called by the
    /// receive loop on every inbound message.
    pub fn kick(&self) {
        self.counter.store(self.timeout_s, Ordering::SeqCst);
    }

    /// Hands out a cloneable kick-only handle for the receive loop.
    pub fn kick_handle(&self) -> KickHandle {
        KickHandle {
            counter: self.counter.clone(),
            timeout_s: self.timeout_s,
        }
    }

    /// Spawns the 1-second tick task. Returns its join handle so the
    /// session can await it during teardown.
    pub fn spawn(&self) -> JoinHandle<()> {
        let counter = self.counter.clone();
        let stopped = self.stopped.clone();
        let expired = self.expired.clone();
        let timeout_s = self.timeout_s;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // consume first immediate tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    return;
                }
                let prev = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    Some(c.saturating_sub(1))
                });
                if let Ok(0) | Ok(1) = prev {
                    if counter.load(Ordering::SeqCst) == 0 {
                        expired.notify_one();
                        // Re-arm so a subsequent kick() after reconnect
                        // doesn't immediately re-fire before the timeout
                        // window has elapsed again.
                        counter.store(timeout_s, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    /// Stops the tick task and wakes anything parked on it.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout_without_kick() {
        let wd = Watchdog::new(2);
        let handle = wd.spawn();
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::time::timeout(Duration::from_millis(100), wd.expired.notified())
            .await
            .expect("watchdog should have expired");
        wd.stop();
        let _ = handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn kick_resets_countdown() {
        let wd = Watchdog::new(2);
        let handle = wd.spawn();
        tokio::time::advance(Duration::from_millis(1500)).await;
        wd.kick();
        tokio::time::advance(Duration::from_millis(1500)).await;
        // Should not have fired yet since kick reset the counter.
        let result = tokio::time::timeout(Duration::from_millis(10), wd.expired.notified()).await;
        assert!(result.is_err());
        wd.stop();
        let _ = handle.await;
    }
}
