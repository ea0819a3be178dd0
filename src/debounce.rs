//! Single-slot trailing-edge debounce for reply generation.
//!
//! At most one pending generation exists at any time. Every schedule takes
//! a fresh token under the lock; the sleeping task re-checks that its token
//! is still the live one before firing, so cancel-then-replace is atomic
//! with respect to concurrent scheduling attempts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Trailing-edge debounce keyed on "time since last qualifying turn".
#[derive(Clone)]
pub struct ReplyTimer {
    window: Duration,
    live_token: Arc<Mutex<u64>>,
}

impl ReplyTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            live_token: Arc::new(Mutex::new(0)),
        }
    }

    /// Schedule `fire`, superseding any pending schedule.
    ///
    /// `immediate` fires with zero delay — it still takes a token, so it
    /// cancels pending timers on its way. The token check happens before
    /// `fire` runs: once a timer is past it, a burst arriving during the
    /// (possibly long) generation schedules independently instead of being
    /// dropped.
    pub async fn schedule<F, Fut>(&self, immediate: bool, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = {
            let mut live = self.live_token.lock().await;
            *live = live.wrapping_add(1);
            *live
        };

        let live_token = self.live_token.clone();
        let delay = if immediate { Duration::ZERO } else { self.window };

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            {
                let live = live_token.lock().await;
                if *live != token {
                    debug!("debounce: superseded, not firing");
                    return;
                }
            }
            fire().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_burst_collapses_to_one_fire() {
        let timer = ReplyTimer::new(Duration::from_millis(40));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = fired.clone();
            timer
                .schedule(false, move || async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_fires_without_waiting() {
        let timer = ReplyTimer::new(Duration::from_secs(60));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        timer
            .schedule(true, move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_supersedes_pending_timer() {
        let timer = ReplyTimer::new(Duration::from_millis(80));
        let slow_fired = Arc::new(AtomicUsize::new(0));
        let fast_fired = Arc::new(AtomicUsize::new(0));

        let s = slow_fired.clone();
        timer
            .schedule(false, move || async move {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let f = fast_fired.clone();
        timer
            .schedule(true, move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fast_fired.load(Ordering::SeqCst), 1);
        assert_eq!(slow_fired.load(Ordering::SeqCst), 0, "pending timer must not fire");
    }

    #[tokio::test]
    async fn test_new_schedule_during_fire_is_independent() {
        let timer = ReplyTimer::new(Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));

        // First fire blocks for a while; a schedule arriving mid-flight
        // must still fire on its own.
        let f1 = fired.clone();
        timer
            .schedule(true, move || async move {
                f1.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        let f2 = fired.clone();
        timer
            .schedule(false, move || async move {
                f2.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
