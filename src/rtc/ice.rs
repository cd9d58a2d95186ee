//! ICE restart coordination (spec.md §4.2, §8).
//!
//! One [`IceRestartController`] per transport. Re-entry is suppressed by
//! the `restarting` flag per the `RestartICEParams` invariant in spec.md
//! §3: "at any time at most one restart is in flight per transport".
//! Backoff starts at 2000ms and doubles on failure, grounded in the
//! teacher's hand-rolled reconnect backoff
//! (`network::websocket::connection_loop`) rather than a `backoff` crate
//! dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const INITIAL_DELAY: Duration = Duration::from_millis(2000);
/// Not specified by spec.md ("no cap specified — implementer may cap at
/// 30 s"); capped here to match the signaling reconnect backoff's cap.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Per-transport ICE restart state: the `restarting` flag plus whatever
/// timer is currently scheduled to fire a restart attempt.
pub struct IceRestartController {
    restarting: AtomicBool,
    pending_timer: Mutex<Option<JoinHandle<()>>>,
}

impl Default for IceRestartController {
    fn default() -> Self {
        Self::new()
    }
}

impl IceRestartController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            restarting: AtomicBool::new(false),
            pending_timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_restarting(&self) -> bool {
        self.restarting.load(Ordering::SeqCst)
    }

    /// Clear any pending scheduled restart. Called whenever the
    /// transport's connection state moves to anything other than
    /// `disconnected`/`failed`.
    pub async fn clear_pending(&self) {
        if let Some(handle) = self.pending_timer.lock().await.take() {
            handle.abort();
        }
    }

    fn try_begin(&self) -> bool {
        !self.restarting.swap(true, Ordering::SeqCst)
    }

    fn finish(&self) {
        self.restarting.store(false, Ordering::SeqCst);
    }

    /// Schedule a restart attempt after `delay`, replacing any
    /// previously scheduled one. `attempt` performs the actual
    /// `restartIce` signaling round-trip plus `transport.restartIce(...)`
    /// and returns whether it succeeded; on failure this reschedules
    /// itself with a doubled delay (capped at an implementer-chosen
    /// ceiling), repeating until cancelled via [`Self::clear_pending`] or
    /// it succeeds.
    pub async fn schedule<F, Fut>(self: &Arc<Self>, delay: Duration, attempt: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        self.clear_pending().await;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.backoff_loop(delay, attempt).await;
        });

        *self.pending_timer.lock().await = Some(handle);
    }

    async fn backoff_loop<F, Fut>(self: Arc<Self>, mut delay: Duration, attempt: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        loop {
            tokio::time::sleep(delay).await;

            if !self.try_begin() {
                debug!("ICE restart already in flight, skipping re-entry");
                return;
            }

            let succeeded = attempt().await;
            self.finish();

            if succeeded {
                return;
            }

            delay = std::cmp::min(delay * 2, MAX_DELAY);
            warn!(?delay, "ICE restart failed, rescheduling");
        }
    }
}

/// Convenience for the `connectionstatechange` handler of spec.md §4.2:
/// on `disconnected`/`failed` schedule a restart after the initial 2000ms
/// delay; any other state clears the pending timer.
pub async fn on_connection_state_change<F, Fut>(
    controller: &Arc<IceRestartController>,
    state: &str,
    attempt: F,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = bool> + Send + 'static,
{
    match state {
        "disconnected" | "failed" => controller.schedule(INITIAL_DELAY, attempt).await,
        _ => controller.clear_pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn doubles_delay_on_repeated_failure_and_suppresses_reentry() {
        let controller = Arc::new(IceRestartController::new());
        let attempts = Arc::new(AtomicU32::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let attempts_clone = attempts.clone();
        let overlap_clone = overlap.clone();
        let controller_check = controller.clone();

        controller
            .schedule(INITIAL_DELAY, move || {
                let attempts = attempts_clone.clone();
                let overlap = overlap_clone.clone();
                let controller_check = controller_check.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if !controller_check.is_restarting() {
                        overlap.store(true, Ordering::SeqCst);
                    }
                    false
                }
            })
            .await;

        // Fires at +2s, then (doubled to 4s) at +6s, then (doubled to 8s) at +14s.
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::time::advance(Duration::from_secs(9)).await;

        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(!overlap.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_pending_cancels_a_scheduled_restart() {
        let controller = Arc::new(IceRestartController::new());
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        controller
            .schedule(INITIAL_DELAY, move || {
                let fired = fired_clone.clone();
                async move {
                    fired.store(true, Ordering::SeqCst);
                    true
                }
            })
            .await;

        controller.clear_pending().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(!fired.load(Ordering::SeqCst));
    }
}
