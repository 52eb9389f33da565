//! Periodic capture executor.
//!
//! The `CaptureExecutor` waits for the broker session to become ready, then
//! runs one `CaptureCycle` per interval until cancelled. Cycles are skipped,
//! not queued, while the session is down.

use tokio::{
    task::JoinHandle,
    time::{interval, sleep, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{capture::CaptureCycle, readiness::Readiness};

pub struct CaptureExecutor {
    cycle: CaptureCycle,
    period: Duration,
    readiness: Readiness,
}

impl CaptureExecutor {
    pub fn new(cycle: CaptureCycle, period: Duration, readiness: Readiness) -> Self {
        Self {
            cycle,
            period,
            readiness,
        }
    }

    /// Returns false if cancelled before the system became ready.
    async fn wait_ready(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.readiness.subscribe();
        if rx.borrow().is_ready() {
            info!("System is already ready, starting capture");
            return true;
        }

        warn!("Waiting for system readiness... Current: {}", *rx.borrow());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    let state = rx.borrow().clone();
                    if state.is_ready() {
                        info!("System is READY! Starting capture");
                        return true;
                    }
                    warn!("Still not ready: {}", state);
                }
                _ = sleep(Duration::from_secs(30)) => {
                    warn!("Still waiting for readiness... Current: {}", *rx.borrow());
                }
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        if !self.wait_ready(&cancel).await {
            debug!("Capture executor stopped before readiness");
            return;
        }

        info!("Capture started (interval: {}s)", self.period.as_secs());
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let state = self.readiness.current_state();
                    if !state.is_ready() {
                        debug!("Skipping capture: {}", state);
                        continue;
                    }
                    match self.cycle.run_once().await {
                        Ok(outcome) => debug!("Capture cycle finished: {:?}", outcome),
                        Err(e) => error!("Capture cycle failed: {}", e),
                    }
                }
            }
        }

        info!("Capture executor stopped");
    }
}

/// Awaits a background task at shutdown. A panicked or aborted task is logged
/// and reported as `false`.
pub async fn join_logged(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        }
    }
}
