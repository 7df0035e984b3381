//! Periodic fetch cycle
//!
//! Drives a session on a tokio interval until the handle is stopped. The
//! session mutex guarantees one cycle at a time, including manual refreshes
//! issued from elsewhere.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{CycleTrigger, DashboardSession, DashboardSnapshot};

/// Running poller; stop it when the session ends
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the poller and wait for the current cycle to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that runs a scheduled cycle every `interval`, the first one
/// immediately, and passes each snapshot to `on_snapshot`.
pub fn spawn_poller<F>(
    session: Arc<Mutex<DashboardSession>>,
    interval: Duration,
    on_snapshot: F,
) -> PollerHandle
where
    F: Fn(&DashboardSnapshot) + Send + Sync + 'static,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = {
                        let mut session = session.lock().await;
                        session.run_cycle(CycleTrigger::Scheduled).await
                    };
                    on_snapshot(&snapshot);
                }
            }
        }

        tracing::info!("Poller stopped");
    });

    PollerHandle { shutdown, task }
}
