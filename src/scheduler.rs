//! Background refresh task.
//!
//! Re-ingests one period on a fixed interval through the same
//! [`RefreshOrchestrator::refresh`] entry point used by on-demand callers, so
//! background runs queue behind manual runs for the same period instead of
//! overlapping them. A failed tick is logged; the next tick is the retry.

use crate::orchestrator::RefreshOrchestrator;
use crate::period::Period;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct AutoRefresh {
    orchestrator: Arc<RefreshOrchestrator>,
    period: Period,
    every: Duration,
    running: Option<(watch::Sender<bool>, JoinHandle<u64>)>,
}

impl AutoRefresh {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, period: Period, every: Duration) -> Self {
        Self {
            orchestrator,
            period,
            every,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the refresh loop. Starting twice is a no-op.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let orchestrator = self.orchestrator.clone();
        let period = self.period;
        let every = self.every;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        ticks += 1;
                        match orchestrator.refresh(period).await {
                            Ok(outcome) => debug!(%period, records = outcome.records, "Background refresh done"),
                            Err(e) => warn!(%period, error = %e, "Background refresh failed"),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            ticks
        });

        info!(%period, interval_secs = every.as_secs_f64(), "Background refresh started");
        self.running = Some((stop_tx, handle));
    }

    /// Stop the loop and wait for an in-flight refresh to finish.
    ///
    /// Returns how many ticks ran, or `None` if the task was not running.
    pub async fn stop(&mut self) -> Option<u64> {
        let (stop_tx, handle) = self.running.take()?;
        let _ = stop_tx.send(true);
        match handle.await {
            Ok(ticks) => {
                info!(period = %self.period, ticks, "Background refresh stopped");
                Some(ticks)
            }
            Err(e) => {
                warn!(error = %e, "Background refresh task ended abnormally");
                None
            }
        }
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        if let Some((stop_tx, _)) = self.running.take() {
            let _ = stop_tx.send(true);
        }
    }
}
