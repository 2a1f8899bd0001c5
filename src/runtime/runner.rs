use crate::processor::reconciler::Reconciler;
use crate::runtime::telemetry::spawn_metrics_reporter;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Request for one reconciliation cycle, stamped with the block time (seconds)
/// that pointer updates should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTrigger {
    pub timestamp: u64,
}

/// Runs one cycle per received [`CycleTrigger`] until shut down, alongside
/// the periodic metrics reporter.
pub struct Runner {
    reconciler: Arc<Reconciler>,
    triggers: mpsc::Receiver<CycleTrigger>,
    shutdown: CancellationToken,
    metrics_interval: Duration,
}

impl Runner {
    /// Creates a runner and the sender used to request cycles. Dropping every
    /// sender stops the runner once queued triggers are handled.
    pub fn new(
        reconciler: Arc<Reconciler>,
        metrics_interval: Duration,
    ) -> (Self, mpsc::Sender<CycleTrigger>) {
        let (sender, triggers) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        let runner = Self {
            reconciler,
            triggers,
            shutdown: CancellationToken::new(),
            metrics_interval,
        };
        (runner, sender)
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Processes triggers until the token is cancelled or the channel closes.
    /// A failed cycle is logged and does not stop the runner. Returns the
    /// number of cycles that completed.
    pub async fn run(mut self) -> Result<u64> {
        let reporter_shutdown = self.shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            self.reconciler.telemetry().clone(),
            reporter_shutdown.clone(),
            self.metrics_interval,
        );

        let mut completed = 0u64;
        loop {
            let trigger = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("runner shutdown token cancelled");
                    break;
                }
                trigger = self.triggers.recv() => trigger,
            };

            let Some(CycleTrigger { timestamp }) = trigger else {
                tracing::info!("cycle trigger channel closed; stopping runner");
                break;
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(timestamp, "shutdown requested during cycle; abandoning it");
                    break;
                }
                outcome = self.reconciler.reconcile_cycle_at(timestamp) => match outcome {
                    Ok(_) => completed += 1,
                    Err(err) => tracing::warn!(timestamp, error = %err, "reconciliation cycle failed"),
                },
            }
        }

        reporter_shutdown.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }
        Ok(completed)
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is
    /// cancelled elsewhere, or the trigger channel closes.
    pub async fn run_until_ctrl_c(self) -> Result<u64> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received; shutting down runner");
                shutdown.cancel();
            }
        });

        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");
        let result = self.run().await;
        signal_task.abort();
        result
    }
}
