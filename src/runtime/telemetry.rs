use crate::processor::reconciler::CycleReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Running totals across reconciliation cycles. Gateway counters are bumped
/// by the fetcher as it goes; the rest are folded in from each `CycleReport`.
#[derive(Default, Debug)]
pub struct Telemetry {
    pointer_reads: AtomicU64,
    pointer_failures: AtomicU64,
    pointer_updates: AtomicU64,
    documents_merged: AtomicU64,
    document_failures: AtomicU64,
    missing_pointers: AtomicU64,
    gateway_errors: AtomicU64,
    banned_skips: AtomicU64,
    cycles: AtomicU64,
    cycle_timeouts: AtomicU64,
}

impl Telemetry {
    pub fn record_gateway_error(&self) {
        self.gateway_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_banned_skip(&self) {
        self.banned_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        let totals = report.totals();
        add(&self.pointer_reads, totals.pointers_read);
        add(&self.pointer_failures, totals.pointer_failures);
        add(&self.pointer_updates, totals.pointers_updated);
        add(&self.documents_merged, totals.documents_merged);
        add(&self.document_failures, totals.document_failures);
        add(&self.missing_pointers, totals.missing_pointers);
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_timeout(&self) {
        self.cycle_timeouts.fetch_add(1, Ordering::Relaxed);
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pointer_reads: self.pointer_reads.load(Ordering::Relaxed),
            pointer_failures: self.pointer_failures.load(Ordering::Relaxed),
            pointer_updates: self.pointer_updates.load(Ordering::Relaxed),
            documents_merged: self.documents_merged.load(Ordering::Relaxed),
            document_failures: self.document_failures.load(Ordering::Relaxed),
            missing_pointers: self.missing_pointers.load(Ordering::Relaxed),
            gateway_errors: self.gateway_errors.load(Ordering::Relaxed),
            banned_skips: self.banned_skips.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            cycle_timeouts: self.cycle_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

fn add(counter: &AtomicU64, amount: usize) {
    if amount == 0 {
        return;
    }
    counter.fetch_add(amount as u64, Ordering::Relaxed);
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub pointer_reads: u64,
    pub pointer_failures: u64,
    pub pointer_updates: u64,
    pub documents_merged: u64,
    pub document_failures: u64,
    pub missing_pointers: u64,
    pub gateway_errors: u64,
    pub banned_skips: u64,
    pub cycles: u64,
    pub cycle_timeouts: u64,
}

/// Spawns a background task that periodically logs reconciliation counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "uri_sync::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    if current == last_snapshot {
                        continue;
                    }

                    tracing::info!(
                        target: "uri_sync::metrics",
                        cycles = current.cycles,
                        cycle_timeouts = current.cycle_timeouts,
                        pointer_reads = current.pointer_reads,
                        pointer_failures = current.pointer_failures,
                        pointer_updates = current.pointer_updates,
                        documents_merged = current.documents_merged,
                        merged_since_last = current
                            .documents_merged
                            .saturating_sub(last_snapshot.documents_merged),
                        document_failures = current.document_failures,
                        gateway_errors = current.gateway_errors,
                        banned_skips = current.banned_skips,
                        missing_pointers = current.missing_pointers,
                        "reconciliation metrics snapshot"
                    );

                    last_snapshot = current;
                }
            }
        }
    })
}
