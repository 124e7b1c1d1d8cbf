use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};

/// Background task that continuously clears entries caught inside an
/// unresolved unplanned outage's window. Each cycle recomputes its target
/// set from scratch, so a missed tick or failed eviction only delays the
/// cleanup — it is retried on the next cycle.
pub async fn run_reconciler(engine: Arc<Engine>, sweep_interval: Duration) {
    let mut interval = tokio::time::interval(sweep_interval);
    loop {
        interval.tick().await;
        sweep(&engine).await;
    }
}

/// One sweep cycle. Exposed separately so tests and embedders can drive
/// cycles directly.
pub async fn sweep(engine: &Engine) {
    let started = std::time::Instant::now();
    let targets = engine.collect_sweep_evictions();
    metrics::histogram!(crate::observability::SWEEP_TARGETS).record(targets.len() as f64);

    for (entry_id, system_id, outage_id) in targets {
        match engine.evict_entry(entry_id, outage_id).await {
            Ok(_) => {
                metrics::counter!(crate::observability::EVICTIONS_TOTAL).increment(1);
                info!("evicted entry {entry_id} on system {system_id} (outage {outage_id})");
            }
            Err(EngineError::AllocationNotFound(_)) => {
                // Gone, moved outside the window, or the outage resolved
                // since collection
                tracing::debug!("sweep skip {entry_id}: target vanished");
            }
            Err(e) => {
                // Retried next cycle
                tracing::warn!("sweep failed to evict {entry_id}: {e}");
            }
        }
    }

    metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
}
