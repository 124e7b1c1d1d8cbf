use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: entries forcibly removed by the reconciler.
pub const EVICTIONS_TOTAL: &str = "alloq_evictions_total";

/// Histogram: reconciler sweep duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "alloq_sweep_duration_seconds";

/// Histogram: eviction targets found per sweep.
pub const SWEEP_TARGETS: &str = "alloq_sweep_targets";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered systems.
pub const SYSTEMS_ACTIVE: &str = "alloq_systems_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "alloq_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "alloq_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
