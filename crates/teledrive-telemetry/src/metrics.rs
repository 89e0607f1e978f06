//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the data plane.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    chunks_uploaded_total: IntCounter,
    chunks_downloaded_total: IntCounter,
    transfers_total: IntCounterVec,
    blob_deletes_total: IntCounterVec,
    torrent_tasks_finished_total: IntCounterVec,
    active_upload_sessions: IntGauge,
    torrent_queue_depth: IntGauge,
    unresolved_delete_failures: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current number of open upload sessions.
    pub active_upload_sessions: i64,
    /// Queued torrent tasks awaiting the claimer.
    pub torrent_queue_depth: i64,
    /// Unresolved entries in the blob delete retry ledger.
    pub unresolved_delete_failures: i64,
    /// Total chunk bodies persisted to the blob tier.
    pub chunks_uploaded_total: u64,
    /// Total chunk bodies fetched from the blob tier.
    pub chunks_downloaded_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let chunks_uploaded_total = IntCounter::with_opts(Opts::new(
            "chunks_uploaded_total",
            "Chunk bodies persisted to the blob tier",
        ))?;
        let chunks_downloaded_total = IntCounter::with_opts(Opts::new(
            "chunks_downloaded_total",
            "Chunk bodies fetched from the blob tier",
        ))?;
        let transfers_total = IntCounterVec::new(
            Opts::new("transfers_total", "Finished transfers by direction and status"),
            &["direction", "status"],
        )?;
        let blob_deletes_total = IntCounterVec::new(
            Opts::new("blob_deletes_total", "Blob-tier delete attempts by outcome"),
            &["outcome"],
        )?;
        let torrent_tasks_finished_total = IntCounterVec::new(
            Opts::new(
                "torrent_tasks_finished_total",
                "Torrent ingest tasks reaching a terminal state",
            ),
            &["status"],
        )?;
        let active_upload_sessions = IntGauge::with_opts(Opts::new(
            "active_upload_sessions",
            "Open resumable upload sessions",
        ))?;
        let torrent_queue_depth = IntGauge::with_opts(Opts::new(
            "torrent_queue_depth",
            "Queued torrent tasks awaiting the claimer",
        ))?;
        let unresolved_delete_failures = IntGauge::with_opts(Opts::new(
            "unresolved_delete_failures",
            "Unresolved entries in the blob delete retry ledger",
        ))?;

        registry.register(Box::new(chunks_uploaded_total.clone()))?;
        registry.register(Box::new(chunks_downloaded_total.clone()))?;
        registry.register(Box::new(transfers_total.clone()))?;
        registry.register(Box::new(blob_deletes_total.clone()))?;
        registry.register(Box::new(torrent_tasks_finished_total.clone()))?;
        registry.register(Box::new(active_upload_sessions.clone()))?;
        registry.register(Box::new(torrent_queue_depth.clone()))?;
        registry.register(Box::new(unresolved_delete_failures.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                chunks_uploaded_total,
                chunks_downloaded_total,
                transfers_total,
                blob_deletes_total,
                torrent_tasks_finished_total,
                active_upload_sessions,
                torrent_queue_depth,
                unresolved_delete_failures,
            }),
        })
    }

    /// Count one persisted chunk body.
    pub fn record_chunk_uploaded(&self) {
        self.inner.chunks_uploaded_total.inc();
    }

    /// Count one fetched chunk body.
    pub fn record_chunk_downloaded(&self) {
        self.inner.chunks_downloaded_total.inc();
    }

    /// Count one finished transfer.
    pub fn record_transfer(&self, direction: &str, status: &str) {
        self.inner
            .transfers_total
            .with_label_values(&[direction, status])
            .inc();
    }

    /// Count one blob-tier delete attempt.
    pub fn record_blob_delete(&self, outcome: &str) {
        self.inner
            .blob_deletes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one torrent task reaching a terminal state.
    pub fn record_torrent_finished(&self, status: &str) {
        self.inner
            .torrent_tasks_finished_total
            .with_label_values(&[status])
            .inc();
    }

    /// Track the number of open upload sessions.
    pub fn set_active_upload_sessions(&self, value: i64) {
        self.inner.active_upload_sessions.set(value);
    }

    /// Track the queued torrent task count.
    pub fn set_torrent_queue_depth(&self, value: i64) {
        self.inner.torrent_queue_depth.set(value);
    }

    /// Track the unresolved delete-failure count.
    pub fn set_unresolved_delete_failures(&self, value: i64) {
        self.inner.unresolved_delete_failures.set(value);
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .context("failed to encode prometheus metrics")?;
        String::from_utf8(buffer).context("prometheus payload was not valid utf-8")
    }

    /// Capture the health-reporting snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_upload_sessions: self.inner.active_upload_sessions.get(),
            torrent_queue_depth: self.inner.torrent_queue_depth.get(),
            unresolved_delete_failures: self.inner.unresolved_delete_failures.get(),
            chunks_uploaded_total: self.inner.chunks_uploaded_total.get(),
            chunks_downloaded_total: self.inner.chunks_downloaded_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_gauges_appear_in_render() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.record_chunk_uploaded();
        metrics.record_chunk_downloaded();
        metrics.record_transfer("upload", "completed");
        metrics.record_blob_delete("deleted");
        metrics.record_torrent_finished("completed");
        metrics.set_active_upload_sessions(3);
        metrics.set_torrent_queue_depth(2);
        metrics.set_unresolved_delete_failures(1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("chunks_uploaded_total"));
        assert!(rendered.contains("transfers_total"));
        assert!(rendered.contains("torrent_queue_depth"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_upload_sessions, 3);
        assert_eq!(snapshot.torrent_queue_depth, 2);
        assert_eq!(snapshot.unresolved_delete_failures, 1);
        assert_eq!(snapshot.chunks_uploaded_total, 1);
        assert_eq!(snapshot.chunks_downloaded_total, 1);
        Ok(())
    }
}
