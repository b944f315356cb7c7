//! Prometheus metrics for stream sessions
//!
//! | Metric | Type |
//! |--------|------|
//! | `ocm_dashboard_active_streams` | Gauge |
//! | `ocm_dashboard_snapshots_sent_total` | Counter |
//! | `ocm_dashboard_stream_errors_total` | Counter |
//! | `ocm_dashboard_keepalives_sent_total` | Counter |

use crate::error::DashboardError;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct StreamMetrics {
    active_streams: IntGauge,
    snapshots_sent: IntCounter,
    stream_errors: IntCounter,
    keepalives_sent: IntCounter,
}

impl std::fmt::Debug for StreamMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMetrics")
            .field("active_streams", &self.active_streams.get())
            .field("snapshots_sent", &self.snapshots_sent.get())
            .field("stream_errors", &self.stream_errors.get())
            .field("keepalives_sent", &self.keepalives_sent.get())
            .finish()
    }
}

impl StreamMetrics {
    /// Creates the stream metrics and registers them with `registry`.
    ///
    /// Fails if any of them is already registered there.
    pub fn register(registry: &Registry) -> Result<Self, DashboardError> {
        let active_streams = IntGauge::new(
            "ocm_dashboard_active_streams",
            "Number of stream sessions currently open",
        )?;
        let snapshots_sent = IntCounter::new(
            "ocm_dashboard_snapshots_sent_total",
            "Snapshot frames written to stream clients",
        )?;
        let stream_errors = IntCounter::new(
            "ocm_dashboard_stream_errors_total",
            "Error frames written to stream clients",
        )?;
        let keepalives_sent = IntCounter::new(
            "ocm_dashboard_keepalives_sent_total",
            "Keepalive frames written to stream clients",
        )?;

        registry.register(Box::new(active_streams.clone()))?;
        registry.register(Box::new(snapshots_sent.clone()))?;
        registry.register(Box::new(stream_errors.clone()))?;
        registry.register(Box::new(keepalives_sent.clone()))?;

        Ok(Self {
            active_streams,
            snapshots_sent,
            stream_errors,
            keepalives_sent,
        })
    }

    /// Marks a session as open until the returned guard is dropped.
    pub fn session_started(&self) -> ActiveStreamGuard {
        self.active_streams.inc();
        ActiveStreamGuard {
            gauge: self.active_streams.clone(),
        }
    }

    pub fn snapshot_sent(&self) {
        self.snapshots_sent.inc();
    }

    pub fn error_sent(&self) {
        self.stream_errors.inc();
    }

    pub fn keepalive_sent(&self) {
        self.keepalives_sent.inc();
    }

    pub fn active_streams(&self) -> i64 {
        self.active_streams.get()
    }

    pub fn snapshots_sent(&self) -> u64 {
        self.snapshots_sent.get()
    }

    pub fn errors_sent(&self) -> u64 {
        self.stream_errors.get()
    }

    pub fn keepalives_sent(&self) -> u64 {
        self.keepalives_sent.get()
    }
}

/// Decrements the active stream gauge on drop.
#[derive(Debug)]
pub struct ActiveStreamGuard {
    gauge: IntGauge,
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Renders every metric in `registry` in the text exposition format.
pub fn render(registry: &Registry) -> Result<String, DashboardError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| DashboardError::Configuration(format!("metrics output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        assert!(StreamMetrics::register(&registry).is_ok());
        assert!(StreamMetrics::register(&registry).is_err());
    }

    #[test]
    fn test_active_stream_guard() {
        let registry = Registry::new();
        let metrics = StreamMetrics::register(&registry).unwrap();
        let first = metrics.session_started();
        let second = metrics.session_started();
        assert_eq!(metrics.active_streams(), 2);
        drop(first);
        assert_eq!(metrics.active_streams(), 1);
        drop(second);
        assert_eq!(metrics.active_streams(), 0);
    }

    #[test]
    fn test_render_exposition() {
        let registry = Registry::new();
        let metrics = StreamMetrics::register(&registry).unwrap();
        metrics.snapshot_sent();
        metrics.snapshot_sent();
        metrics.keepalive_sent();

        let text = render(&registry).unwrap();
        assert!(text.contains("ocm_dashboard_snapshots_sent_total 2"));
        assert!(text.contains("ocm_dashboard_keepalives_sent_total 1"));
        assert!(text.contains("ocm_dashboard_stream_errors_total 0"));
        assert!(text.contains("# TYPE ocm_dashboard_active_streams gauge"));
    }
}
