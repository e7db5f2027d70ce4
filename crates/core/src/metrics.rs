//! Metrics collection for HomeCam
//!
//! Provides basic counters for monitoring capture and authentication health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process metrics collector
#[derive(Default)]
pub struct Metrics {
    /// Raw frames read from the device
    frames_captured: AtomicU64,

    /// Encoded frames pushed into the frame buffer
    frames_published: AtomicU64,

    /// Frames evicted unread by the drop-oldest policy
    frames_evicted: AtomicU64,

    /// Frames the encoder rejected
    encode_failures: AtomicU64,

    /// Device reads that failed
    read_failures: AtomicU64,

    /// Background capture loops started
    capture_loop_starts: AtomicU64,

    /// Key-set network fetches attempted
    keyset_fetches: AtomicU64,

    /// Key-set network fetches that failed
    keyset_fetch_failures: AtomicU64,

    /// Streaming tokens minted
    streaming_tokens_minted: AtomicU64,

    /// Currently connected stream viewers
    active_viewers: AtomicU64,

    /// Startup timestamp (unix seconds)
    startup_time: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            startup_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    pub fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_evicted(&self, count: u64) {
        self.frames_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn encode_failed(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_failed(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capture_loop_started(&self) {
        self.capture_loop_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keyset_fetched(&self) {
        self.keyset_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keyset_fetch_failed(&self) {
        self.keyset_fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn streaming_token_minted(&self) {
        self.streaming_tokens_minted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a viewer connecting
    pub fn viewer_connected(&self) {
        self.active_viewers.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a viewer disconnecting
    pub fn viewer_disconnected(&self) {
        // Saturating: a stray disconnect must not wrap the gauge
        let _ = self
            .active_viewers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let uptime_secs = now.saturating_sub(self.startup_time.load(Ordering::Relaxed));

        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            capture_loop_starts: self.capture_loop_starts.load(Ordering::Relaxed),
            keyset_fetches: self.keyset_fetches.load(Ordering::Relaxed),
            keyset_fetch_failures: self.keyset_fetch_failures.load(Ordering::Relaxed),
            streaming_tokens_minted: self.streaming_tokens_minted.load(Ordering::Relaxed),
            active_viewers: self.active_viewers.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub frames_published: u64,
    pub frames_evicted: u64,
    pub encode_failures: u64,
    pub read_failures: u64,
    pub capture_loop_starts: u64,
    pub keyset_fetches: u64,
    pub keyset_fetch_failures: u64,
    pub streaming_tokens_minted: u64,
    pub active_viewers: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Published frames per second of uptime
    pub fn frames_per_second(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            self.frames_published as f64 / self.uptime_secs as f64
        }
    }
}

/// Global metrics instance
static GLOBAL_METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(Metrics::new()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.frames_published, 0);
        assert_eq!(snapshot.active_viewers, 0);
        assert_eq!(snapshot.frames_per_second(), 0.0);
    }

    #[test]
    fn test_viewer_gauge_never_wraps() {
        let metrics = Metrics::new();

        metrics.viewer_connected();
        metrics.viewer_disconnected();
        metrics.viewer_disconnected();

        assert_eq!(metrics.snapshot().active_viewers, 0);
    }

    #[test]
    fn test_frame_tracking() {
        let metrics = Metrics::new();

        metrics.frame_captured();
        metrics.frame_published();
        metrics.frames_evicted(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_captured, 1);
        assert_eq!(snapshot.frames_published, 1);
        assert_eq!(snapshot.frames_evicted, 3);
    }

    #[test]
    fn test_global_metrics() {
        let m1 = global_metrics();
        let m2 = global_metrics();

        m1.streaming_token_minted();
        assert_eq!(
            m2.snapshot().streaming_tokens_minted,
            m1.snapshot().streaming_tokens_minted
        );
    }
}
