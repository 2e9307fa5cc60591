//! Processor metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Prometheus metric names emitted by the processor
pub mod names {
    pub const FRAMES_RECEIVED: &str = "kinect_depth_frames_received_total";
    pub const FRAMES_GATED: &str = "kinect_depth_frames_gated_total";
    pub const RECORDS_PUBLISHED: &str = "kinect_depth_records_published_total";
    pub const FRAME_ERRORS: &str = "kinect_depth_frame_errors_total";
    pub const PUBLISH_DROPPED: &str = "kinect_depth_publish_dropped_total";
    pub const FRAME_PROCESSING_MS: &str = "kinect_depth_frame_processing_ms";
}

/// Processor counters
///
/// Shared between the processor, its capture callback and the channel publisher.
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    /// Frames delivered by the source while running
    pub frames_received: AtomicU64,

    /// Frames discarded by the rate gate
    pub frames_gated: AtomicU64,

    /// Records handed to the publisher
    pub records_published: AtomicU64,

    /// Frames dropped because they could not be processed
    pub frame_errors: AtomicU64,

    /// Events the publisher could not enqueue
    pub publish_dropped: AtomicU64,
}

impl ProcessorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::FRAMES_RECEIVED).increment(1);
    }

    pub fn record_gated(&self) {
        self.frames_gated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::FRAMES_GATED).increment(1);
    }

    pub fn record_published(&self) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::RECORDS_PUBLISHED).increment(1);
    }

    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::FRAME_ERRORS).increment(1);
    }

    pub fn record_publish_dropped(&self) {
        self.publish_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::PUBLISH_DROPPED).increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_gated: self.frames_gated.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            publish_dropped: self.publish_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_gated: u64,
    pub records_published: u64,
    pub frame_errors: u64,
    pub publish_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let m = ProcessorMetrics::new();
        m.record_received();
        m.record_received();
        m.record_gated();
        m.record_published();
        m.record_frame_error();
        m.record_publish_dropped();

        let s = m.snapshot();
        assert_eq!(s.frames_received, 2);
        assert_eq!(s.frames_gated, 1);
        assert_eq!(s.records_published, 1);
        assert_eq!(s.frame_errors, 1);
        assert_eq!(s.publish_dropped, 1);
    }
}
