//! Per-sink counters
//!
//! Atomics for in-process reporting, mirrored to the `metrics` facade
//! with a `sink` label so a Prometheus exporter picks them up.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use metrics::{counter, gauge};

pub const SINK_WRITES: &str = "kinect_depth_sink_writes_total";
pub const SINK_FAILURES: &str = "kinect_depth_sink_failures_total";
pub const SINK_DROPPED: &str = "kinect_depth_sink_dropped_total";
pub const SINK_QUEUE_LEN: &str = "kinect_depth_sink_queue_len";

/// Metrics for a single sink
#[derive(Debug)]
pub struct SinkMetrics {
    sink: String,
    queue_len: AtomicUsize,
    write_count: AtomicU64,
    failure_count: AtomicU64,
    /// Events dropped because the sink queue was full
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            queue_len: AtomicUsize::new(0),
            write_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        gauge!(SINK_QUEUE_LEN, "sink" => self.sink.clone()).set(len as f64);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        counter!(SINK_WRITES, "sink" => self.sink.clone()).increment(1);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        counter!(SINK_FAILURES, "sink" => self.sink.clone()).increment(1);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        counter!(SINK_DROPPED, "sink" => self.sink.clone()).increment(1);
    }

    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkMetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

impl fmt::Display for SinkMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} failed={} dropped={} queued={}",
            self.write_count, self.failure_count, self.dropped_count, self.queue_len
        )
    }
}
