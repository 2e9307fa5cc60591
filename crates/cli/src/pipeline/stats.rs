//! Pipeline statistics and metrics.

use std::time::Duration;

use depth_processor::MetricsSnapshot;
use dispatcher::SinkMetricsSnapshot;
use observability::RecordMetricsAggregator;

/// Why the run loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Source stopped producing (replay finished)
    #[default]
    SourceFinished,
    MaxRecords,
    Timeout,
    /// Ctrl-C / SIGTERM
    Shutdown,
    DispatcherClosed,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Records taken off the publish channel
    pub records_received: u64,

    /// Records handed to the dispatcher
    pub records_dispatched: u64,

    /// Samples in each record
    pub samples_per_record: usize,

    pub duration: Duration,

    pub stop_reason: StopReason,

    /// Processor counters at shutdown
    pub processor: MetricsSnapshot,

    /// Per-sink counters at shutdown
    pub sinks: Vec<(String, SinkMetricsSnapshot)>,

    pub record_metrics: RecordMetricsAggregator,
}

impl PipelineStats {
    /// Records per second throughput
    pub fn records_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.records_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of received frames discarded by the rate gate (%)
    pub fn gated_rate(&self) -> f64 {
        if self.processor.frames_received > 0 {
            self.processor.frames_gated as f64 / self.processor.frames_received as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Stop reason: {:?}", self.stop_reason);
        println!("   ├─ Records published: {}", self.records_received);
        println!("   ├─ Records dispatched: {}", self.records_dispatched);
        println!("   ├─ Records/s: {:.2}", self.records_per_sec());
        println!("   └─ Samples per record: {}", self.samples_per_record);

        let p = &self.processor;
        println!("\n🎞  Depth Processor");
        println!("   ├─ Frames received: {}", p.frames_received);
        println!(
            "   ├─ Frames gated: {} ({:.2}%)",
            p.frames_gated,
            self.gated_rate()
        );
        println!("   ├─ Frame errors: {}", p.frame_errors);
        println!("   └─ Publish drops: {}", p.publish_dropped);

        let summary = self.record_metrics.summary();
        println!("\n📈 Records");
        println!("   ├─ Valid samples: {:.2}%", summary.valid_rate);
        println!("   ├─ Mean distance (m): {}", summary.mean_distance_m);
        println!("   └─ Publish interval (ms): {}", summary.publish_interval_ms);

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, snapshot)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!("   {prefix} {name}: {snapshot}");
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let stats = PipelineStats {
            records_received: 10,
            duration: Duration::from_secs(5),
            processor: MetricsSnapshot {
                frames_received: 300,
                frames_gated: 290,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((stats.records_per_sec() - 2.0).abs() < 1e-10);
        assert!((stats.gated_rate() - 96.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_rates_without_data() {
        let stats = PipelineStats::default();
        assert_eq!(stats.records_per_sec(), 0.0);
        assert_eq!(stats.gated_rate(), 0.0);
    }
}
