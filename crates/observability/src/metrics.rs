//! 深度记录指标收集模块
//!
//! 基于发布的 `DepthEvent` 收集和统计驱动运行指标。

use std::collections::HashMap;

use contracts::DepthEvent;
use metrics::{counter, gauge, histogram};

/// 从发布的事件记录指标
///
/// 每次处理器发布一条记录时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_depth_metrics;
///
/// while let Ok(event) = records_rx.recv().await {
///     record_depth_metrics(&event);
///     // ...
/// }
/// ```
pub fn record_depth_metrics(event: &DepthEvent) {
    let source_id = event.source_id.to_string();
    let record = &event.record;

    counter!("kinect_depth_records_total", "source_id" => source_id.clone()).increment(1);

    gauge!("kinect_depth_last_record_timestamp_ms", "source_id" => source_id.clone())
        .set(event.timestamp_ms as f64);

    let samples = record.sample_count();
    gauge!("kinect_depth_record_samples", "source_id" => source_id.clone()).set(samples as f64);

    if samples > 0 {
        let valid = record.valid_count();
        gauge!("kinect_depth_valid_ratio", "source_id" => source_id.clone())
            .set(valid as f64 / samples as f64);

        if let Some(mean) = mean_valid_distance(&record.samples) {
            histogram!("kinect_depth_mean_distance_m", "source_id" => source_id).record(mean);
        }
    }
}

/// 记录事件分发结果
pub fn record_record_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "kinect_depth_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录发布队列长度
pub fn record_publish_queue_depth(depth: usize) {
    gauge!("kinect_depth_publish_queue_len").set(depth as f64);
}

/// 有回波样本的平均距离
fn mean_valid_distance(samples: &[f64]) -> Option<f64> {
    let (sum, n) = samples
        .iter()
        .filter(|d| **d > 0.0)
        .fold((0.0, 0usize), |(sum, n), d| (sum + d, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// 记录指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RecordMetricsAggregator {
    /// 总记录数
    pub total_records: u64,

    /// 样本总数
    pub total_samples: u64,

    /// 有回波样本总数
    pub total_valid: u64,

    /// 每条记录的有效样本比例
    pub valid_ratio_stats: RunningStats,

    /// 每条记录的平均距离 (米)
    pub distance_stats: RunningStats,

    /// 相邻记录的发布间隔 (毫秒)
    pub interval_stats: RunningStats,

    /// 各源记录数
    pub source_counts: HashMap<String, u64>,

    last_timestamp_ms: HashMap<String, u64>,
}

impl RecordMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, event: &DepthEvent) {
        let record = &event.record;
        let samples = record.sample_count();
        let valid = record.valid_count();

        self.total_records += 1;
        self.total_samples += samples as u64;
        self.total_valid += valid as u64;

        if samples > 0 {
            self.valid_ratio_stats.push(valid as f64 / samples as f64);
        }
        if let Some(mean) = mean_valid_distance(&record.samples) {
            self.distance_stats.push(mean);
        }

        let source_id = event.source_id.as_str();
        *self.source_counts.entry(source_id.to_string()).or_insert(0) += 1;

        if let Some(prev) = self
            .last_timestamp_ms
            .insert(source_id.to_string(), event.timestamp_ms)
        {
            self.interval_stats
                .push(event.timestamp_ms.saturating_sub(prev) as f64);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_records: self.total_records,
            total_samples: self.total_samples,
            valid_rate: if self.total_samples > 0 {
                self.total_valid as f64 / self.total_samples as f64 * 100.0
            } else {
                0.0
            },
            valid_ratio: StatsSummary::from(&self.valid_ratio_stats),
            mean_distance_m: StatsSummary::from(&self.distance_stats),
            publish_interval_ms: StatsSummary::from(&self.interval_stats),
            source_counts: self.source_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_records: u64,
    pub total_samples: u64,
    /// 有回波样本占比 (%)
    pub valid_rate: f64,
    pub valid_ratio: StatsSummary,
    pub mean_distance_m: StatsSummary,
    pub publish_interval_ms: StatsSummary,
    pub source_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Depth Record Summary ===")?;
        writeln!(f, "Total records: {}", self.total_records)?;
        writeln!(
            f,
            "Samples: {} ({:.2}% valid)",
            self.total_samples, self.valid_rate
        )?;
        writeln!(f, "Valid ratio per record: {}", self.valid_ratio)?;
        writeln!(f, "Mean distance (m): {}", self.mean_distance_m)?;
        writeln!(f, "Publish interval (ms): {}", self.publish_interval_ms)?;

        if self.source_counts.len() > 1 {
            writeln!(f, "Records per source:")?;
            let mut sources: Vec<_> = self.source_counts.iter().collect();
            sources.sort();
            for (source, count) in sources {
                writeln!(f, "  {source}: {count}")?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
