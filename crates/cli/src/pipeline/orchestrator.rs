//! Pipeline orchestrator - coordinates all components.
//!
//! frame source -> depth processor -> publish channel -> dispatcher -> sinks

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{DepthEvent, DriverConfig, FrameSource};
use depth_processor::{ChannelPublisher, DepthFrameProcessor, ProcessorMetrics};
use observability::{record_depth_metrics, record_publish_queue_depth};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use super::{PipelineStats, StopReason};
use crate::error::CliError;

/// How often the run loop checks whether the source has finished
const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for sinks to drain after the run loop ends
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub driver: DriverConfig,

    /// Maximum number of records to publish (None = unlimited)
    pub max_records: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Channel buffer size between the run loop and the dispatcher
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source finishes, a limit is hit, or `shutdown` resolves
    ///
    /// The processor is stopped and every sink drained before returning.
    #[instrument(name = "pipeline_run", skip_all, fields(sensor_id = %self.config.driver.sensor.id))]
    pub async fn run_until<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let driver = &self.config.driver;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Frame source
        let source = open_source(driver)?;
        info!(source_id = %source.source_id(), kind = ?driver.source.kind, "Frame source opened");

        // Processor
        let processor_metrics = Arc::new(ProcessorMetrics::new());
        let (publisher, records_rx) = ChannelPublisher::bounded(
            driver.processor.publish_queue_capacity,
            Arc::clone(&processor_metrics),
        );
        let publisher = Arc::new(publisher);
        let mut processor = build_processor(
            driver,
            Arc::clone(&source),
            Arc::clone(&publisher),
            Arc::clone(&processor_metrics),
        )?;

        let samples_per_record = processor
            .record_description()
            .and_then(|d| d.point_count())
            .unwrap_or(0);
        info!(
            samples_per_record,
            sampling_time = driver.depth.sampling_time,
            "Depth processor initialized"
        );

        // Dispatcher
        if driver.sinks.is_empty() {
            warn!("No sinks configured - published records will be dropped");
        }
        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DepthEvent>(self.config.buffer_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(driver.sinks.clone(), dispatch_rx)
            .await
            .map_err(CliError::from)
            .context("Failed to create dispatcher")?;
        let sink_metrics = dispatcher.sink_metrics();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks = sink_metrics.len(), "Dispatcher started");

        // Start capture
        processor
            .start()
            .map_err(CliError::from)
            .context("Failed to start depth processor")?;
        info!(max_records = ?self.config.max_records, "Pipeline running");

        let mut stats = PipelineStats {
            samples_per_record,
            ..Default::default()
        };

        let max_records = self.config.max_records;
        let timeout = self.config.timeout;
        let timeout_fut = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout_fut);
        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(SOURCE_POLL_INTERVAL);

        let reason = loop {
            tokio::select! {
                received = records_rx.recv() => {
                    let Ok(event) = received else {
                        break StopReason::SourceFinished;
                    };
                    stats.records_received += 1;
                    record_depth_metrics(&event);
                    stats.record_metrics.update(&event);
                    trace!(timestamp_ms = event.timestamp_ms, "Record forwarded");

                    if dispatch_tx.send(event).await.is_err() {
                        warn!("Dispatcher channel closed");
                        break StopReason::DispatcherClosed;
                    }

                    if max_records.is_some_and(|max| stats.records_received >= max) {
                        info!(records = stats.records_received, "Reached max records limit");
                        break StopReason::MaxRecords;
                    }
                }
                _ = poll.tick() => {
                    record_publish_queue_depth(records_rx.len());
                    if !source.is_capturing() && records_rx.is_empty() {
                        info!("Frame source finished");
                        break StopReason::SourceFinished;
                    }
                }
                _ = &mut timeout_fut => {
                    warn!(timeout_secs = timeout.map(|t| t.as_secs()), "Pipeline timed out");
                    break StopReason::Timeout;
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break StopReason::Shutdown;
                }
            }
        };

        // Shutdown
        info!(?reason, "Shutting down pipeline...");
        stop_processor(processor).await;
        publisher.close();
        let pending = records_rx.len();
        if pending > 0 {
            debug!(pending, "Discarding records still queued after stop");
        }
        drop(dispatch_tx);

        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(dispatched)) => stats.records_dispatched = dispatched,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Timed out waiting for sinks to drain"),
        }

        stats.stop_reason = reason;
        stats.processor = processor_metrics.snapshot();
        stats.sinks = sink_metrics
            .iter()
            .map(|m| (m.sink().to_string(), m.snapshot()))
            .collect();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records = stats.records_received,
            rate = format!("{:.2}", stats.records_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// `stop` sleeps and joins the capture thread, so it runs on the blocking pool
async fn stop_processor(mut processor: DepthFrameProcessor) {
    if let Err(e) = tokio::task::spawn_blocking(move || processor.stop()).await {
        warn!(error = %e, "Processor stop task failed");
    }
}

fn open_source(driver: &DriverConfig) -> crate::error::Result<Arc<dyn FrameSource>> {
    frame_source::create_source(driver)
        .map_err(|e| CliError::source_open(&driver.sensor.id, e.to_string()))
}

fn build_processor(
    driver: &DriverConfig,
    source: Arc<dyn FrameSource>,
    publisher: Arc<ChannelPublisher>,
    metrics: Arc<ProcessorMetrics>,
) -> crate::error::Result<DepthFrameProcessor> {
    let mut processor = DepthFrameProcessor::builder(driver.depth.clone(), source, publisher)
        .source_id(driver.sensor.id.as_str())
        .metrics(metrics)
        .processor_config(&driver.processor)
        .build();
    processor.init()?;
    Ok(processor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, FrameCallback, FrameMode, MockPattern, SinkConfig, SinkType};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 停止需要一段时间的帧源
    struct SlowStopSource;

    impl FrameSource for SlowStopSource {
        fn source_id(&self) -> &str {
            "slow"
        }

        fn set_depth_format(&self, _mode: FrameMode) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        fn start_capture(&self, _callback: FrameCallback) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        fn stop(&self) {
            std::thread::sleep(Duration::from_millis(200));
        }

        fn is_capturing(&self) -> bool {
            false
        }
    }

    fn small_config(base_path: &std::path::Path) -> DriverConfig {
        let mut driver = DriverConfig::default();
        driver.depth.frame_width = 8;
        driver.depth.frame_height = 4;
        driver.depth.point_cloud_scale_down_factor = 2;
        driver.depth.sampling_time = 0.0;
        driver.source.frame_rate_hz = 200.0;
        driver.source.pattern = MockPattern::Constant { raw: 500 };
        driver.sinks = vec![SinkConfig {
            name: "file".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 100,
            params: HashMap::from([(
                "base_path".to_string(),
                base_path.to_string_lossy().to_string(),
            )]),
        }];
        driver
    }

    #[tokio::test]
    async fn test_pipeline_stops_at_max_records() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            driver: small_config(dir.path()),
            max_records: Some(3),
            timeout: Some(Duration::from_secs(5)),
            buffer_size: 16,
            metrics_port: None,
        });

        let stats = pipeline.run_until(std::future::pending()).await.unwrap();

        assert_eq!(stats.stop_reason, StopReason::MaxRecords);
        assert_eq!(stats.records_received, 3);
        assert_eq!(stats.records_dispatched, 3);
        assert_eq!(stats.samples_per_record, 8);
        assert_eq!(stats.sinks.len(), 1);
        assert_eq!(stats.sinks[0].1.write_count, 3);

        let csv = std::fs::read_to_string(dir.path().join("kinect0.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().all(|l| l.split(',').count() == 9));
    }

    #[tokio::test]
    async fn test_pipeline_stops_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineConfig {
            driver: small_config(dir.path()),
            max_records: None,
            timeout: None,
            buffer_size: 16,
            metrics_port: None,
        });

        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let stats = pipeline.run_until(shutdown).await.unwrap();

        assert_eq!(stats.stop_reason, StopReason::Shutdown);
        assert!(stats.processor.frames_received > 0);
    }

    #[tokio::test]
    async fn test_pipeline_reports_missing_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = small_config(dir.path());
        driver.source.kind = contracts::SourceKind::Replay;
        driver.source.replay_path = Some(dir.path().join("no-such-recording"));

        let pipeline = Pipeline::new(PipelineConfig {
            driver,
            max_records: None,
            timeout: None,
            buffer_size: 16,
            metrics_port: None,
        });

        let err = pipeline.run_until(std::future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to open frame source 'kinect0'"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_processor_stop_keeps_runtime_responsive() {
        let source: Arc<dyn FrameSource> = Arc::new(SlowStopSource);
        let mut processor = DepthFrameProcessor::new(
            DriverConfig::default().depth,
            source,
            Arc::new(|_: DepthEvent| {}),
        );
        processor.init().unwrap();
        processor.start().unwrap();

        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        stop_processor(processor).await;
        ticker.abort();
        assert!(ticks.load(Ordering::Relaxed) >= 5);
    }
}
