//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置加载往返
//! - 模拟 e2e 测试（无需 Kinect 设备）
//! - 录制回放测试

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DriverConfig, RecordDescriptor, SinkType, SourceKind};

    #[test]
    fn test_default_config_round_trip() {
        let config = DriverConfig::default();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        assert_eq!(parsed.sensor.id, config.sensor.id);
        assert_eq!(parsed.depth.frame_width, 640);
        assert_eq!(parsed.depth.frame_height, 480);
        assert_eq!(
            parsed.depth.point_cloud_scale_down_factor,
            config.depth.point_cloud_scale_down_factor
        );
        ConfigLoader::validate(&parsed).unwrap();
    }

    #[test]
    fn test_full_toml_config() {
        let toml = r#"
[sensor]
id = "kinect-lab"

[depth]
frame_width = 320
frame_height = 240
point_cloud_scale_down_factor = 8
sampling_time = 0.5
depth_format = "d10_bit"

[source]
kind = "replay"
replay_path = "recordings/lab"

[[sinks]]
name = "csv"
sink_type = "file"
[sinks.params]
base_path = "out"
"#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.sensor.id, "kinect-lab");
        assert_eq!(config.source.kind, SourceKind::Replay);
        assert_eq!(config.sinks[0].sink_type, SinkType::File);
        assert_eq!(config.sinks[0].queue_capacity, 100);

        let plan = depth_processor::plan(
            config.depth.frame_width,
            config.depth.frame_height,
            config.depth.point_cloud_scale_down_factor,
        );
        let descriptor = RecordDescriptor::depth_point_cloud(plan.sample_count);
        assert_eq!(descriptor.point_count(), Some(40 * 30));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use contracts::{
        pack_samples, DepthConfig, DepthEvent, DepthFormat, DriverConfig, FrameMode, FrameSource,
        MockPattern, SinkConfig, SinkType, SourceKind,
    };
    use depth_processor::{ChannelPublisher, DepthFrameProcessor, ProcessorMetrics, ProcessorState};
    use dispatcher::create_dispatcher;
    use frame_source::{create_source, RecordingWriter};
    use observability::RecordMetricsAggregator;
    use tokio::sync::mpsc;

    fn small_depth() -> DepthConfig {
        DepthConfig {
            frame_width: 8,
            frame_height: 4,
            point_cloud_scale_down_factor: 2,
            sampling_time: 0.0,
            ..DepthConfig::default()
        }
    }

    /// 等待源自行结束
    fn wait_until_finished(source: &dyn FrameSource, limit: Duration) {
        let deadline = Instant::now() + limit;
        while source.is_capturing() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// End-to-end test: MockKinect -> DepthFrameProcessor -> Dispatcher -> FileSink
    #[tokio::test]
    async fn test_e2e_mock_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = DriverConfig {
            depth: small_depth(),
            ..DriverConfig::default()
        };
        driver.source.frame_rate_hz = 100.0;
        driver.source.pattern = MockPattern::Constant { raw: 500 };

        let source = create_source(&driver).unwrap();
        let metrics = Arc::new(ProcessorMetrics::new());
        let (publisher, records_rx) = ChannelPublisher::bounded(64, metrics.clone());
        let publisher = Arc::new(publisher);
        let mut processor =
            DepthFrameProcessor::builder(driver.depth.clone(), source.clone(), publisher.clone())
                .metrics(metrics.clone())
                .build();
        processor.init().unwrap();

        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DepthEvent>(16);
        let sink_configs = vec![SinkConfig {
            name: "csv".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 50,
            params: HashMap::from([(
                "base_path".to_string(),
                dir.path().to_string_lossy().to_string(),
            )]),
        }];
        let dispatcher = create_dispatcher(sink_configs, dispatch_rx).await.unwrap();
        let sink_metrics = dispatcher.sink_metrics();
        let dispatcher_handle = dispatcher.spawn();

        processor.start().unwrap();
        assert_eq!(processor.state(), ProcessorState::Running);

        let target = 5;
        let mut aggregator = RecordMetricsAggregator::new();
        let forward = async {
            for _ in 0..target {
                let event = records_rx.recv().await.unwrap();
                aggregator.update(&event);
                dispatch_tx.send(event).await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), forward)
            .await
            .expect("pipeline timed out");

        processor.stop();
        publisher.close();
        drop(dispatch_tx);
        let dispatched = tokio::time::timeout(Duration::from_secs(2), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(dispatched, target);
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(!source.is_capturing());
        assert_eq!(sink_metrics[0].snapshot().write_count, target);

        let summary = aggregator.summary();
        assert_eq!(summary.total_records, target);
        assert_eq!(summary.total_samples, target * 8);

        let csv = std::fs::read_to_string(dir.path().join("kinect0.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), target as usize);
        let expected = depth_processor::to_meters(500).to_string();
        for line in lines {
            let tokens: Vec<&str> = line.split(',').collect();
            assert_eq!(tokens.len(), 9);
            assert!(tokens[0].ends_with('Z'));
            assert!(tokens[1..].iter().all(|t| *t == expected));
        }
    }

    /// Recording -> ReplayKinect -> DepthFrameProcessor
    #[test]
    fn test_replay_recording_through_processor() {
        let dir = tempfile::tempdir().unwrap();
        let mode = FrameMode::new(8, 4, DepthFormat::D11Bit);
        let raws: [u16; 4] = [500, 600, 2047, 700];

        let mut writer = RecordingWriter::create(dir.path(), mode).unwrap();
        for (i, raw) in raws.iter().enumerate() {
            writer
                .write_frame(i as u64 * 20, &pack_samples(mode.format, &[*raw; 32]))
                .unwrap();
        }
        writer.finish().unwrap();

        let mut driver = DriverConfig {
            depth: DepthConfig {
                emit_validity_mask: true,
                ..small_depth()
            },
            ..DriverConfig::default()
        };
        driver.source.kind = SourceKind::Replay;
        driver.source.replay_path = Some(dir.path().to_path_buf());

        let source = create_source(&driver).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let collected = events.clone();
        let publisher = Arc::new(move |event: DepthEvent| collected.lock().unwrap().push(event));

        let mut processor = DepthFrameProcessor::new(driver.depth.clone(), source.clone(), publisher);
        processor.init().unwrap();
        // 第一帧必须晚于 init 时的门限基准
        std::thread::sleep(Duration::from_millis(5));
        processor.start().unwrap();
        wait_until_finished(source.as_ref(), Duration::from_secs(2));
        processor.stop();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), raws.len());
        assert!(events
            .windows(2)
            .all(|w| w[0].timestamp_ms < w[1].timestamp_ms));

        for (event, raw) in events.iter().zip(raws) {
            assert_eq!(event.record.samples.len(), 8);
            assert_eq!(event.grid.len(), 8);
            assert_eq!(event.source_id.as_str(), "kinect0");

            let validity = event.record.validity.as_ref().unwrap();
            if raw == 2047 {
                assert!(event.record.samples.iter().all(|s| *s == 0.0));
                assert!(validity.iter().all(|v| !v));
            } else {
                assert!(validity.iter().all(|v| *v));
                assert!(event.record.samples.iter().all(|s| *s > 0.0));
            }
        }
        assert_eq!(
            processor.latest_record_time(),
            Some(events[3].timestamp_ms as f64 / 1000.0)
        );
    }

    /// 发布者卡住时，stop 仍在 stop_timeout 加帧源的 join 上限内返回
    #[test]
    fn test_stop_is_bounded_with_blocked_publisher() {
        let mut driver = DriverConfig {
            depth: small_depth(),
            ..DriverConfig::default()
        };
        driver.source.frame_rate_hz = 200.0;

        let source = create_source(&driver).unwrap();
        let published = Arc::new(AtomicU64::new(0));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let counter = published.clone();
        let publisher = Arc::new(move |_: DepthEvent| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = entered_tx.lock().unwrap().send(());
                std::thread::sleep(Duration::from_secs(2));
            }
        });

        let stop_timeout = Duration::from_millis(100);
        let mut processor = DepthFrameProcessor::builder(driver.depth.clone(), source.clone(), publisher)
            .stop_timeout(stop_timeout)
            .build();
        processor.init().unwrap();
        processor.start().unwrap();
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let started = Instant::now();
        processor.stop();
        let elapsed = started.elapsed();
        assert!(elapsed >= stop_timeout);
        assert!(elapsed < Duration::from_secs(1), "stop took {elapsed:?}");
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(!source.is_capturing());

        // 卡住的回调返回后，采集线程退出，不再发布
        let after_stop = published.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2500));
        assert_eq!(published.load(Ordering::SeqCst), after_stop);
        assert_eq!(after_stop, 1);
    }

    /// 录制模式与配置不符时 init 失败，处理器保持 Uninitialized
    #[test]
    fn test_replay_mode_mismatch_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let mode = FrameMode::new(4, 2, DepthFormat::D11Bit);
        let mut writer = RecordingWriter::create(dir.path(), mode).unwrap();
        writer
            .write_frame(0, &pack_samples(mode.format, &[500; 8]))
            .unwrap();
        writer.finish().unwrap();

        let mut driver = DriverConfig {
            depth: small_depth(),
            ..DriverConfig::default()
        };
        driver.source.kind = SourceKind::Replay;
        driver.source.replay_path = Some(dir.path().to_path_buf());

        let source = create_source(&driver).unwrap();
        let mut processor =
            DepthFrameProcessor::new(driver.depth.clone(), source, Arc::new(|_: DepthEvent| {}));
        assert!(processor.init().is_err());
        assert_eq!(processor.state(), ProcessorState::Uninitialized);
    }
}
