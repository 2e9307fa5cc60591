//! Depth Frame Processor
//!
//! 显式状态机 `Uninitialized -> Ready -> Running -> Stopped`。
//!
//! 帧在帧源的采集线程中同步处理：速率门限 -> 降采样 -> 标定 -> 组装记录 ->
//! 更新最新记录快照 -> 发布。回调只持有共享状态的 `Arc`，原始缓冲区在回调
//! 返回后即归还帧源。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    DataEncoding, DepthConfig, DepthEvent, DepthRecord, EventPublisher, FrameCallback,
    FrameMode, FrameSource, ProcessorConfig, RawFrame, RecordDescriptor, SourceId,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::calibration::{is_valid, to_meters};
use crate::clock::{Clock, SystemClock};
use crate::decimation::{plan, DecimationPlan};
use crate::error::{ProcessorError, Result};
use crate::gate::RateGate;
use crate::metrics::{names, ProcessorMetrics};

/// 最新记录的快照类型
pub type LatestRecord = Option<Arc<DepthRecord>>;

const NO_RECORD: u64 = u64::MAX;

/// 处理器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 一次 start 期间不变的帧处理参数
#[derive(Debug, Clone)]
struct FramePlan {
    mode: FrameMode,
    decimation: DecimationPlan,
    emit_validity_mask: bool,
}

/// 控制线程与采集线程共享的状态
struct Shared {
    source_id: SourceId,
    active: AtomicBool,
    in_flight: AtomicUsize,
    gate: RateGate,
    latest: watch::Sender<LatestRecord>,
    latest_time_millis: AtomicU64,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<ProcessorMetrics>,
}

/// 回调期间持有，drop 时归还在途计数
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 深度帧处理器
pub struct DepthFrameProcessor {
    config: DepthConfig,
    stop_timeout: Duration,
    source: Arc<dyn FrameSource>,
    shared: Arc<Shared>,
    state: ProcessorState,
    plan: Option<Arc<FramePlan>>,
    descriptor: Option<RecordDescriptor>,
}

/// 处理器构建器
pub struct DepthFrameProcessorBuilder {
    config: DepthConfig,
    source: Arc<dyn FrameSource>,
    publisher: Arc<dyn EventPublisher>,
    source_id: Option<SourceId>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ProcessorMetrics>,
    stop_timeout: Duration,
}

impl DepthFrameProcessorBuilder {
    /// 覆盖发布事件携带的源 ID (默认取帧源的 `source_id()`)
    pub fn source_id(mut self, source_id: impl Into<SourceId>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 与 `ChannelPublisher` 共享计数器
    pub fn metrics(mut self, metrics: Arc<ProcessorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// 应用 `[processor]` 配置段
    pub fn processor_config(self, config: &ProcessorConfig) -> Self {
        self.stop_timeout(Duration::from_millis(config.stop_timeout_ms))
    }

    pub fn build(self) -> DepthFrameProcessor {
        let source_id = self
            .source_id
            .unwrap_or_else(|| SourceId::new(self.source.source_id()));
        let (latest, _) = watch::channel(None);

        DepthFrameProcessor {
            config: self.config,
            stop_timeout: self.stop_timeout,
            source: self.source,
            shared: Arc::new(Shared {
                source_id,
                active: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                gate: RateGate::default(),
                latest,
                latest_time_millis: AtomicU64::new(NO_RECORD),
                clock: self.clock,
                publisher: self.publisher,
                metrics: self.metrics,
            }),
            state: ProcessorState::Uninitialized,
            plan: None,
            descriptor: None,
        }
    }
}

impl DepthFrameProcessor {
    /// 以默认设置创建处理器 (Uninitialized)
    pub fn new(
        config: DepthConfig,
        source: Arc<dyn FrameSource>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::builder(config, source, publisher).build()
    }

    /// 源 ID 默认取帧源的 `source_id()`，时钟默认为系统墙钟
    pub fn builder(
        config: DepthConfig,
        source: Arc<dyn FrameSource>,
        publisher: Arc<dyn EventPublisher>,
    ) -> DepthFrameProcessorBuilder {
        DepthFrameProcessorBuilder {
            config,
            source,
            publisher,
            source_id: None,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(ProcessorMetrics::new()),
            stop_timeout: Duration::from_millis(ProcessorConfig::default().stop_timeout_ms),
        }
    }

    /// Uninitialized | Ready | Stopped -> Ready
    #[instrument(name = "processor_init", skip(self), fields(source_id = %self.shared.source_id))]
    pub fn init(&mut self) -> Result<()> {
        if self.state == ProcessorState::Running {
            return Err(ProcessorError::InvalidTransition {
                operation: "init",
                state: self.state,
            });
        }

        let DepthConfig {
            frame_width,
            frame_height,
            point_cloud_scale_down_factor,
            depth_format,
            emit_validity_mask,
            ..
        } = self.config;

        if frame_width <= 0 || frame_height <= 0 {
            return Err(ProcessorError::configuration(format!(
                "frame geometry must be positive, got {frame_width}x{frame_height}"
            )));
        }
        if point_cloud_scale_down_factor <= 0 {
            warn!(
                factor = point_cloud_scale_down_factor,
                "point_cloud_scale_down_factor <= 0, using 1"
            );
        }

        let decimation = match &self.plan {
            Some(existing)
                if existing
                    .decimation
                    .matches(frame_width, frame_height, point_cloud_scale_down_factor) =>
            {
                existing.decimation
            }
            _ => plan(frame_width, frame_height, point_cloud_scale_down_factor),
        };
        let mode = FrameMode::new(decimation.width, decimation.height, depth_format);

        self.source
            .set_depth_format(mode)
            .map_err(ProcessorError::Device)?;

        let now = self.shared.clock.now_millis();
        self.shared
            .gate
            .reset(self.config.sampling_interval_millis(), now);

        self.descriptor = Some(RecordDescriptor::depth_point_cloud(decimation.sample_count));
        self.plan = Some(Arc::new(FramePlan {
            mode,
            decimation,
            emit_validity_mask,
        }));
        self.state = ProcessorState::Ready;

        info!(
            width = decimation.width,
            height = decimation.height,
            stride = decimation.stride,
            sample_count = decimation.sample_count,
            depth_format = %depth_format,
            sampling_interval_ms = self.shared.gate.interval_millis(),
            "depth processor initialized"
        );
        Ok(())
    }

    /// Ready | Stopped -> Running
    #[instrument(name = "processor_start", skip(self), fields(source_id = %self.shared.source_id))]
    pub fn start(&mut self) -> Result<()> {
        let plan = match (self.state, &self.plan) {
            (ProcessorState::Running, _) => return Ok(()),
            (ProcessorState::Ready | ProcessorState::Stopped, Some(plan)) => plan.clone(),
            (state, _) => {
                return Err(ProcessorError::InvalidTransition {
                    operation: "start",
                    state,
                });
            }
        };

        self.shared.active.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let callback: FrameCallback = Arc::new(move |frame: RawFrame<'_>| {
            handle_frame(&shared, &plan, frame);
        });

        if let Err(e) = self.source.start_capture(callback) {
            self.shared.active.store(false, Ordering::SeqCst);
            return Err(ProcessorError::Device(e));
        }

        self.state = ProcessorState::Running;
        info!("depth capture started");
        Ok(())
    }

    /// Running -> Stopped
    ///
    /// 先关闭回调入口，最多等待 `stop_timeout` 让在途回调结束，再通知帧源停止。
    /// 返回后不会再有记录被发布 (除非等待在途回调超时，此时会记录警告)。
    /// 非 Running 状态下调用为空操作。
    #[instrument(name = "processor_stop", skip(self), fields(source_id = %self.shared.source_id))]
    pub fn stop(&mut self) {
        if self.state != ProcessorState::Running {
            return;
        }

        self.shared.active.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + self.stop_timeout;
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "in-flight frame callback did not finish before stop timeout"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        self.source.stop();
        self.state = ProcessorState::Stopped;
        info!(metrics = ?self.shared.metrics.snapshot(), "depth capture stopped");
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn source_id(&self) -> &SourceId {
        &self.shared.source_id
    }

    /// 最近一次发布的记录
    pub fn latest_record(&self) -> LatestRecord {
        self.shared.latest.borrow().clone()
    }

    /// 最近一次发布记录的时间戳 (秒)
    pub fn latest_record_time(&self) -> Option<f64> {
        match self.shared.latest_time_millis.load(Ordering::Acquire) {
            NO_RECORD => None,
            millis => Some(millis as f64 / 1000.0),
        }
    }

    /// 订阅最新记录；订阅时即可读到当前快照
    pub fn subscribe(&self) -> watch::Receiver<LatestRecord> {
        self.shared.latest.subscribe()
    }

    /// 记录描述；init 之前为 None
    pub fn record_description(&self) -> Option<&RecordDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn recommended_encoding(&self) -> DataEncoding {
        DataEncoding::default()
    }

    /// 当前降采样计划；init 之前为 None
    pub fn decimation_plan(&self) -> Option<DecimationPlan> {
        self.plan.as_ref().map(|p| p.decimation)
    }

    pub fn metrics(&self) -> Arc<ProcessorMetrics> {
        self.shared.metrics.clone()
    }
}

impl Drop for DepthFrameProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 采集线程中的单帧处理
fn handle_frame(shared: &Shared, plan: &FramePlan, frame: RawFrame<'_>) {
    if !shared.active.load(Ordering::SeqCst) {
        return;
    }
    shared.in_flight.fetch_add(1, Ordering::SeqCst);
    let _in_flight = InFlight(&shared.in_flight);
    // stop 可能发生在上面两步之间
    if !shared.active.load(Ordering::SeqCst) {
        return;
    }

    shared.metrics.record_received();
    let now = shared.clock.now_millis();
    if !shared.gate.should_publish(now) {
        shared.metrics.record_gated();
        trace!(source_id = %shared.source_id, now_ms = now, "frame gated");
        return;
    }

    let started = Instant::now();
    let record = match build_record(&shared.source_id, plan, &frame, now) {
        Ok(record) => Arc::new(record),
        Err(e) => {
            shared.metrics.record_frame_error();
            warn!(source_id = %shared.source_id, error = %e, "depth frame dropped");
            return;
        }
    };
    metrics::histogram!(names::FRAME_PROCESSING_MS).record(started.elapsed().as_secs_f64() * 1000.0);

    if !shared.active.load(Ordering::SeqCst) {
        return;
    }

    shared.latest_time_millis.store(now, Ordering::Release);
    shared.latest.send_replace(Some(record.clone()));
    shared.publisher.publish(DepthEvent::new(
        shared.source_id.clone(),
        now,
        plan.decimation.grid(),
        record,
    ));
    shared.gate.mark_published(now);
    shared.metrics.record_published();
    debug!(source_id = %shared.source_id, timestamp_ms = now, "depth record published");
}

/// 降采样 + 标定，按扫描顺序输出
fn build_record(
    source_id: &SourceId,
    plan: &FramePlan,
    frame: &RawFrame<'_>,
    now_millis: u64,
) -> Result<DepthRecord> {
    if frame.mode() != plan.mode {
        let got = frame.mode();
        return Err(ProcessorError::frame_processing(
            source_id.as_str(),
            format!(
                "frame mode {}x{} {} does not match configured {}x{} {}",
                got.width, got.height, got.format, plan.mode.width, plan.mode.height, plan.mode.format
            ),
        ));
    }
    if !frame.is_complete() {
        return Err(ProcessorError::frame_processing(
            source_id.as_str(),
            format!(
                "truncated frame: {} bytes, expected {}",
                frame.data().len(),
                plan.mode.frame_len()
            ),
        ));
    }

    let count = plan.decimation.sample_count;
    let mut samples = Vec::with_capacity(count);
    let mut validity = plan.emit_validity_mask.then(|| Vec::with_capacity(count));

    for index in plan.decimation.indices() {
        let raw = frame.sample_at(index).ok_or_else(|| {
            ProcessorError::frame_processing(source_id.as_str(), format!("sample {index} out of range"))
        })?;
        samples.push(to_meters(raw));
        if let Some(mask) = validity.as_mut() {
            mask.push(is_valid(raw));
        }
    }

    let record = DepthRecord::new(now_millis as f64 / 1000.0, samples);
    Ok(match validity {
        Some(mask) => record.with_validity(mask),
        None => record,
    })
}
