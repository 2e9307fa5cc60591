//! Mock Kinect
//!
//! Implements `FrameSource`, generates synthetic depth frames on a background thread.
//! Used for testing and development without a physical device.
//! One buffer is allocated per capture run and rewritten in place for every frame.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{
    pack_samples_into, ContractError, DepthFormat, FrameCallback, FrameMode, FrameSource,
    MockPattern, RawFrame, SourceConfig, NO_RETURN_RAW,
};
use tracing::{debug, info, trace};

use crate::capture::CaptureThread;

/// Nearest raw code produced by the ramp pattern
const RAMP_NEAR: u16 = 300;
/// Raw code span of the ramp pattern (stays inside the monotonic calibration range)
const RAMP_SPAN: usize = 700;

/// Mock Kinect configuration
#[derive(Debug, Clone)]
pub struct MockKinectConfig {
    /// Frames per second
    pub frame_rate_hz: f64,
    /// Synthetic frame content
    pub pattern: MockPattern,
    /// Stop after this many frames (None = unbounded)
    pub max_frames: Option<u64>,
}

impl Default for MockKinectConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 30.0,
            pattern: MockPattern::default(),
            max_frames: None,
        }
    }
}

impl From<&SourceConfig> for MockKinectConfig {
    fn from(config: &SourceConfig) -> Self {
        Self {
            frame_rate_hz: config.frame_rate_hz,
            pattern: config.pattern,
            max_frames: None,
        }
    }
}

/// Mock Kinect depth camera
pub struct MockKinect {
    source_id: String,
    config: MockKinectConfig,
    mode: Mutex<FrameMode>,
    capture: CaptureThread,
}

impl MockKinect {
    /// Create new mock device (640x480, 11 bit until `set_depth_format`)
    pub fn new(source_id: impl Into<String>, config: MockKinectConfig) -> Self {
        Self {
            source_id: source_id.into(),
            config,
            mode: Mutex::new(FrameMode::new(640, 480, DepthFormat::D11Bit)),
            capture: CaptureThread::default(),
        }
    }

    /// Create mock device with default configuration
    pub fn with_defaults(source_id: impl Into<String>) -> Self {
        Self::new(source_id, MockKinectConfig::default())
    }

    /// Current depth mode
    pub fn mode(&self) -> FrameMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames delivered since creation
    pub fn frames_emitted(&self) -> u64 {
        self.capture.frames_emitted()
    }

    /// Write one synthetic frame into `buf`
    fn fill_frame(pattern: MockPattern, mode: FrameMode, frame_index: u64, buf: &mut Vec<u8>) {
        let cells = mode.cells();
        match pattern {
            MockPattern::Constant { raw } => {
                pack_samples_into(mode.format, std::iter::repeat_n(raw, cells), buf)
            }
            MockPattern::NoReturn => {
                pack_samples_into(mode.format, std::iter::repeat_n(NO_RETURN_RAW, cells), buf)
            }
            MockPattern::Ramp => {
                let width = (mode.width as usize).max(1);
                let shift = frame_index as usize;
                let samples = (0..cells).map(|i| {
                    let x = (i % width + shift) % width;
                    RAMP_NEAR + (x * RAMP_SPAN / width) as u16
                });
                pack_samples_into(mode.format, samples, buf)
            }
        }
    }
}

impl FrameSource for MockKinect {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn set_depth_format(&self, mode: FrameMode) -> Result<(), ContractError> {
        if mode.width == 0 || mode.height == 0 {
            return Err(ContractError::device(
                &self.source_id,
                format!("unsupported resolution {}x{}", mode.width, mode.height),
            ));
        }
        if self.capture.is_running() {
            return Err(ContractError::device(
                &self.source_id,
                "cannot change depth mode while capturing",
            ));
        }
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        debug!(source_id = %self.source_id, ?mode, "mock depth mode set");
        Ok(())
    }

    fn start_capture(&self, callback: FrameCallback) -> Result<(), ContractError> {
        let source_id = self.source_id.clone();
        let mode = self.mode();
        let pattern = self.config.pattern;
        let max_frames = self.config.max_frames;
        let frame_rate_hz = self.config.frame_rate_hz;
        let interval = Duration::from_secs_f64(1.0 / frame_rate_hz.max(0.001));

        self.capture.spawn(
            format!("mock-kinect-{}", self.source_id),
            &self.source_id,
            move |token| {
                info!(
                    source_id = %source_id,
                    frame_rate_hz,
                    ?pattern,
                    "mock kinect started"
                );

                let mut buf = Vec::with_capacity(mode.frame_len());
                let start = Instant::now();
                let mut frame_index: u64 = 0;

                while token.is_running() {
                    if max_frames.is_some_and(|max| frame_index >= max) {
                        token.finish();
                        break;
                    }

                    // 固定图案只需写一次
                    if frame_index == 0 || pattern == MockPattern::Ramp {
                        Self::fill_frame(pattern, mode, frame_index, &mut buf);
                    }

                    let hint = start.elapsed().as_millis() as u64;
                    callback(RawFrame::new(mode, &buf, hint));
                    token.frame_emitted();
                    trace!(source_id = %source_id, frame_index, "mock frame delivered");

                    frame_index += 1;
                    if !token.sleep_until(start + interval.mul_f64(frame_index as f64)) {
                        break;
                    }
                }

                debug!(source_id = %source_id, frames = frame_index, "mock kinect stopped");
            },
        )
    }

    fn stop(&self) {
        self.capture.stop(&self.source_id);
    }

    fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::pack_samples;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn fast(pattern: MockPattern) -> MockKinectConfig {
        MockKinectConfig {
            frame_rate_hz: 200.0,
            pattern,
            max_frames: None,
        }
    }

    #[test]
    fn test_mock_kinect_delivers_frames() {
        let source = MockKinect::new("kinect0", fast(MockPattern::Constant { raw: 500 }));
        source
            .set_depth_format(FrameMode::new(8, 4, DepthFormat::D11Bit))
            .unwrap();

        let count = Arc::new(AtomicU64::new(0));
        let count_clone = count.clone();
        source
            .start_capture(Arc::new(move |frame| {
                assert_eq!(frame.width(), 8);
                assert!(frame.is_complete());
                assert_eq!(frame.sample_at(0), Some(500));
                count_clone.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        source.stop();

        assert!(count.load(Ordering::Relaxed) > 0);
        assert_eq!(count.load(Ordering::Relaxed), source.frames_emitted());
        assert!(!source.is_capturing());
    }

    #[test]
    fn test_buffer_is_reused_between_frames() {
        let source = MockKinect::new("kinect0", fast(MockPattern::Ramp));
        source
            .set_depth_format(FrameMode::new(16, 8, DepthFormat::D11BitPacked))
            .unwrap();

        let pointers = Arc::new(Mutex::new(HashSet::new()));
        let seen = pointers.clone();
        source
            .start_capture(Arc::new(move |frame| {
                seen.lock().unwrap().insert(frame.data().as_ptr() as usize);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        source.stop();

        assert!(source.frames_emitted() > 1);
        assert_eq!(pointers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_idempotent_start() {
        let source = MockKinect::with_defaults("kinect0");
        let count = Arc::new(AtomicU64::new(0));
        let count1 = count.clone();
        let count2 = count.clone();

        source
            .start_capture(Arc::new(move |_| {
                count1.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        source
            .start_capture(Arc::new(move |_| {
                count2.fetch_add(1000, Ordering::Relaxed);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        source.stop();

        let total = count.load(Ordering::Relaxed);
        assert!(total > 0);
        assert!(total < 1000);
    }

    #[test]
    fn test_mode_change_rejected_while_capturing() {
        let source = MockKinect::new("kinect0", fast(MockPattern::NoReturn));
        source.start_capture(Arc::new(|_| {})).unwrap();
        let err = source
            .set_depth_format(FrameMode::new(320, 240, DepthFormat::D10Bit))
            .unwrap_err();
        assert!(err.to_string().contains("while capturing"));
        source.stop();
        source
            .set_depth_format(FrameMode::new(320, 240, DepthFormat::D10Bit))
            .unwrap();
    }

    #[test]
    fn test_max_frames_finishes_on_its_own() {
        let source = MockKinect::new(
            "kinect0",
            MockKinectConfig {
                max_frames: Some(3),
                ..fast(MockPattern::NoReturn)
            },
        );
        source.start_capture(Arc::new(|_| {})).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(!source.is_capturing());
        assert_eq!(source.frames_emitted(), 3);
        source.stop();
    }

    #[test]
    fn test_ramp_fill_matches_layout() {
        let mode = FrameMode::new(4, 1, DepthFormat::D10Bit);
        let mut buf = Vec::new();
        MockKinect::fill_frame(MockPattern::Ramp, mode, 0, &mut buf);
        let expected = pack_samples(DepthFormat::D10Bit, &[300, 475, 650, 825]);
        assert_eq!(buf, expected);
    }
}
