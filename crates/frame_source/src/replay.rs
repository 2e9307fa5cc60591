//! Replay Kinect - 从录制目录回放原始深度帧
//!
//! 录制目录结构：
//!
//! ```text
//! recording/
//! ├── manifest.json
//! ├── frame_000000.raw
//! ├── frame_000001.raw
//! └── ...
//! ```
//!
//! 按录制时间戳回放，读帧时复用同一块缓冲区。

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    ContractError, DepthFormat, FrameCallback, FrameMode, FrameSource, RawFrame, SourceConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capture::{CaptureThread, CaptureToken};
use crate::error::{FrameSourceError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

/// Replay 配置
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// 回放速度倍率 (1.0 = 原速)
    pub speed_multiplier: f64,

    /// 是否循环回放
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            loop_playback: false,
        }
    }
}

impl From<&SourceConfig> for ReplayConfig {
    fn from(config: &SourceConfig) -> Self {
        Self {
            speed_multiplier: config.replay_speed,
            loop_playback: config.loop_playback,
        }
    }
}

/// 录制 manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub depth_format: DepthFormat,
    pub frames: Vec<RecordedFrame>,
}

impl RecordingManifest {
    pub fn mode(&self) -> FrameMode {
        FrameMode::new(self.width, self.height, self.depth_format)
    }
}

/// manifest 中的一帧
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// 录制时刻 (毫秒，任意起点)
    pub timestamp_ms: u64,
    /// 相对录制目录的文件名
    pub file: String,
}

/// Replay Kinect
pub struct ReplayKinect {
    source_id: String,
    root: PathBuf,
    manifest: Arc<RecordingManifest>,
    config: ReplayConfig,
    capture: CaptureThread,
}

impl ReplayKinect {
    /// 从录制目录加载
    #[instrument(name = "replay_kinect_load", skip(source_id, config), fields(path = %root.display()))]
    pub fn load(root: &Path, source_id: impl Into<String>, config: ReplayConfig) -> Result<Self> {
        let source_id = source_id.into();
        let manifest_path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)?;
        let mut manifest: RecordingManifest = serde_json::from_str(&content)
            .map_err(|e| FrameSourceError::manifest(&manifest_path, e.to_string()))?;

        if manifest.width == 0 || manifest.height == 0 {
            return Err(FrameSourceError::manifest(
                &manifest_path,
                format!("invalid resolution {}x{}", manifest.width, manifest.height),
            ));
        }
        manifest.frames.sort_by_key(|f| f.timestamp_ms);

        info!(
            source_id = %source_id,
            frames = manifest.frames.len(),
            width = manifest.width,
            height = manifest.height,
            depth_format = %manifest.depth_format,
            "loaded depth recording"
        );

        Ok(Self {
            source_id,
            root: root.to_path_buf(),
            manifest: Arc::new(manifest),
            config,
            capture: CaptureThread::default(),
        })
    }

    pub fn manifest(&self) -> &RecordingManifest {
        &self.manifest
    }

    /// Frames delivered since creation
    pub fn frames_emitted(&self) -> u64 {
        self.capture.frames_emitted()
    }

    fn play(
        token: CaptureToken,
        source_id: String,
        root: PathBuf,
        manifest: Arc<RecordingManifest>,
        config: ReplayConfig,
        callback: FrameCallback,
    ) {
        let mode = manifest.mode();
        let speed = config.speed_multiplier.max(0.1);
        let mut buf = Vec::with_capacity(mode.frame_len());

        debug!(source_id = %source_id, "replay thread started");

        'playback: loop {
            let Some(first) = manifest.frames.first() else {
                warn!(source_id = %source_id, "recording has no frames");
                break;
            };

            let start = Instant::now();
            for frame in &manifest.frames {
                let offset = Duration::from_millis(frame.timestamp_ms - first.timestamp_ms);
                if !token.sleep_until(start + offset.div_f64(speed)) {
                    debug!(source_id = %source_id, "replay stopped");
                    break 'playback;
                }

                if let Err(e) = read_into(&root.join(&frame.file), &mut buf) {
                    warn!(source_id = %source_id, file = %frame.file, error = %e, "failed to read frame");
                    continue;
                }
                callback(RawFrame::new(mode, &buf, frame.timestamp_ms));
                token.frame_emitted();
            }

            if !config.loop_playback {
                info!(source_id = %source_id, "replay completed");
                break;
            }
            debug!(source_id = %source_id, "looping replay");
        }

        token.finish();
    }
}

/// 读取整个文件到 `buf`，保留其容量
fn read_into(path: &Path, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    File::open(path)?.read_to_end(buf)?;
    Ok(())
}

impl FrameSource for ReplayKinect {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    /// 录制的模式是固定的，只接受与之相同的请求
    fn set_depth_format(&self, mode: FrameMode) -> std::result::Result<(), ContractError> {
        let recorded = self.manifest.mode();
        if mode != recorded {
            return Err(ContractError::device(
                &self.source_id,
                format!(
                    "recording is {}x{} {}, requested {}x{} {}",
                    recorded.width,
                    recorded.height,
                    recorded.format,
                    mode.width,
                    mode.height,
                    mode.format
                ),
            ));
        }
        Ok(())
    }

    fn start_capture(&self, callback: FrameCallback) -> std::result::Result<(), ContractError> {
        let source_id = self.source_id.clone();
        let root = self.root.clone();
        let manifest = self.manifest.clone();
        let config = self.config.clone();

        self.capture.spawn(
            format!("replay-kinect-{}", self.source_id),
            &self.source_id,
            move |token| Self::play(token, source_id, root, manifest, config, callback),
        )
    }

    fn stop(&self) {
        self.capture.stop(&self.source_id);
    }

    fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }
}

/// 录制写入器
///
/// 逐帧写原始缓冲区，`finish` 时写 manifest。
pub struct RecordingWriter {
    root: PathBuf,
    mode: FrameMode,
    frames: Vec<RecordedFrame>,
}

impl RecordingWriter {
    pub fn create(root: &Path, mode: FrameMode) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            mode,
            frames: Vec::new(),
        })
    }

    /// 写一帧；长度必须等于该模式的整帧长度
    pub fn write_frame(&mut self, timestamp_ms: u64, data: &[u8]) -> Result<()> {
        let expected = self.mode.frame_len();
        if data.len() != expected {
            return Err(FrameSourceError::Contract(ContractError::frame_decode(
                "recording",
                format!("frame is {} bytes, expected {expected}", data.len()),
            )));
        }
        let file = format!("frame_{:06}.raw", self.frames.len());
        fs::write(self.root.join(&file), data)?;
        self.frames.push(RecordedFrame { timestamp_ms, file });
        Ok(())
    }

    pub fn finish(self) -> Result<RecordingManifest> {
        let manifest = RecordingManifest {
            version: MANIFEST_VERSION,
            width: self.mode.width,
            height: self.mode.height,
            depth_format: self.mode.format,
            frames: self.frames,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| FrameSourceError::manifest(self.root.join(MANIFEST_FILE), e.to_string()))?;
        fs::write(self.root.join(MANIFEST_FILE), json)?;
        Ok(manifest)
    }
}
