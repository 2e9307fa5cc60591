//! DriverConfig - Config Loader 输出
//!
//! 描述驱动的完整配置：传感器身份、深度帧几何、帧源、处理器参数、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use validator::Validate;

use crate::DepthFormat;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的驱动配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DriverConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 传感器身份
    #[serde(default)]
    #[validate(nested)]
    pub sensor: SensorConfig,

    /// 深度输出配置
    #[serde(default)]
    #[validate(nested)]
    pub depth: DepthConfig,

    /// 帧源配置
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    /// 处理器运行参数
    #[serde(default)]
    #[validate(nested)]
    pub processor: ProcessorConfig,

    /// 输出路由配置
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

/// 传感器身份
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorConfig {
    /// 发布事件时携带的源标识
    #[serde(default = "default_sensor_id")]
    #[validate(length(min = 1, message = "sensor id cannot be empty"))]
    pub id: String,

    /// 设备序号 (多台 Kinect 时使用)
    #[serde(default)]
    pub device_index: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: default_sensor_id(),
            device_index: 0,
        }
    }
}

fn default_sensor_id() -> String {
    "kinect0".to_string()
}

/// 深度输出配置
///
/// 几何字段保留有符号类型：配置里出现的 0 或负数需要被显式拒绝（宽高）
/// 或归一化（缩放因子），而不是在反序列化阶段被吞掉。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DepthConfig {
    /// 帧宽度 (像素)
    #[serde(default = "default_frame_width")]
    #[validate(range(min = 1, message = "frame_width must be > 0"))]
    pub frame_width: i32,

    /// 帧高度 (像素)
    #[serde(default = "default_frame_height")]
    #[validate(range(min = 1, message = "frame_height must be > 0"))]
    pub frame_height: i32,

    /// 点云降采样步长，<= 0 时按 1 处理
    #[serde(default = "default_scale_down_factor")]
    pub point_cloud_scale_down_factor: i32,

    /// 两次发布之间的最小间隔 (秒)
    #[serde(default = "default_sampling_time")]
    #[validate(range(min = 0.0, message = "sampling_time must be >= 0"))]
    pub sampling_time: f64,

    /// 设备深度格式
    #[serde(default)]
    pub depth_format: DepthFormat,

    /// 是否在记录中附带逐点有效性掩码
    #[serde(default)]
    pub emit_validity_mask: bool,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            point_cloud_scale_down_factor: default_scale_down_factor(),
            sampling_time: default_sampling_time(),
            depth_format: DepthFormat::default(),
            emit_validity_mask: false,
        }
    }
}

impl DepthConfig {
    /// Sampling interval in milliseconds (truncating, negative values clamp to 0)
    pub fn sampling_interval_millis(&self) -> u64 {
        (self.sampling_time * 1000.0) as u64
    }
}

fn default_frame_width() -> i32 {
    640
}

fn default_frame_height() -> i32 {
    480
}

fn default_scale_down_factor() -> i32 {
    1
}

fn default_sampling_time() -> f64 {
    1.0
}

/// 帧源配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// 帧源类型
    #[serde(default)]
    pub kind: SourceKind,

    /// 出帧频率 (Hz)，仅 mock
    #[serde(default = "default_frame_rate")]
    #[validate(range(exclusive_min = 0.0, message = "frame_rate_hz must be > 0"))]
    pub frame_rate_hz: f64,

    /// 合成帧图案，仅 mock
    #[serde(default)]
    pub pattern: MockPattern,

    /// 录制目录，仅 replay
    #[serde(default)]
    pub replay_path: Option<PathBuf>,

    /// 回放速度倍率 (1.0 = 原速)
    #[serde(default = "default_replay_speed")]
    #[validate(range(exclusive_min = 0.0, message = "replay_speed must be > 0"))]
    pub replay_speed: f64,

    /// 是否循环回放
    #[serde(default)]
    pub loop_playback: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            frame_rate_hz: default_frame_rate(),
            pattern: MockPattern::default(),
            replay_path: None,
            replay_speed: default_replay_speed(),
            loop_playback: false,
        }
    }
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_replay_speed() -> f64 {
    1.0
}

/// 帧源类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// 合成帧
    #[default]
    Mock,
    /// 回放录制的原始帧
    Replay,
}

/// 合成帧图案
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MockPattern {
    /// 所有像素为同一原始值
    Constant { raw: u16 },
    /// 沿 x 方向线性递增的原始值
    #[default]
    Ramp,
    /// 全部为无回波哨兵值
    NoReturn,
}

/// 处理器运行参数
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessorConfig {
    /// 发布队列容量
    #[serde(default = "default_publish_queue_capacity")]
    #[validate(range(min = 1, message = "publish_queue_capacity must be > 0"))]
    pub publish_queue_capacity: usize,

    /// stop 等待在途回调完成的上限 (毫秒)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            publish_queue_capacity: default_publish_queue_capacity(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

fn default_publish_queue_capacity() -> usize {
    64
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink 名称
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be > 0"))]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出
    File,
    /// 网络输出 (UDP)
    Network,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_interval_from_seconds() {
        let mut depth = DepthConfig::default();
        depth.sampling_time = 0.25;
        assert_eq!(depth.sampling_interval_millis(), 250);

        depth.sampling_time = 0.0;
        assert_eq!(depth.sampling_interval_millis(), 0);

        depth.sampling_time = -3.0;
        assert_eq!(depth.sampling_interval_millis(), 0);
    }

    #[test]
    fn defaults_are_valid() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.depth.frame_width, 640);
        assert_eq!(config.depth.frame_height, 480);
        assert_eq!(config.sensor.id, "kinect0");
    }

    #[test]
    fn zero_width_is_rejected() {
        let mut config = DriverConfig::default();
        config.depth.frame_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_scale_factor_is_not_a_validation_error() {
        let mut config = DriverConfig::default();
        config.depth.point_cloud_scale_down_factor = -4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mock_pattern_serde() {
        let pattern: MockPattern = serde_json::from_str(r#"{"kind":"constant","raw":500}"#).unwrap();
        assert_eq!(pattern, MockPattern::Constant { raw: 500 });

        let pattern: MockPattern = serde_json::from_str(r#"{"kind":"no_return"}"#).unwrap();
        assert_eq!(pattern, MockPattern::NoReturn);
    }
}
