//! 帧源工厂
//!
//! 按 `SourceConfig.kind` 构造 Mock 或 Replay 帧源。

use std::sync::Arc;

use contracts::{DriverConfig, FrameSource, SourceKind};
use tracing::{info, instrument};

use crate::error::{FrameSourceError, Result};
use crate::mock::{MockKinect, MockKinectConfig};
use crate::replay::{ReplayConfig, ReplayKinect};

/// 从驱动配置创建帧源
#[instrument(
    name = "frame_source_create",
    skip(config),
    fields(sensor_id = %config.sensor.id, kind = ?config.source.kind)
)]
pub fn create_source(config: &DriverConfig) -> Result<Arc<dyn FrameSource>> {
    let source_id = config.sensor.id.clone();
    let source: Arc<dyn FrameSource> = match config.source.kind {
        SourceKind::Mock => Arc::new(MockKinect::new(
            source_id,
            MockKinectConfig::from(&config.source),
        )),
        SourceKind::Replay => {
            let path = config.source.replay_path.as_deref().ok_or_else(|| {
                FrameSourceError::manifest("", "replay source requires source.replay_path")
            })?;
            Arc::new(ReplayKinect::load(
                path,
                source_id,
                ReplayConfig::from(&config.source),
            )?)
        }
    };

    info!(source_id = %source.source_id(), "frame source created");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DepthFormat, FrameMode};

    #[test]
    fn test_create_mock_source() {
        let config = DriverConfig::default();
        let source = create_source(&config).unwrap();
        assert_eq!(source.source_id(), "kinect0");
        assert!(!source.is_capturing());
    }

    #[test]
    fn test_replay_without_path_fails() {
        let mut config = DriverConfig::default();
        config.source.kind = SourceKind::Replay;
        let result = create_source(&config);
        assert!(matches!(result, Err(FrameSourceError::Manifest { .. })));
    }

    #[test]
    fn test_create_replay_source() {
        let dir = tempfile::tempdir().unwrap();
        let mode = FrameMode::new(2, 2, DepthFormat::D10Bit);
        let mut writer = crate::RecordingWriter::create(dir.path(), mode).unwrap();
        writer.write_frame(0, &vec![0u8; mode.frame_len()]).unwrap();
        writer.finish().unwrap();

        let mut config = DriverConfig::default();
        config.source.kind = SourceKind::Replay;
        config.source.replay_path = Some(dir.path().to_path_buf());

        let source = create_source(&config).unwrap();
        source.set_depth_format(mode).unwrap();
    }
}
