//! Processor 错误类型

use thiserror::Error;

use crate::ProcessorState;

/// Processor 错误
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// 几何配置非法 (宽高 <= 0)
    #[error("invalid configuration: {message}")]
    Configuration {
        /// 错误消息
        message: String,
    },

    /// 帧源拒绝了深度模式或无法开始采集
    #[error("device error: {0}")]
    Device(#[source] contracts::ContractError),

    /// 单帧处理失败 (帧被丢弃，采集继续)
    #[error("frame processing failed for '{source_id}': {message}")]
    FrameProcessing {
        /// 源 ID
        source_id: String,
        /// 错误消息
        message: String,
    },

    /// 当前状态下不允许该操作
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        /// 操作名
        operation: &'static str,
        /// 当前状态
        state: ProcessorState,
    },
}

impl ProcessorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn frame_processing(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FrameProcessing {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

/// Processor Result 类型别名
pub type Result<T> = std::result::Result<T, ProcessorError>;
