//! DepthRecord / DepthEvent - Processor 输出
//!
//! 一条记录对应一次通过速率门限的帧：时间戳 + 按扫描顺序排列的距离样本。

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::SourceId;

/// 深度观测记录
///
/// 构建后不可变，以 `Arc<DepthRecord>` 在处理器、订阅者与 sink 之间共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRecord {
    /// 发布时刻 (Unix 秒)
    pub timestamp: f64,

    /// 距离样本 (米)，无回波为 0.0
    pub samples: Vec<f64>,

    /// 逐点有效性掩码 (可选)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Vec<bool>>,
}

impl DepthRecord {
    pub fn new(timestamp: f64, samples: Vec<f64>) -> Self {
        Self {
            timestamp,
            samples,
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: Vec<bool>) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// 有回波的样本数
    ///
    /// 无掩码时以 `> 0.0` 判断。
    pub fn valid_count(&self) -> usize {
        match &self.validity {
            Some(mask) => mask.iter().filter(|v| **v).count(),
            None => self.samples.iter().filter(|d| **d > 0.0).count(),
        }
    }
}

/// 降采样后的网格形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 发布到事件总线的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthEvent {
    /// 产生该事件的源
    pub source_id: SourceId,

    /// 发布时刻 (Unix 毫秒)，与 `record.timestamp` 同一次时钟读数
    pub timestamp_ms: u64,

    /// 样本网格形状
    pub grid: GridShape,

    pub record: Arc<DepthRecord>,
}

impl DepthEvent {
    pub fn new(source_id: SourceId, timestamp_ms: u64, grid: GridShape, record: Arc<DepthRecord>) -> Self {
        Self {
            source_id,
            timestamp_ms,
            grid,
            record,
        }
    }

    /// 发布时刻 (秒)
    pub fn timestamp(&self) -> f64 {
        self.record.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_count_without_mask() {
        let record = DepthRecord::new(1.0, vec![0.0, 0.5, 1.2, 0.0]);
        assert_eq!(record.sample_count(), 4);
        assert_eq!(record.valid_count(), 2);
    }

    #[test]
    fn valid_count_prefers_mask() {
        let record = DepthRecord::new(1.0, vec![0.0, 0.5]).with_validity(vec![true, true]);
        assert_eq!(record.valid_count(), 2);
    }

    #[test]
    fn mask_omitted_from_json_when_absent() {
        let record = DepthRecord::new(2.5, vec![1.0]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("validity"));
    }

    #[test]
    fn event_shares_record() {
        let record = Arc::new(DepthRecord::new(3.0, vec![1.0, 2.0]));
        let event = DepthEvent::new("kinect0".into(), 3000, GridShape::new(2, 1), record.clone());
        assert!(Arc::ptr_eq(&event.record, &record));
        assert_eq!(event.timestamp(), 3.0);
        assert_eq!(event.grid.len(), 2);
    }
}
