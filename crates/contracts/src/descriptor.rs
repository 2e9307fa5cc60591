//! RecordDescriptor - 记录结构描述
//!
//! 描述处理器输出记录的自描述 schema：一个时间分量 + 一个定长距离数组。
//! 数组长度在处理器 init 时由降采样计划确定。

use serde::{Deserialize, Serialize};

/// SWE 属性定义 URI 前缀
pub const SWE_PROPERTY_BASE: &str = "http://sensorml.com/ont/swe/property/";

/// 采样时间定义
pub const DEF_SAMPLING_TIME: &str = "http://www.opengis.net/def/property/OGC/0/SamplingTime";

/// GPS 时间参考系
pub const REF_FRAME_GPS: &str = "http://www.opengis.net/def/trs/USNO/0/GPS";

/// ISO-8601 时间单位
pub const UOM_ISO8601: &str = "http://www.opengis.net/def/uom/ISO-8601/0/Gregorian";

pub const RECORD_NAME: &str = "Point Cloud Model";
pub const RECORD_DESCRIPTION: &str = "Point Cloud Data read from Kinect Depth Sensor";
pub const TIME_FIELD: &str = "time";
pub const POINTS_FIELD: &str = "points";

const POINT_NAME: &str = "Point";
const POINT_LABEL: &str = "Distance";
const POINT_DESCRIPTION: &str =
    "A measure of distance from the sensor, the raw point cloud data retrieved from Kinect depth sensor.";
const POINT_UOM: &str = "m";

/// 拼接属性 URI
pub fn property_uri(name: &str) -> String {
    format!("{SWE_PROPERTY_BASE}{name}")
}

/// 记录描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub name: String,
    pub definition: String,
    pub description: String,
    /// 有序字段
    pub fields: Vec<RecordField>,
}

/// 记录字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub component: DataComponent,
}

/// 字段分量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataComponent {
    /// ISO-8601 时间戳，GPS 参考系
    Time {
        definition: String,
        reference_frame: String,
        uom: String,
    },
    /// 定长数组
    Array { element_count: usize, element: Quantity },
}

/// 带单位的标量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub name: String,
    pub label: String,
    pub definition: String,
    pub description: String,
    pub uom: String,
}

impl RecordDescriptor {
    /// 深度点云记录描述
    pub fn depth_point_cloud(sample_count: usize) -> Self {
        Self {
            name: RECORD_NAME.to_string(),
            definition: property_uri("DepthPointCloud"),
            description: RECORD_DESCRIPTION.to_string(),
            fields: vec![
                RecordField {
                    name: TIME_FIELD.to_string(),
                    component: DataComponent::Time {
                        definition: DEF_SAMPLING_TIME.to_string(),
                        reference_frame: REF_FRAME_GPS.to_string(),
                        uom: UOM_ISO8601.to_string(),
                    },
                },
                RecordField {
                    name: POINTS_FIELD.to_string(),
                    component: DataComponent::Array {
                        element_count: sample_count,
                        element: Quantity {
                            name: POINT_NAME.to_string(),
                            label: POINT_LABEL.to_string(),
                            definition: property_uri("Distance"),
                            description: POINT_DESCRIPTION.to_string(),
                            uom: POINT_UOM.to_string(),
                        },
                    },
                },
            ],
        }
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// `points` 数组长度
    pub fn point_count(&self) -> Option<usize> {
        match self.field(POINTS_FIELD)?.component {
            DataComponent::Array { element_count, .. } => Some(element_count),
            DataComponent::Time { .. } => None,
        }
    }
}
