//! DataEncoding - 推荐的记录编码
//!
//! 文本编码：字段间用 token 分隔符，记录间用 block 分隔符。
//! 时间字段按 ISO-8601 (UTC, 毫秒精度) 输出，其后依次为各距离样本。

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::DepthRecord;

/// 记录编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataEncoding {
    Text(TextEncoding),
}

impl Default for DataEncoding {
    fn default() -> Self {
        Self::Text(TextEncoding::default())
    }
}

impl DataEncoding {
    /// 编码一条记录 (不含结尾的 block 分隔符)
    pub fn encode(&self, record: &DepthRecord) -> String {
        match self {
            Self::Text(text) => text.encode(record),
        }
    }

    /// 追加一条记录及 block 分隔符
    pub fn write_block(&self, record: &DepthRecord, out: &mut String) {
        match self {
            Self::Text(text) => {
                text.encode_into(record, out);
                out.push_str(&text.block_separator);
            }
        }
    }
}

/// 文本编码参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEncoding {
    pub token_separator: String,
    pub block_separator: String,
    pub decimal_separator: char,
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self {
            token_separator: ",".to_string(),
            block_separator: "\n".to_string(),
            decimal_separator: '.',
        }
    }
}

impl TextEncoding {
    pub fn encode(&self, record: &DepthRecord) -> String {
        // 时间戳约 24 字节，每个样本约 20 字节
        let mut out = String::with_capacity(24 + record.samples.len() * 20);
        self.encode_into(record, &mut out);
        out
    }

    fn encode_into(&self, record: &DepthRecord, out: &mut String) {
        out.push_str(&iso8601(record.timestamp));
        for sample in &record.samples {
            out.push_str(&self.token_separator);
            if self.decimal_separator == '.' {
                let _ = write!(out, "{sample}");
            } else {
                let formatted = sample.to_string().replace('.', &self.decimal_separator.to_string());
                out.push_str(&formatted);
            }
        }
    }
}

/// Unix 秒转 ISO-8601 字符串，超出可表示范围时退回秒数
pub fn iso8601(timestamp: f64) -> String {
    let millis = (timestamp * 1000.0).round() as i64;
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => timestamp.to_string(),
    }
}
