//! FileSink - writes depth records to disk
//!
//! 每个源一个文件：`{source_id}.csv` (推荐文本编码) 或 `{source_id}.jsonl`。
//! 可选地为每条记录输出一张 8 位灰度 PNG 预览 (`preview/{source_id}_{timestamp_ms}.png`)。

use contracts::{ContractError, DataEncoding, DataSink, DepthEvent, SourceId};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// 预览图中映射到最暗灰度的距离 (米)
const PREVIEW_MAX_METERS: f64 = 4.0;

/// 记录文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// 推荐文本编码，每条记录一行
    #[default]
    Csv,
    /// 每条事件一行 JSON
    JsonLines,
}

impl FileFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::JsonLines => "jsonl",
        }
    }
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
    pub format: FileFormat,
    /// Write a PNG preview per record
    pub preview: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./output"),
            format: FileFormat::default(),
            preview: false,
        }
    }
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// Keys: `base_path`, `format` (`csv` | `jsonl`), `preview` (`true` | `false`).
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        let format = match params.get("format").map(String::as_str) {
            Some("csv") | None => FileFormat::Csv,
            Some("jsonl") | Some("json") => FileFormat::JsonLines,
            Some(other) => return Err(format!("unknown format '{other}'")),
        };

        let preview = match params.get("preview").map(String::as_str) {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => return Err(format!("invalid preview flag '{other}'")),
        };

        Ok(Self {
            base_path,
            format,
            preview,
        })
    }
}

/// Sink that writes depth records to disk files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    encoding: DataEncoding,
    writers: HashMap<SourceId, BufWriter<File>>,
    line: String,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        if config.preview {
            fs::create_dir_all(config.base_path.join("preview"))?;
        }

        Ok(Self {
            name: name.into(),
            config,
            encoding: DataEncoding::default(),
            writers: HashMap::new(),
            line: String::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Self::new(name, config)
    }

    pub fn record_path(&self, source_id: &str) -> PathBuf {
        self.config
            .base_path
            .join(format!("{source_id}.{}", self.config.format.extension()))
    }

    fn writer(&mut self, source_id: &SourceId) -> std::io::Result<&mut BufWriter<File>> {
        if !self.writers.contains_key(source_id) {
            let path = self.record_path(source_id);
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            debug!(sink = %self.name, path = %path.display(), "record file opened");
            self.writers.insert(source_id.clone(), BufWriter::new(file));
        }
        self.writers
            .get_mut(source_id)
            .ok_or_else(|| std::io::Error::other("record writer missing"))
    }

    fn write_event_to_disk(&mut self, event: &DepthEvent) -> std::io::Result<()> {
        let mut line = std::mem::take(&mut self.line);
        line.clear();
        match self.config.format {
            FileFormat::Csv => self.encoding.write_block(&event.record, &mut line),
            FileFormat::JsonLines => {
                line = serde_json::to_string(event)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                line.push('\n');
            }
        }

        let result = self
            .writer(&event.source_id)
            .and_then(|w| w.write_all(line.as_bytes()));
        self.line = line;
        result?;

        if self.config.preview {
            let path = self.config.base_path.join("preview").join(format!(
                "{}_{}.png",
                event.source_id, event.timestamp_ms
            ));
            save_preview(&path, event)?;
        }
        Ok(())
    }

    fn persist_event(&mut self, event: &DepthEvent) -> Result<(), ContractError> {
        self.write_event_to_disk(event).map_err(|e| {
            error!(sink = %self.name, timestamp_ms = event.timestamp_ms, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    fn flush_all(&mut self) -> Result<(), ContractError> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }
}

/// 近处亮、远处暗；无回波为黑
fn preview_pixel(distance: f64) -> u8 {
    if distance <= 0.0 || !distance.is_finite() {
        return 0;
    }
    let t = (distance / PREVIEW_MAX_METERS).clamp(0.0, 1.0);
    (255.0 - t * 254.0).round() as u8
}

fn save_preview(path: &Path, event: &DepthEvent) -> std::io::Result<()> {
    let pixels: Vec<u8> = event.record.samples.iter().map(|d| preview_pixel(*d)).collect();
    let image = image::GrayImage::from_raw(event.grid.columns, event.grid.rows, pixels)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "{} samples do not fill a {}x{} grid",
                    event.record.sample_count(),
                    event.grid.columns,
                    event.grid.rows
                ),
            )
        })?;
    image.save(path).map_err(std::io::Error::other)
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, timestamp_ms = event.timestamp_ms)
    )]
    async fn write(&mut self, event: &DepthEvent) -> Result<(), ContractError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all()
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all()?;
        self.writers.clear();
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
