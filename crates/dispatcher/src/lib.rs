//! # Dispatcher
//!
//! 深度事件分发模块。
//!
//! 负责：
//! - 消费处理器发布的 `DepthEvent`
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞发布链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, DepthEvent};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::{Delivery, SinkHandle};
pub use crate::metrics::{SinkMetrics, SinkMetricsSnapshot};
pub use sinks::{FileFormat, FileSink, FileSinkConfig, LogSink, NetworkFormat, NetworkSink, NetworkSinkConfig};
