//! # Depth Processor
//!
//! Kinect 深度帧到观测记录的处理管线。
//!
//! Responsibilities:
//! - Decimation plan (stride, sample count, scan order)
//! - Raw depth code -> meters calibration
//! - Rate gating by sampling interval
//! - Frame processor lifecycle (`init` / `start` / `stop`) and latest-record queries
//! - Non-blocking publishing into a bounded async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use depth_processor::{ChannelPublisher, DepthFrameProcessor, ProcessorMetrics};
//!
//! let metrics = Arc::new(ProcessorMetrics::new());
//! let (publisher, rx) = ChannelPublisher::bounded(64, metrics.clone());
//! let mut processor = DepthFrameProcessor::builder(config.depth, source, Arc::new(publisher))
//!     .metrics(metrics)
//!     .build();
//! processor.init()?;
//! processor.start()?;
//! while let Ok(event) = rx.recv().await {
//!     // dispatch event
//! }
//! ```

pub mod calibration;
pub mod clock;
pub mod decimation;
mod error;
mod gate;
mod metrics;
mod processor;
mod publisher;

pub use calibration::{is_valid, to_meters};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimation::{normalize_factor, plan, DecimationPlan};
pub use error::{ProcessorError, Result};
pub use gate::RateGate;
pub use crate::metrics::{names as metric_names, MetricsSnapshot, ProcessorMetrics};
pub use processor::{DepthFrameProcessor, DepthFrameProcessorBuilder, LatestRecord, ProcessorState};
pub use publisher::ChannelPublisher;
