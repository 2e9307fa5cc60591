//! # Frame Source
//!
//! Kinect 深度帧源。
//!
//! Responsibilities:
//! - Provide `FrameSource` implementations without a physical device
//! - Mock mode: synthetic frames at a fixed rate
//! - Replay mode: raw frames recorded on disk, with `RecordingWriter` to produce them
//! - Build the configured source from `DriverConfig`
//!
//! Frames are delivered on a dedicated capture thread, borrowing a buffer
//! that is reused for the next frame.

mod capture;
pub mod error;
mod factory;
pub mod mock;
pub mod replay;

pub use contracts::{FrameCallback, FrameMode, FrameSource, RawFrame};
pub use error::{FrameSourceError, Result};
pub use factory::create_source;
pub use mock::{MockKinect, MockKinectConfig};
pub use replay::{RecordedFrame, RecordingManifest, RecordingWriter, ReplayConfig, ReplayKinect};
