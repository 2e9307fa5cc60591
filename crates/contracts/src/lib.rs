//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the Kinect depth driver.
//! Business crates depend only on this crate, never on each other's internals.
//!
//! ## Time Model
//! - Host wall clock in milliseconds since the Unix epoch (`u64`) drives rate gating
//! - Record timestamps are the same reading in seconds (`f64`)
//! - The device timestamp hint on raw frames is diagnostic only

mod config;
mod descriptor;
mod encoding;
mod error;
mod frame;
mod publisher;
mod record;
mod sink;
mod source_id;

pub use config::*;
pub use descriptor::*;
pub use encoding::*;
pub use error::*;
pub use frame::*;
pub use publisher::EventPublisher;
pub use record::*;
pub use sink::*;
pub use source_id::SourceId;
