//! The rover link: everything between a byte stream and the application.
//!
//! - [`Scheduler`]: weighted round-robin over named topics, with pending
//!   frames retransmitted until the peer acknowledges them
//! - [`Dispatcher`]: acknowledges, deduplicates and routes received frames
//! - [`LinkContext`]: owns the shared state and runs the reader, dispatch
//!   and scheduler threads
//!
//! Rover and station run the same machinery; [`Role`] decides how photo and
//! video frames are treated.

pub mod commands;
pub mod config;
pub mod context;
pub mod debug_log;
pub mod dispatch;
pub mod drive;
pub mod error;
pub mod files;
pub mod media;
pub mod scheduler;

pub use config::{LinkConfig, RetryPolicy, TopicConfig};
pub use context::{LinkContext, LinkWorkers};
pub use debug_log::DebugLog;
pub use dispatch::{Dispatched, Dispatcher, Role};
pub use drive::{DriveCommand, DriveSink, LogDriveSink};
pub use error::{LinkError, Result};
pub use files::{FileProvider, FileReceiver};
pub use media::{CameraSource, DirectoryImageSink, ImageSink, LogImageSink, NoCamera, StillCamera};
pub use scheduler::{CycleReport, Scheduler, SchedulerStats, TopicStats};
