//! Byte-stream transport abstraction for the rover link.
//!
//! The link core only needs "read bytes / write bytes / tear down" from the
//! physical medium. This crate provides that over:
//! - TCP sockets (rover listens, station connects)
//! - Serial radio links (behind the `serial` feature)
//!
//! This is the lowest layer of roverlink. Everything else builds on top of
//! the [`LinkStream`] type and the shared [`CancelToken`] provided here.

pub mod cancel;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

pub use cancel::CancelToken;
pub use error::{Result, TransportError};
pub use stream::LinkStream;
pub use tcp::TcpEndpoint;

#[cfg(feature = "serial")]
pub use serial::SerialEndpoint;
