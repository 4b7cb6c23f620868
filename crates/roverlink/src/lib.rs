//! Acknowledged, weighted message transport between a rover and its base station.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams over TCP or a serial radio (`serial` feature)
//! - [`frame`]: checksummed frames, fragmentation and reassembly
//! - [`sync`]: the blocking queue and id set shared between worker threads
//! - [`link`]: scheduler, dispatcher and the worker threads tying them together

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use roverlink_frame::*;
}

/// Re-export synchronisation primitives.
pub mod sync {
    pub use roverlink_sync::*;
}

/// Re-export link types.
pub mod link {
    pub use roverlink_link::*;
}
