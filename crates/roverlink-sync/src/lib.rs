//! Thread-safe building blocks shared by the link worker threads.
//!
//! - [`MessageQueue`]: FIFO with blocking `pop` and a broadcast shutdown
//! - [`IdSet`]: set of frame ids with an atomic insert-if-absent
//!
//! Neither type knows anything about frames; items that can be cancelled by
//! id implement [`Identified`].

pub mod idset;
pub mod queue;

pub use idset::IdSet;
pub use queue::{Identified, MessageQueue};
