//! Checksummed binary framing for the rover link.
//!
//! Every message on the wire is one frame:
//! - 2-byte big-endian id, assigned by the sender
//! - 1-byte purpose (see [`Purpose`])
//! - 1-byte sequence (fragment position / file header marker)
//! - 4-byte big-endian payload size
//! - payload
//! - 1-byte checksum over everything before it
//!
//! Payloads larger than [`MAX_PAYLOAD`] are [`split`] into fragments and put
//! back together on the other side by a [`Reassembler`].

pub mod checksum;
pub mod codec;
pub mod error;
pub mod fragment;
pub mod purpose;
pub mod reader;
pub mod writer;

pub use checksum::{checksum, Checksum};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameIdAllocator, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, MAX_PAYLOAD, TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use fragment::{
    file_header, split, split_with_chunk, Reassembler, ReassemblyTable, StreamKind,
    FILE_HEADER_SEQUENCE, TERMINAL_SEQUENCE,
};
pub use purpose::Purpose;
pub use reader::FrameReader;
pub use writer::FrameWriter;
