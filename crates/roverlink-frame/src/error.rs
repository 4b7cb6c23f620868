use crate::purpose::Purpose;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The received checksum does not match the one computed over the frame.
    ///
    /// The whole frame has been consumed; the stream is still aligned.
    #[error("checksum mismatch on frame {id} ({purpose}): received {received:#04x}, computed {computed:#04x}")]
    ChecksumMismatch {
        id: u16,
        purpose: Purpose,
        received: u8,
        computed: u8,
    },

    /// The purpose byte does not name a known purpose.
    #[error("unknown frame purpose {0}")]
    UnknownPurpose(u8),

    /// The payload exceeds the configured hard maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fragment index offset leaves no room for intermediate sequence numbers.
    #[error("fragment index offset {0} leaves no intermediate sequence values")]
    InvalidIndexOffset(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// Reading stopped because the link is shutting down.
    #[error("frame read cancelled by shutdown")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FrameError>;
