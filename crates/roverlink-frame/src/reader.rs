use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use roverlink_transport::{CancelToken, LinkStream};
use tracing::debug;

use crate::codec::{check_frame, decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// With a [`CancelToken`] attached, read timeouts become poll points: the
/// reader keeps waiting until data arrives or the token is cancelled.
///
/// A frame that fails validation costs one byte. The reader then scans for
/// the next offset holding a complete, valid frame, so a corrupted size
/// field neither stalls the stream nor swallows the frames behind it.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    cancel: Option<CancelToken>,
    resyncing: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            cancel: None,
            resyncing: false,
        }
    }

    /// Stop blocking reads once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached and
    /// `Err(FrameError::Cancelled)` once the attached token is cancelled.
    /// `ChecksumMismatch`, `UnknownPurpose` and `PayloadTooLarge` are
    /// per-frame: the next call picks up at the following valid frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.is_cancelled() {
                return Err(FrameError::Cancelled);
            }

            if let Some(frame) = self.next_buffered()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if self.cancel.is_some()
                        && matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn next_buffered(&mut self) -> Result<Option<Frame>> {
        if self.resyncing {
            let (skip, found) = resync_offset(&self.buf, &self.config);
            self.buf.advance(skip);
            if !found {
                return Ok(None);
            }
            debug!(skipped = skip, "frame stream resynchronised");
            self.resyncing = false;
        }

        match check_frame(&self.buf, &self.config) {
            Ok(Some(_)) => decode_frame(&mut self.buf, &self.config),
            Ok(None) => Ok(None),
            Err(err) => {
                self.buf.advance(1);
                self.resyncing = true;
                Err(err)
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Bytes to drop from the front of `buf`, and whether a valid frame starts
/// right after them. Offsets that are still incomplete are kept.
fn resync_offset(buf: &[u8], config: &FrameConfig) -> (usize, bool) {
    let mut first_incomplete = None;
    for offset in 0..buf.len() {
        match check_frame(&buf[offset..], config) {
            Ok(Some(_)) => return (offset, true),
            Ok(None) => {
                first_incomplete.get_or_insert(offset);
            }
            Err(_) => {}
        }
    }
    (first_incomplete.unwrap_or(buf.len()), false)
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a `LinkStream` and apply the read timeout from config.
    pub fn with_config_link(mut inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: roverlink_transport::TransportError) -> FrameError {
    use roverlink_transport::TransportError;

    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
