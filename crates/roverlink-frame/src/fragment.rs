//! Splitting large buffers into frames and putting them back together.
//!
//! A buffer of `n` bytes becomes `ceil(n / MAX_PAYLOAD)` frames (at least
//! one). Every fragment except the last carries a non-zero sequence byte;
//! the last carries [`TERMINAL_SEQUENCE`]. Intermediate sequences start at
//! `index_offset + 1` and cycle back after 255, so buffers of any length
//! can be sent.
//!
//! File transfers use `index_offset = 1` because sequence
//! [`FILE_HEADER_SEQUENCE`] is taken by the file name frame.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{Frame, FrameIdAllocator, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::purpose::Purpose;

/// Sequence byte of the last fragment of a buffer.
pub const TERMINAL_SEQUENCE: u8 = 0;

/// Sequence byte of the file name frame that opens a transfer.
pub const FILE_HEADER_SEQUENCE: u8 = 1;

/// Split `data` into `MAX_PAYLOAD`-sized frames.
pub fn split(
    data: impl Into<Bytes>,
    purpose: Purpose,
    index_offset: u8,
    ids: &FrameIdAllocator,
) -> Result<Vec<Frame>> {
    split_with_chunk(data, purpose, index_offset, MAX_PAYLOAD, ids)
}

/// Split `data` into frames of at most `chunk` payload bytes.
pub fn split_with_chunk(
    data: impl Into<Bytes>,
    purpose: Purpose,
    index_offset: u8,
    chunk: usize,
    ids: &FrameIdAllocator,
) -> Result<Vec<Frame>> {
    if index_offset == u8::MAX {
        return Err(FrameError::InvalidIndexOffset(index_offset));
    }
    let data = data.into();
    let chunk = chunk.max(1);
    let count = data.len().div_ceil(chunk).max(1);
    let period = usize::from(u8::MAX - index_offset);

    let frames = (0..count)
        .map(|index| {
            let start = (index * chunk).min(data.len());
            let end = (start + chunk).min(data.len());
            let sequence = if index + 1 == count {
                TERMINAL_SEQUENCE
            } else {
                // Always in index_offset + 1 ..= 255.
                index_offset + 1 + (index % period) as u8
            };
            Frame::new(ids.next_id(), purpose, data.slice(start..end)).with_sequence(sequence)
        })
        .collect::<Vec<_>>();

    trace!(
        purpose = %purpose,
        bytes = data.len(),
        fragments = frames.len(),
        "split buffer"
    );
    Ok(frames)
}

/// The frame that announces a file transfer: sequence 1, payload is the
/// base name of `name`.
pub fn file_header(name: &str, ids: &FrameIdAllocator) -> Frame {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or(name);
    Frame::new(
        ids.next_id(),
        Purpose::FileContents,
        Bytes::copy_from_slice(base.as_bytes()),
    )
    .with_sequence(FILE_HEADER_SEQUENCE)
}

/// Accumulates the fragments of one stream until the terminal frame.
///
/// Expects the `index_offset = 0` layout produced by [`split`]. A frame whose
/// sequence is above the running count is an intermediate fragment; anything
/// else ends the buffer.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: BytesMut,
    count: u8,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the whole buffer when `frame` completes it.
    pub fn push(&mut self, frame: &Frame) -> Option<Bytes> {
        self.buf.extend_from_slice(&frame.payload);
        if self.count < frame.sequence {
            self.count = ((u16::from(self.count) + 1) % u16::from(u8::MAX)) as u8;
            return None;
        }

        self.count = 0;
        Some(self.buf.split().freeze())
    }

    /// Bytes buffered for the buffer in progress.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial buffer.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.count = 0;
    }
}

/// Fragmented stream categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    HighDefPhoto,
    LowDefPhoto,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [
        StreamKind::Video,
        StreamKind::HighDefPhoto,
        StreamKind::LowDefPhoto,
    ];

    pub fn from_purpose(purpose: Purpose) -> Option<Self> {
        match purpose {
            Purpose::Video => Some(Self::Video),
            Purpose::HighDefPhoto => Some(Self::HighDefPhoto),
            Purpose::LowDefPhoto => Some(Self::LowDefPhoto),
            _ => None,
        }
    }

    pub fn purpose(self) -> Purpose {
        match self {
            Self::Video => Purpose::Video,
            Self::HighDefPhoto => Purpose::HighDefPhoto,
            Self::LowDefPhoto => Purpose::LowDefPhoto,
        }
    }

    /// Short name, also used as the output directory and file prefix.
    pub fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::HighDefPhoto => "hdp",
            Self::LowDefPhoto => "ldp",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Video => 0,
            Self::HighDefPhoto => 1,
            Self::LowDefPhoto => 2,
        }
    }
}

/// One [`Reassembler`] per [`StreamKind`].
///
/// Keyed by purpose only: two interleaved buffers of the same kind corrupt
/// each other.
#[derive(Debug, Default)]
pub struct ReassemblyTable {
    slots: [Reassembler; 3],
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a stream fragment. Returns `None` for non-stream purposes and
    /// for fragments that do not finish a buffer.
    pub fn push(&mut self, frame: &Frame) -> Option<(StreamKind, Bytes)> {
        let kind = StreamKind::from_purpose(frame.purpose)?;
        self.slots[kind.slot()]
            .push(frame)
            .map(|buffer| (kind, buffer))
    }

    pub fn reset(&mut self, kind: StreamKind) {
        self.slots[kind.slot()].reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn reassemble(frames: &[Frame]) -> Vec<Bytes> {
        let mut reassembler = Reassembler::new();
        frames.iter().filter_map(|f| reassembler.push(f)).collect()
    }

    #[test]
    fn fragment_counts_and_sequences() {
        let ids = FrameIdAllocator::new();
        for k in [1usize, 2, 5] {
            let data = pattern(MAX_PAYLOAD * (k - 1) + 17);
            let frames = split(data, Purpose::HighDefPhoto, 0, &ids).unwrap();

            assert_eq!(frames.len(), k);
            let sequences: Vec<u8> = frames.iter().map(|f| f.sequence).collect();
            let mut expected: Vec<u8> = (1..k as u8).collect();
            expected.push(TERMINAL_SEQUENCE);
            assert_eq!(sequences, expected);
            assert!(frames.iter().all(|f| f.payload.len() <= MAX_PAYLOAD));
        }
    }

    #[test]
    fn reassembly_restores_buffer() {
        let ids = FrameIdAllocator::new();
        for k in [1usize, 2, 5] {
            let data = pattern(MAX_PAYLOAD * k);
            let frames = split(data.clone(), Purpose::LowDefPhoto, 0, &ids).unwrap();
            assert_eq!(frames.len(), k);

            let buffers = reassemble(&frames);
            assert_eq!(buffers.len(), 1);
            assert_eq!(buffers[0].as_ref(), data.as_slice());
        }
    }

    #[test]
    fn fragment_ids_are_distinct() {
        let ids = FrameIdAllocator::new();
        let frames = split(pattern(MAX_PAYLOAD * 3), Purpose::Video, 0, &ids).unwrap();
        let frame_ids: Vec<u16> = frames.iter().map(|f| f.id).collect();
        assert_eq!(frame_ids, vec![0, 1, 2]);
    }

    #[test]
    fn empty_buffer_is_one_terminal_frame() {
        let ids = FrameIdAllocator::new();
        let frames = split(Bytes::new(), Purpose::Video, 0, &ids).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence, TERMINAL_SEQUENCE);
        assert!(frames[0].payload.is_empty());
        assert_eq!(reassemble(&frames), vec![Bytes::new()]);
    }

    #[test]
    fn sequences_cycle_past_255_fragments() {
        let ids = FrameIdAllocator::new();
        let data = pattern(600);
        let frames = split_with_chunk(data.clone(), Purpose::Video, 0, 1, &ids).unwrap();

        assert_eq!(frames.len(), 600);
        assert_eq!(frames[254].sequence, 255);
        assert_eq!(frames[255].sequence, 1);
        assert_eq!(frames[599].sequence, TERMINAL_SEQUENCE);
        assert!(frames[..599].iter().all(|f| f.sequence != 0));

        let buffers = reassemble(&frames);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].as_ref(), data.as_slice());
    }

    #[test]
    fn file_layout_skips_header_sequence() {
        let ids = FrameIdAllocator::new();
        let frames = split_with_chunk(pattern(300), Purpose::FileContents, 1, 1, &ids).unwrap();

        assert_eq!(frames[0].sequence, 2);
        assert_eq!(frames[253].sequence, 255);
        assert_eq!(frames[254].sequence, 2);
        assert!(frames.iter().all(|f| f.sequence != FILE_HEADER_SEQUENCE));
        assert_eq!(frames[299].sequence, TERMINAL_SEQUENCE);
    }

    #[test]
    fn offset_255_is_rejected() {
        let ids = FrameIdAllocator::new();
        let err = split(pattern(10), Purpose::Video, 255, &ids).unwrap_err();
        assert!(matches!(err, FrameError::InvalidIndexOffset(255)));
    }

    #[test]
    fn file_header_uses_base_name() {
        let ids = FrameIdAllocator::starting_at(40);
        let header = file_header("/tmp/logs/run-3.csv", &ids);

        assert_eq!(header.id, 40);
        assert_eq!(header.purpose, Purpose::FileContents);
        assert_eq!(header.sequence, FILE_HEADER_SEQUENCE);
        assert_eq!(header.payload.as_ref(), b"run-3.csv");
    }

    #[test]
    fn reassembler_resets_between_buffers() {
        let ids = FrameIdAllocator::new();
        let mut frames = split(pattern(MAX_PAYLOAD + 1), Purpose::Video, 0, &ids).unwrap();
        frames.extend(split(pattern(5), Purpose::Video, 0, &ids).unwrap());

        let buffers = reassemble(&frames);
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0].len(), MAX_PAYLOAD + 1);
        assert_eq!(buffers[1].as_ref(), pattern(5).as_slice());
    }

    #[test]
    fn table_keeps_streams_apart() {
        let ids = FrameIdAllocator::new();
        let video = split(pattern(MAX_PAYLOAD * 2), Purpose::Video, 0, &ids).unwrap();
        let photo = split(pattern(MAX_PAYLOAD + 3), Purpose::HighDefPhoto, 0, &ids).unwrap();

        let mut table = ReassemblyTable::new();
        assert!(table.push(&video[0]).is_none());
        assert!(table.push(&photo[0]).is_none());
        assert!(table.push(&Frame::new(99, Purpose::Csv, &b"x"[..])).is_none());

        let (kind, buffer) = table.push(&photo[1]).unwrap();
        assert_eq!(kind, StreamKind::HighDefPhoto);
        assert_eq!(buffer.len(), MAX_PAYLOAD + 3);

        let (kind, buffer) = table.push(&video[1]).unwrap();
        assert_eq!(kind, StreamKind::Video);
        assert_eq!(buffer.len(), MAX_PAYLOAD * 2);
    }

    #[test]
    fn stream_kind_names() {
        for kind in StreamKind::ALL {
            assert_eq!(StreamKind::from_purpose(kind.purpose()), Some(kind));
        }
        assert_eq!(StreamKind::HighDefPhoto.name(), "hdp");
        assert_eq!(StreamKind::from_purpose(Purpose::Ack), None);
    }
}
