//! Single-byte frame checksum.
//!
//! Each byte is folded in as `acc = acc.rotate_left(1) ^ byte`. Both steps
//! are bijections on `acc`, so changing any one byte of the input always
//! changes the result; swapping two different bytes usually does too. This
//! is not a CRC and makes no promise about multi-byte corruption.

/// Incremental checksum over a frame's header and payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    acc: u8,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(mut self, bytes: &[u8]) -> Self {
        for &byte in bytes {
            self.acc = self.acc.rotate_left(1) ^ byte;
        }
        self
    }

    pub fn finish(self) -> u8 {
        self.acc
    }
}

/// Checksum of a contiguous byte range.
pub fn checksum(bytes: &[u8]) -> u8 {
    Checksum::new().update(bytes).finish()
}
