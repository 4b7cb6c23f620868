use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::info;

use crate::error::{LinkError, Result};

/// Movement payload length: left (2) + right (2) + scalar (4) + aux (4).
pub const DRIVE_COMMAND_LEN: usize = 12;

/// Decoded movement frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriveCommand {
    /// Left track speed.
    pub left: i16,
    /// Right track speed.
    pub right: i16,
    /// Throttle scalar applied to both tracks.
    pub scalar: f32,
    /// Camera pan left/right and the two auxiliary buttons.
    pub aux: [u8; 4],
}

impl DriveCommand {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < DRIVE_COMMAND_LEN {
            return Err(LinkError::Protocol(format!(
                "movement payload is {} bytes, expected {DRIVE_COMMAND_LEN}",
                payload.len()
            )));
        }
        let mut buf = payload;
        let left = buf.get_i16();
        let right = buf.get_i16();
        let scalar = buf.get_f32();
        let mut aux = [0u8; 4];
        buf.copy_to_slice(&mut aux);
        Ok(Self {
            left,
            right,
            scalar,
            aux,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DRIVE_COMMAND_LEN);
        buf.put_i16(self.left);
        buf.put_i16(self.right);
        buf.put_f32(self.scalar);
        buf.put_slice(&self.aux);
        buf.freeze()
    }
}

/// Receives drive commands on the rover.
pub trait DriveSink: Send {
    fn drive(&mut self, command: DriveCommand);
}

/// Logs drive commands. Used when no motor controller is attached.
#[derive(Debug, Default)]
pub struct LogDriveSink;

impl DriveSink for LogDriveSink {
    fn drive(&mut self, command: DriveCommand) {
        info!(
            left = command.left,
            right = command.right,
            scalar = command.scalar,
            aux = ?command.aux,
            "drive command"
        );
    }
}
