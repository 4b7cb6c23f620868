//! Frame purposes.
//!
//! The purpose byte decides how the receiver routes a frame. Ordinals 0-6
//! and 8-11 match the deployed radios; acknowledgments take the free slot 7,
//! so every purpose fits in 0-11.

use std::fmt;

use crate::error::FrameError;

/// What a frame is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Purpose {
    /// Status / debug text.
    Error = 0,
    /// Drive command from the station.
    Movement = 1,
    Heartbeat = 2,
    /// Live video fragments (station side) or a camera toggle (rover side).
    Video = 3,
    HighDefPhoto = 4,
    ArmWord = 5,
    LowDefPhoto = 6,
    /// Acknowledges the frame whose id is in the payload.
    Ack = 7,
    Csv = 8,
    CameraVision = 9,
    /// File name header (sequence 1) or file content chunk.
    FileContents = 10,
    /// Ask the peer to send back a local file.
    RequestFile = 11,
}

impl Purpose {
    /// Every purpose, in ordinal order.
    pub const ALL: [Purpose; 12] = [
        Purpose::Error,
        Purpose::Movement,
        Purpose::Heartbeat,
        Purpose::Video,
        Purpose::HighDefPhoto,
        Purpose::ArmWord,
        Purpose::LowDefPhoto,
        Purpose::Ack,
        Purpose::Csv,
        Purpose::CameraVision,
        Purpose::FileContents,
        Purpose::RequestFile,
    ];

    /// Wire ordinal.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Purpose::Error => "ERROR",
            Purpose::Movement => "MOVEMENT",
            Purpose::Heartbeat => "HEARTBEAT",
            Purpose::Video => "VIDEO",
            Purpose::HighDefPhoto => "HIGH_DEF_PHOTO",
            Purpose::ArmWord => "ARM_WORD",
            Purpose::LowDefPhoto => "LOW_DEF_PHOTO",
            Purpose::Csv => "CSV",
            Purpose::CameraVision => "CAMERA_VISION",
            Purpose::FileContents => "FILE_CONTENTS",
            Purpose::RequestFile => "REQUEST_FILE",
            Purpose::Ack => "ACK",
        }
    }
}

impl TryFrom<u8> for Purpose {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        Purpose::ALL
            .into_iter()
            .find(|purpose| purpose.as_u8() == value)
            .ok_or(FrameError::UnknownPurpose(value))
    }
}

impl From<Purpose> for u8 {
    fn from(purpose: Purpose) -> Self {
        purpose.as_u8()
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
