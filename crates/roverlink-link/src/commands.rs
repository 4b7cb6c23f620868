//! Outgoing requests, shared by the station operator and rover responses.

use std::path::Path;

use bytes::Bytes;
use roverlink_frame::{Purpose, StreamKind};
use tracing::info;

use crate::drive::DriveCommand;
use crate::error::{LinkError, Result};
use crate::files::transfer_frames;
use crate::scheduler::Scheduler;

/// Video request payload that stops the feed.
pub const VIDEO_STOP: i8 = -1;

/// Queue a local file for transfer. Returns the number of frames queued.
pub fn send_file(scheduler: &Scheduler, path: &Path, topic: &str) -> Result<usize> {
    let contents = Bytes::from(std::fs::read(path)?);
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LinkError::Protocol(format!("invalid file name {}", path.display())))?;
    let frames = transfer_frames(name, contents, scheduler.ids())?;
    let count = frames.len();
    scheduler.add_messages(frames, topic)?;
    info!(path = %path.display(), frames = count, "file queued");
    Ok(count)
}

/// Ask the peer to send back its file `name`.
pub fn request_file(scheduler: &Scheduler, name: &str, topic: &str) -> Result<u16> {
    enqueue(
        scheduler,
        Purpose::RequestFile,
        Bytes::copy_from_slice(name.as_bytes()),
        topic,
    )
}

/// Ask the rover for a photo. Video is requested with [`request_video`].
pub fn request_photo(scheduler: &Scheduler, kind: StreamKind, topic: &str) -> Result<u16> {
    if kind == StreamKind::Video {
        return Err(LinkError::Protocol(
            "video is a stream, not a photo".to_string(),
        ));
    }
    enqueue(scheduler, kind.purpose(), Bytes::from_static(&[0]), topic)
}

/// Start the video feed from `camera`, or stop it with [`VIDEO_STOP`].
pub fn request_video(scheduler: &Scheduler, camera: i8, topic: &str) -> Result<u16> {
    enqueue(
        scheduler,
        Purpose::Video,
        Bytes::copy_from_slice(&camera.to_be_bytes()),
        topic,
    )
}

/// Send status/debug text.
pub fn send_text(scheduler: &Scheduler, text: &str, topic: &str) -> Result<u16> {
    enqueue(
        scheduler,
        Purpose::Error,
        Bytes::copy_from_slice(text.as_bytes()),
        topic,
    )
}

pub fn send_drive(scheduler: &Scheduler, command: &DriveCommand, topic: &str) -> Result<u16> {
    enqueue(scheduler, Purpose::Movement, command.encode(), topic)
}

fn enqueue(scheduler: &Scheduler, purpose: Purpose, payload: Bytes, topic: &str) -> Result<u16> {
    let frame = scheduler.frame(purpose, payload);
    let id = frame.id;
    scheduler.add_message(frame, topic)?;
    Ok(id)
}
