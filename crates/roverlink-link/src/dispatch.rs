//! Routing of received frames.
//!
//! Every frame other than an ACK is acknowledged as soon as it is seen, even
//! when it turns out to be a retransmission, so the sender can stop
//! retrying. Duplicates are recognised by id within a bounded window and are
//! not handled a second time.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use roverlink_frame::{split, Frame, Purpose, ReassemblyTable, StreamKind};
use roverlink_sync::IdSet;
use tracing::{debug, info, trace, warn};

use crate::commands::{send_text, VIDEO_STOP};
use crate::config::{ACKNOWLEDGMENT, DEFAULT_DEDUP_WINDOW, FILE, HDP, LDP, STATUS, VID_FEED};
use crate::debug_log::DebugLog;
use crate::drive::{DriveCommand, DriveSink, LogDriveSink};
use crate::error::{LinkError, Result};
use crate::files::{transfer_frames, FileProvider, FileReceiver};
use crate::media::{CameraSource, ImageSink, LogImageSink, NoCamera};
use crate::scheduler::Scheduler;

/// Which end of the link this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Takes drive commands and answers photo, video and file requests.
    Rover,
    /// Sends requests and stores the images that come back.
    Station,
}

/// What [`Dispatcher::dispatch`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// An acknowledgment from the peer, for the contained id.
    Acknowledgment(u16),
    /// Already handled; acknowledged again only.
    Duplicate,
    /// An acknowledgment with an unreadable payload.
    Ignored,
    /// Acknowledged and handed to its handler.
    Delivered(Purpose),
}

/// Routes inbound frames to their handlers.
pub struct Dispatcher {
    role: Role,
    scheduler: Arc<Scheduler>,
    processed: Arc<IdSet>,
    window: VecDeque<u16>,
    window_size: usize,
    reassembly: ReassemblyTable,
    drive: Box<dyn DriveSink>,
    images: Box<dyn ImageSink>,
    camera: Arc<dyn CameraSource>,
    receiver: FileReceiver,
    provider: FileProvider,
    debug_log: DebugLog,
}

impl Dispatcher {
    pub fn new(role: Role, scheduler: Arc<Scheduler>, processed: Arc<IdSet>) -> Self {
        Self {
            role,
            scheduler,
            processed,
            window: VecDeque::new(),
            window_size: DEFAULT_DEDUP_WINDOW,
            reassembly: ReassemblyTable::new(),
            drive: Box::new(LogDriveSink),
            images: Box::new(LogImageSink),
            camera: Arc::new(NoCamera),
            receiver: FileReceiver::new("."),
            provider: FileProvider::new("."),
            debug_log: DebugLog::disabled(),
        }
    }

    pub fn with_drive_sink(mut self, drive: impl DriveSink + 'static) -> Self {
        self.drive = Box::new(drive);
        self
    }

    pub fn with_image_sink(mut self, images: impl ImageSink + 'static) -> Self {
        self.images = Box::new(images);
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraSource>) -> Self {
        self.camera = camera;
        self
    }

    /// Directory that received files are written to and requested files are read from.
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.provider = FileProvider::new(&dir);
        self.receiver = FileReceiver::new(dir);
        self
    }

    pub fn with_debug_log(mut self, debug_log: DebugLog) -> Self {
        self.debug_log = debug_log;
        self
    }

    /// Number of recent ids remembered for deduplication.
    pub fn with_dedup_window(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Acknowledge, deduplicate and route one frame.
    pub fn dispatch(&mut self, frame: Frame) -> Dispatched {
        if frame.purpose == Purpose::Ack {
            return match frame.acknowledged_id() {
                Some(id) => {
                    self.scheduler.acknowledgment_received(id);
                    Dispatched::Acknowledgment(id)
                }
                None => {
                    warn!(
                        id = frame.id,
                        len = frame.payload.len(),
                        "malformed acknowledgment"
                    );
                    Dispatched::Ignored
                }
            };
        }

        self.acknowledge(frame.id);
        if !self.first_sighting(frame.id) {
            debug!(id = frame.id, purpose = %frame.purpose, "duplicate frame");
            return Dispatched::Duplicate;
        }

        let purpose = frame.purpose;
        if let Err(err) = self.route(frame) {
            warn!(purpose = %purpose, error = %err, "frame handling failed");
        }
        Dispatched::Delivered(purpose)
    }

    fn acknowledge(&self, id: u16) {
        let ack = Frame::ack(self.scheduler.ids().next_id(), id);
        if let Err(err) = self.scheduler.add_message(ack, ACKNOWLEDGMENT) {
            warn!(id, error = %err, "could not queue acknowledgment");
        }
    }

    fn first_sighting(&mut self, id: u16) -> bool {
        if !self.processed.insert(id) {
            return false;
        }
        self.window.push_back(id);
        while self.window.len() > self.window_size {
            if let Some(old) = self.window.pop_front() {
                self.processed.remove(old);
            }
        }
        true
    }

    fn route(&mut self, frame: Frame) -> Result<()> {
        trace!(id = frame.id, purpose = %frame.purpose, sequence = frame.sequence, "dispatching");
        match frame.purpose {
            Purpose::Error => {
                let text = String::from_utf8_lossy(&frame.payload);
                info!(id = frame.id, text = %text, "peer status");
                self.debug_log.append(&text);
                Ok(())
            }
            Purpose::Movement => {
                let command = DriveCommand::decode(&frame.payload)?;
                self.drive.drive(command);
                Ok(())
            }
            Purpose::Video | Purpose::HighDefPhoto | Purpose::LowDefPhoto => match self.role {
                Role::Station => self.receive_stream(&frame),
                Role::Rover => self.serve_stream_request(&frame),
            },
            Purpose::FileContents => {
                self.receiver.receive(&frame)?;
                Ok(())
            }
            Purpose::RequestFile => self.serve_file_request(&frame),
            Purpose::Heartbeat => {
                debug!(id = frame.id, "heartbeat");
                Ok(())
            }
            Purpose::ArmWord | Purpose::Csv | Purpose::CameraVision => {
                info!(id = frame.id, purpose = %frame.purpose, len = frame.payload.len(), "unhandled frame");
                Ok(())
            }
            Purpose::Ack => Ok(()),
        }
    }

    fn receive_stream(&mut self, frame: &Frame) -> Result<()> {
        if let Some((kind, image)) = self.reassembly.push(frame) {
            self.images.store(kind, image)?;
        }
        Ok(())
    }

    fn serve_stream_request(&mut self, frame: &Frame) -> Result<()> {
        match frame.purpose {
            Purpose::HighDefPhoto => self.send_capture(StreamKind::HighDefPhoto, HDP),
            Purpose::LowDefPhoto => self.send_capture(StreamKind::LowDefPhoto, LDP),
            _ => {
                let camera = frame
                    .payload
                    .first()
                    .map(|byte| *byte as i8)
                    .ok_or_else(|| LinkError::Protocol("empty video request".to_string()))?;
                if camera == VIDEO_STOP {
                    self.scheduler.set_stream_enabled(VID_FEED, false)
                } else {
                    self.camera.select_video(camera)?;
                    self.scheduler.set_stream_enabled(VID_FEED, true)
                }
            }
        }
    }

    fn send_capture(&mut self, kind: StreamKind, topic: &str) -> Result<()> {
        match self.camera.capture(kind) {
            Ok(image) => {
                let frames = split(image, kind.purpose(), 0, self.scheduler.ids())?;
                debug!(kind = kind.name(), fragments = frames.len(), "photo queued");
                self.scheduler.add_messages(frames, topic)
            }
            Err(err) => {
                warn!(kind = kind.name(), error = %err, "capture failed");
                send_text(&self.scheduler, &err.to_string(), STATUS).map(drop)
            }
        }
    }

    fn serve_file_request(&mut self, frame: &Frame) -> Result<()> {
        let name = String::from_utf8_lossy(&frame.payload);
        match self.provider.read(&name) {
            Ok(contents) => {
                let frames = transfer_frames(&name, contents, self.scheduler.ids())?;
                info!(name = %name, frames = frames.len(), "sending requested file");
                self.scheduler.add_messages(frames, FILE)
            }
            Err(err) => {
                warn!(name = %name, error = %err, "requested file unavailable");
                send_text(
                    &self.scheduler,
                    &format!("could not read file {name}: {err}"),
                    STATUS,
                )
                .map(drop)
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("role", &self.role)
            .field("window_size", &self.window_size)
            .field("files_dir", &self.receiver.dir())
            .finish()
    }
}
