//! Process-wide link state and the worker threads that drive it.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use roverlink_frame::{split, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, StreamKind};
use roverlink_sync::{IdSet, MessageQueue};
use roverlink_transport::{CancelToken, LinkStream};
use tracing::{debug, error, info, warn};

use crate::config::{LinkConfig, VID_FEED};
use crate::dispatch::{Dispatcher, Role};
use crate::error::{LinkError, Result};
use crate::media::CameraSource;
use crate::scheduler::Scheduler;

/// Video frames queued ahead of the scheduler before capture pauses.
const VIDEO_BACKLOG_FRAMES: usize = 64;

/// Owns everything one end of the link shares between its threads.
pub struct LinkContext {
    config: LinkConfig,
    inbound: Arc<MessageQueue<Frame>>,
    scheduler: Arc<Scheduler>,
    processed: Arc<IdSet>,
    cancel: CancelToken,
}

impl LinkContext {
    pub fn new(config: LinkConfig) -> Result<Self> {
        let scheduler = Scheduler::new(&config)?;
        Ok(Self {
            config,
            inbound: Arc::new(MessageQueue::new()),
            scheduler: Arc::new(scheduler),
            processed: Arc::new(IdSet::new()),
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Frames read from the peer and not yet dispatched.
    pub fn inbound(&self) -> &Arc<MessageQueue<Frame>> {
        &self.inbound
    }

    /// Ids already dispatched.
    pub fn processed(&self) -> &Arc<IdSet> {
        &self.processed
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_running()
    }

    /// A dispatcher wired to this context, with the configured dedup window.
    pub fn dispatcher(&self, role: Role) -> Dispatcher {
        Dispatcher::new(role, Arc::clone(&self.scheduler), Arc::clone(&self.processed))
            .with_dedup_window(self.config.dedup_window)
    }

    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            read_timeout: Some(self.config.read_timeout),
            ..FrameConfig::default()
        }
    }

    /// Start the reader, dispatch and scheduler threads on `stream`.
    pub fn spawn_workers(&self, stream: LinkStream, dispatcher: Dispatcher) -> Result<LinkWorkers> {
        info!(
            transport = stream.transport_name(),
            role = ?dispatcher.role(),
            "link starting"
        );
        let reader_stream = stream.try_clone()?;
        let reader =
            FrameReader::with_config_link(reader_stream, self.frame_config())?.with_cancel(self.cancel_token());
        let writer = FrameWriter::with_config_link(stream, self.frame_config())?;

        let mut workers = LinkWorkers::default();

        let inbound = Arc::clone(&self.inbound);
        let cancel = self.cancel_token();
        workers.spawn("reader", move || read_loop(reader, &inbound, &cancel))?;

        let inbound = Arc::clone(&self.inbound);
        workers.spawn("dispatch", move || dispatch_loop(dispatcher, &inbound))?;

        let scheduler = Arc::clone(&self.scheduler);
        let cancel = self.cancel_token();
        workers.spawn("scheduler", move || {
            let mut writer = writer;
            scheduler.run(&mut writer, &cancel);
        })?;

        Ok(workers)
    }

    /// Capture video frames into `vid_feed` whenever that stream is enabled.
    pub fn spawn_video_feed(
        &self,
        workers: &mut LinkWorkers,
        camera: Arc<dyn CameraSource>,
        interval: Duration,
    ) -> Result<()> {
        self.scheduler.queued(VID_FEED)?;
        let scheduler = Arc::clone(&self.scheduler);
        let cancel = self.cancel_token();
        workers.spawn("video", move || {
            video_loop(&scheduler, camera.as_ref(), interval, &cancel)
        })
    }

    /// Stop every worker. Blocked readers and poppers return promptly.
    pub fn shutdown(&self) {
        if self.cancel.is_running() {
            info!("link shutting down");
        }
        self.cancel.cancel();
        self.inbound.shutdown();
    }
}

impl std::fmt::Debug for LinkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkContext")
            .field("scheduler", &self.scheduler)
            .field("inbound", &self.inbound.len())
            .field("running", &self.cancel.is_running())
            .finish()
    }
}

/// Handles of the running worker threads.
#[derive(Debug, Default)]
pub struct LinkWorkers {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl LinkWorkers {
    fn spawn<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("roverlink-{name}"))
            .spawn(body)?;
        self.handles.push((name.to_string(), handle));
        Ok(())
    }

    /// Names of the spawned workers, in start order.
    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Wait for every worker to exit.
    pub fn join(self) -> Result<()> {
        let mut result = Ok(());
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                error!(worker = %name, "worker panicked");
                result = Err(LinkError::WorkerPanicked(name));
            }
        }
        result
    }
}

fn read_loop(mut reader: FrameReader<LinkStream>, inbound: &MessageQueue<Frame>, cancel: &CancelToken) {
    loop {
        match reader.read_frame() {
            Ok(frame) => inbound.push(frame),
            Err(FrameError::ChecksumMismatch {
                id,
                purpose,
                received,
                computed,
            }) => {
                warn!(id, %purpose, received, computed, "dropping frame with bad checksum");
            }
            Err(FrameError::UnknownPurpose(purpose)) => {
                warn!(purpose, "dropping frame with unknown purpose");
            }
            Err(FrameError::PayloadTooLarge { size, max }) => {
                warn!(size, max, "dropping frame header with impossible size");
            }
            Err(FrameError::Cancelled) => break,
            Err(FrameError::ConnectionClosed) => {
                info!("peer closed the link");
                break;
            }
            Err(err) => {
                error!(error = %err, "link read failed");
                break;
            }
        }
    }

    // Without a reader the link is dead; take the other workers down too.
    cancel.cancel();
    inbound.shutdown();
    debug!("reader stopped");
}

fn dispatch_loop(mut dispatcher: Dispatcher, inbound: &MessageQueue<Frame>) {
    while let Some(frame) = inbound.pop() {
        dispatcher.dispatch(frame);
    }
    debug!("dispatch stopped");
}

fn video_loop(scheduler: &Scheduler, camera: &dyn CameraSource, interval: Duration, cancel: &CancelToken) {
    while cancel.is_running() {
        let streaming = scheduler.stream_enabled(VID_FEED).unwrap_or(false);
        let backlog = scheduler.queued(VID_FEED).unwrap_or(0);
        if streaming && backlog < VIDEO_BACKLOG_FRAMES {
            let queued = camera
                .capture(StreamKind::Video)
                .and_then(|image| {
                    split(image, StreamKind::Video.purpose(), 0, scheduler.ids())
                        .map_err(LinkError::from)
                })
                .and_then(|frames| scheduler.add_messages(frames, VID_FEED));
            if let Err(err) = queued {
                warn!(error = %err, "video capture failed");
            }
        }
        std::thread::sleep(interval);
    }
    debug!("video feed stopped");
}
