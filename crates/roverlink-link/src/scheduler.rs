//! Weighted round-robin transmission with acknowledgment-driven retransmission.
//!
//! Each pass visits the topics in registration order and sends up to `weight`
//! frames from each. Every non-ACK frame that goes out is remembered in the
//! pending ring; after the pass the oldest pending entries are either dropped
//! (their id was acknowledged) or sent again and moved to the back.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use roverlink_frame::{Frame, FrameIdAllocator, FrameWriter, Purpose};
use roverlink_sync::{IdSet, MessageQueue};
use roverlink_transport::CancelToken;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::{LinkConfig, RetryPolicy, TopicConfig};
use crate::error::{LinkError, Result};

struct Topic {
    name: String,
    weight: u32,
    live: bool,
    enabled: AtomicBool,
    queue: MessageQueue<Frame>,
    sent: AtomicU64,
}

impl Topic {
    fn new(config: TopicConfig) -> Self {
        Self {
            name: config.name,
            weight: config.weight,
            live: config.live,
            enabled: AtomicBool::new(!config.live),
            queue: MessageQueue::new(),
            sent: AtomicU64::new(0),
        }
    }

    fn is_draining(&self) -> bool {
        self.live && !self.enabled.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct PendingAck {
    frame: Frame,
    attempts: u32,
}

/// What one [`Scheduler::run_cycle`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Frames sent from topic queues.
    pub sent: usize,
    /// Frames discarded from disabled live topics.
    pub drained: usize,
    /// Pending entries sent again.
    pub retransmitted: usize,
    /// Pending entries dropped because the peer acknowledged them.
    pub acknowledged: usize,
    /// Pending entries given up after the retry limit.
    pub abandoned: usize,
    /// Writes that failed.
    pub failed: usize,
}

impl CycleReport {
    /// Nothing went out on the wire.
    pub fn is_idle(&self) -> bool {
        self.sent == 0 && self.retransmitted == 0
    }
}

/// Queue depth and counters for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub name: String,
    pub weight: u32,
    pub live: bool,
    pub enabled: bool,
    pub queued: usize,
    pub sent: u64,
}

/// Snapshot returned by [`Scheduler::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub topics: Vec<TopicStats>,
    pub pending: usize,
    pub acknowledged: usize,
}

/// Outbound side of the link.
///
/// Shared between the scheduler thread, which calls [`run`](Self::run), and
/// everything that enqueues frames.
pub struct Scheduler {
    topics: Vec<Topic>,
    pending: Mutex<VecDeque<PendingAck>>,
    acknowledged: IdSet,
    ids: FrameIdAllocator,
    retry: RetryPolicy,
    idle_sleep: Duration,
}

impl Scheduler {
    /// Register the configured topics (plus `acknowledgment`) in order.
    pub fn new(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let topics = config
            .effective_topics()
            .into_iter()
            .map(Topic::new)
            .collect::<Vec<_>>();
        debug!(
            topics = ?topics.iter().map(|t| (t.name.as_str(), t.weight)).collect::<Vec<_>>(),
            "scheduler configured"
        );

        Ok(Self {
            topics,
            pending: Mutex::new(VecDeque::new()),
            acknowledged: IdSet::new(),
            ids: FrameIdAllocator::new(),
            retry: config.retry.clone(),
            idle_sleep: config.idle_sleep,
        })
    }

    fn topic(&self, name: &str) -> Result<&Topic> {
        self.topics
            .iter()
            .find(|topic| topic.name == name)
            .ok_or_else(|| LinkError::UnknownTopic(name.to_string()))
    }

    /// Ids for frames originating on this side of the link.
    pub fn ids(&self) -> &FrameIdAllocator {
        &self.ids
    }

    /// Build a frame with a fresh id.
    pub fn frame(&self, purpose: Purpose, payload: impl Into<Bytes>) -> Frame {
        Frame::new(self.ids.next_id(), purpose, payload)
    }

    /// Queue a frame on `topic`.
    pub fn add_message(&self, frame: Frame, topic: &str) -> Result<()> {
        self.topic(topic)?.queue.push(frame);
        Ok(())
    }

    /// Queue frames on `topic`, keeping their order.
    pub fn add_messages(&self, frames: impl IntoIterator<Item = Frame>, topic: &str) -> Result<()> {
        self.topic(topic)?.queue.extend(frames);
        Ok(())
    }

    /// Take a queued frame back before it is sent.
    pub fn remove_message(&self, id: u16, topic: &str) -> Result<Option<Frame>> {
        Ok(self.topic(topic)?.queue.remove(id))
    }

    /// Record that the peer acknowledged `id`. The pending entry is dropped
    /// when the retransmission pass next reaches it.
    pub fn acknowledgment_received(&self, id: u16) {
        trace!(id, "acknowledgment received");
        self.acknowledged.add(id);
    }

    /// Enable or disable a live stream. While disabled its queue is drained.
    /// Live topics start disabled.
    pub fn set_stream_enabled(&self, topic: &str, enabled: bool) -> Result<()> {
        let topic = self.topic(topic)?;
        topic.enabled.store(enabled, Ordering::Release);
        info!(topic = %topic.name, enabled, "stream toggled");
        Ok(())
    }

    pub fn stream_enabled(&self, topic: &str) -> Result<bool> {
        Ok(self.topic(topic)?.enabled.load(Ordering::Acquire))
    }

    /// Frames waiting on `topic`.
    pub fn queued(&self, topic: &str) -> Result<usize> {
        Ok(self.topic(topic)?.queue.len())
    }

    /// Number of sent frames still waiting for an acknowledgment.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            topics: self
                .topics
                .iter()
                .map(|topic| TopicStats {
                    name: topic.name.clone(),
                    weight: topic.weight,
                    live: topic.live,
                    enabled: topic.enabled.load(Ordering::Acquire),
                    queued: topic.queue.len(),
                    sent: topic.sent.load(Ordering::Relaxed),
                })
                .collect(),
            pending: self.pending_len(),
            acknowledged: self.acknowledged.len(),
        }
    }

    /// One weighted pass over every topic followed by one retransmission batch.
    pub fn run_cycle<W: Write>(&self, writer: &mut FrameWriter<W>) -> CycleReport {
        let mut report = CycleReport::default();

        for topic in &self.topics {
            if topic.is_draining() {
                let drained = topic.queue.clear();
                if drained > 0 {
                    trace!(topic = %topic.name, drained, "drained disabled stream");
                }
                report.drained += drained;
                continue;
            }

            for _ in 0..topic.weight {
                let Some(frame) = topic.queue.try_pop() else {
                    break;
                };
                if frame.purpose != Purpose::Ack {
                    // A reused id must not inherit an old acknowledgment. Cleared
                    // before the write: the peer may answer before it returns.
                    self.acknowledged.remove(frame.id);
                }
                if let Err(err) = writer.write_frame(&frame) {
                    warn!(topic = %topic.name, id = frame.id, error = %err, "frame write failed");
                    report.failed += 1;
                    continue;
                }
                report.sent += 1;
                topic.sent.fetch_add(1, Ordering::Relaxed);

                if frame.purpose != Purpose::Ack {
                    self.lock_pending()
                        .push_back(PendingAck { frame, attempts: 0 });
                }
            }
        }

        self.retransmit(writer, &mut report);
        report
    }

    fn retransmit<W: Write>(&self, writer: &mut FrameWriter<W>, report: &mut CycleReport) {
        for _ in 0..self.retry.batch {
            let Some(mut entry) = self.lock_pending().pop_front() else {
                return;
            };

            if self.acknowledged.remove(entry.frame.id) {
                report.acknowledged += 1;
                continue;
            }

            if self
                .retry
                .max_attempts
                .is_some_and(|max| entry.attempts >= max)
            {
                warn!(
                    id = entry.frame.id,
                    purpose = %entry.frame.purpose,
                    attempts = entry.attempts,
                    "giving up on unacknowledged frame"
                );
                report.abandoned += 1;
                continue;
            }

            if !self.retry.pacing.is_zero() {
                std::thread::sleep(self.retry.pacing);
            }
            entry.attempts += 1;
            match writer.write_frame(&entry.frame) {
                Ok(()) => {
                    trace!(id = entry.frame.id, attempts = entry.attempts, "retransmitted");
                    report.retransmitted += 1;
                }
                Err(err) => {
                    warn!(id = entry.frame.id, error = %err, "retransmission failed");
                    report.failed += 1;
                }
            }
            self.lock_pending().push_back(entry);
        }
    }

    /// Run passes until `cancel` fires.
    pub fn run<W: Write>(&self, writer: &mut FrameWriter<W>, cancel: &CancelToken) {
        info!("scheduler started");
        while cancel.is_running() {
            let report = self.run_cycle(writer);
            if report.is_idle() {
                std::thread::sleep(self.idle_sleep);
            }
        }
        info!("scheduler stopped");
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PendingAck>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field(
                "topics",
                &self.topics.iter().map(|t| &t.name).collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use bytes::BytesMut;
    use roverlink_frame::{decode_frame, FrameConfig};

    use super::*;
    use crate::config::{ACKNOWLEDGMENT, VID_FEED};

    fn config(topics: Vec<TopicConfig>, retry: RetryPolicy) -> LinkConfig {
        LinkConfig {
            topics,
            retry,
            idle_sleep: Duration::from_millis(1),
            ..LinkConfig::default()
        }
    }

    fn no_pacing() -> RetryPolicy {
        RetryPolicy {
            batch: 1,
            pacing: Duration::ZERO,
            max_attempts: None,
        }
    }

    fn writer() -> FrameWriter<Cursor<Vec<u8>>> {
        FrameWriter::new(Cursor::new(Vec::new()))
    }

    fn take_sent(writer: &mut FrameWriter<Cursor<Vec<u8>>>) -> Vec<Frame> {
        let bytes = std::mem::take(writer.get_mut().get_mut());
        writer.get_mut().set_position(0);
        let mut wire = BytesMut::from(bytes.as_slice());
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, &FrameConfig::default()).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn fill(scheduler: &Scheduler, topic: &str, purpose: Purpose, count: usize) {
        for _ in 0..count {
            let frame = scheduler.frame(purpose, &b"x"[..]);
            scheduler.add_message(frame, topic).unwrap();
        }
    }

    #[test]
    fn weighted_round_robin_3_to_1() {
        let scheduler = Scheduler::new(&config(
            vec![TopicConfig::new("a", 3), TopicConfig::new("b", 1)],
            RetryPolicy {
                batch: 1,
                pacing: Duration::ZERO,
                max_attempts: Some(0),
            },
        ))
        .unwrap();
        fill(&scheduler, "a", Purpose::Ack, 10);
        fill(&scheduler, "b", Purpose::Error, 10);

        let mut w = writer();
        let report = scheduler.run_cycle(&mut w);
        let sent = take_sent(&mut w);

        assert_eq!(report.sent, 4);
        let purposes: Vec<Purpose> = sent.iter().map(|f| f.purpose).collect();
        assert_eq!(
            purposes,
            vec![Purpose::Ack, Purpose::Ack, Purpose::Ack, Purpose::Error]
        );
        assert_eq!(scheduler.queued("a").unwrap(), 7);
        assert_eq!(scheduler.queued("b").unwrap(), 9);
    }

    #[test]
    fn topic_order_is_fifo() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 5)], no_pacing())).unwrap();
        let ids: Vec<u16> = (0..5)
            .map(|_| {
                let frame = scheduler.frame(Purpose::Ack, &b"x"[..]);
                let id = frame.id;
                scheduler.add_message(frame, "a").unwrap();
                id
            })
            .collect();

        let mut w = writer();
        scheduler.run_cycle(&mut w);
        let sent: Vec<u16> = take_sent(&mut w).iter().map(|f| f.id).collect();
        assert_eq!(sent, ids);
    }

    #[test]
    fn retransmits_until_acknowledged() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap();
        let frame = scheduler.frame(Purpose::Error, &b"hello"[..]);
        let id = frame.id;
        scheduler.add_message(frame, "a").unwrap();

        let mut w = writer();
        let first = scheduler.run_cycle(&mut w);
        assert_eq!((first.sent, first.retransmitted), (1, 1));

        let second = scheduler.run_cycle(&mut w);
        assert_eq!((second.sent, second.retransmitted), (0, 1));

        let sent = take_sent(&mut w);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|f| f.id == id));

        scheduler.acknowledgment_received(id);
        let third = scheduler.run_cycle(&mut w);
        assert_eq!((third.retransmitted, third.acknowledged), (0, 1));
        assert_eq!(scheduler.pending_len(), 0);
        assert!(take_sent(&mut w).is_empty());

        let idle = scheduler.run_cycle(&mut w);
        assert!(idle.is_idle());
    }

    #[test]
    fn acks_are_not_retransmitted() {
        let scheduler = Scheduler::new(&config(vec![], no_pacing())).unwrap();
        scheduler.add_message(Frame::ack(1, 42), ACKNOWLEDGMENT).unwrap();

        let mut w = writer();
        let report = scheduler.run_cycle(&mut w);
        assert_eq!((report.sent, report.retransmitted), (1, 0));
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn retry_limit_abandons_entry() {
        let scheduler = Scheduler::new(&config(
            vec![TopicConfig::new("a", 1)],
            RetryPolicy {
                batch: 1,
                pacing: Duration::ZERO,
                max_attempts: Some(2),
            },
        ))
        .unwrap();
        fill(&scheduler, "a", Purpose::Csv, 1);

        let mut w = writer();
        let reports: Vec<CycleReport> = (0..3).map(|_| scheduler.run_cycle(&mut w)).collect();

        assert_eq!(reports[0].retransmitted, 1);
        assert_eq!(reports[1].retransmitted, 1);
        assert_eq!(reports[2].abandoned, 1);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(take_sent(&mut w).len(), 3);
    }

    #[test]
    fn stale_acknowledgment_is_cleared_on_send() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap();
        scheduler.acknowledgment_received(0);
        fill(&scheduler, "a", Purpose::Error, 1);

        let mut w = writer();
        let report = scheduler.run_cycle(&mut w);
        assert_eq!((report.acknowledged, report.retransmitted), (0, 1));
    }

    #[test]
    fn acknowledgment_during_write_is_kept() {
        let scheduler = Arc::new(
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap(),
        );
        let frame = scheduler.frame(Purpose::Csv, &b"t,v"[..]);
        let id = frame.id;
        scheduler.add_message(frame, "a").unwrap();

        let mut w = FrameWriter::new(PeerAcksOnFlush {
            scheduler: Arc::clone(&scheduler),
            ack: Some(id),
            data: Vec::new(),
        });
        let report = scheduler.run_cycle(&mut w);

        assert_eq!(report.sent, 1);
        assert_eq!((report.acknowledged, report.retransmitted), (1, 0));
        assert_eq!(scheduler.pending_len(), 0);
        let mut wire = BytesMut::from(w.get_ref().data.as_slice());
        let sent = decode_frame(&mut wire, &FrameConfig::default()).unwrap().unwrap();
        assert_eq!(sent.id, id);
    }

    /// Stands in for a peer that answers before `write_frame` returns.
    struct PeerAcksOnFlush {
        scheduler: Arc<Scheduler>,
        ack: Option<u16>,
        data: Vec<u8>,
    }

    impl Write for PeerAcksOnFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(id) = self.ack.take() {
                self.scheduler.acknowledgment_received(id);
            }
            Ok(())
        }
    }

    #[test]
    fn disabled_live_topic_is_drained() {
        let scheduler = Scheduler::new(&config(
            vec![TopicConfig::new(VID_FEED, 10).live(), TopicConfig::new("b", 1)],
            no_pacing(),
        ))
        .unwrap();
        assert!(!scheduler.stream_enabled(VID_FEED).unwrap());
        fill(&scheduler, VID_FEED, Purpose::Video, 4);

        let mut w = writer();
        let report = scheduler.run_cycle(&mut w);
        assert_eq!((report.sent, report.drained), (0, 4));
        assert_eq!(scheduler.queued(VID_FEED).unwrap(), 0);

        scheduler.set_stream_enabled(VID_FEED, true).unwrap();
        fill(&scheduler, VID_FEED, Purpose::Video, 2);
        let report = scheduler.run_cycle(&mut w);
        assert_eq!(report.sent, 2);
    }

    #[test]
    fn disabled_non_live_topic_still_sends() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap();
        scheduler.set_stream_enabled("a", false).unwrap();
        fill(&scheduler, "a", Purpose::Error, 1);

        let report = scheduler.run_cycle(&mut writer());
        assert_eq!(report.sent, 1);
    }

    #[test]
    fn unknown_topic_is_an_error() {
        let scheduler = Scheduler::new(&config(vec![], no_pacing())).unwrap();
        let frame = scheduler.frame(Purpose::Error, &b"x"[..]);

        assert!(matches!(
            scheduler.add_message(frame.clone(), "nope"),
            Err(LinkError::UnknownTopic(name)) if name == "nope"
        ));
        assert!(scheduler.add_messages(vec![frame], "nope").is_err());
        assert!(scheduler.set_stream_enabled("nope", true).is_err());
        assert!(scheduler.queued("nope").is_err());
    }

    #[test]
    fn remove_message_before_send() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap();
        let frame = scheduler.frame(Purpose::Error, &b"x"[..]);
        let id = frame.id;
        scheduler.add_message(frame, "a").unwrap();

        assert_eq!(scheduler.remove_message(id, "a").unwrap().map(|f| f.id), Some(id));
        assert_eq!(scheduler.remove_message(id, "a").unwrap(), None);
        assert!(scheduler.run_cycle(&mut writer()).is_idle());
    }

    #[test]
    fn write_failure_does_not_stop_the_pass() {
        let scheduler =
            Scheduler::new(&config(vec![TopicConfig::new("a", 2)], no_pacing())).unwrap();
        fill(&scheduler, "a", Purpose::Error, 2);

        let mut w = FrameWriter::new(FailingWriter);
        let report = scheduler.run_cycle(&mut w);
        assert_eq!((report.sent, report.failed), (0, 2));
        assert_eq!(scheduler.queued("a").unwrap(), 0);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn run_stops_on_cancel() {
        let scheduler = std::sync::Arc::new(
            Scheduler::new(&config(vec![TopicConfig::new("a", 1)], no_pacing())).unwrap(),
        );
        scheduler
            .add_message(Frame::ack(0, 1), "a")
            .unwrap();
        let cancel = CancelToken::new();

        let handle = {
            let scheduler = std::sync::Arc::clone(&scheduler);
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                let mut w = writer();
                scheduler.run(&mut w, &cancel);
                take_sent(&mut w)
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        let sent = handle.join().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(scheduler.stats().topics[0].sent, 1);
    }

    #[test]
    fn stats_snapshot() {
        let scheduler = Scheduler::new(&LinkConfig::rover()).unwrap();
        fill(&scheduler, "status", Purpose::Error, 2);

        let stats = scheduler.stats();
        assert_eq!(stats.topics.len(), 7);
        assert_eq!(stats.topics[0].name, "status");
        assert_eq!(stats.topics[0].queued, 2);
        assert!(stats.topics[1].live);
        assert!(!stats.topics[1].enabled);
        assert!(stats.topics[0].enabled);
        assert_eq!(stats.pending, 0);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
