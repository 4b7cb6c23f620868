//! Link configuration: topics, retransmission policy and worker timing.
//!
//! Loaded from JSON. Every field has a default, so a file only needs the
//! parts it changes:
//!
//! ```json
//! {
//!   "topics": [
//!     { "name": "status", "weight": 3 },
//!     { "name": "vid_feed", "weight": 10, "live": true }
//!   ],
//!   "retry": { "batch": 1, "pacing_ms": 50, "max_attempts": 20 }
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Status and debug text.
pub const STATUS: &str = "status";
/// Live video fragments.
pub const VID_FEED: &str = "vid_feed";
/// Drive and position updates.
pub const POSITION: &str = "position";
/// High definition photo fragments.
pub const HDP: &str = "hdp";
/// Low definition photo fragments.
pub const LDP: &str = "ldp";
/// File transfer frames.
pub const FILE: &str = "file";
/// Station commands.
pub const ALL: &str = "all";
/// Outgoing acknowledgments. Always registered.
pub const ACKNOWLEDGMENT: &str = "acknowledgment";

/// Weight of [`ACKNOWLEDGMENT`] when the configuration does not list it.
pub const DEFAULT_ACK_WEIGHT: u32 = 5;

/// How many processed ids the dispatcher remembers for deduplication.
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

/// One scheduler topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    /// Frames sent from this topic per scheduling pass. Must be at least 1.
    pub weight: u32,
    /// Live topics are drained instead of sent while their stream is disabled.
    #[serde(default)]
    pub live: bool,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            live: false,
        }
    }

    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }
}

/// Retransmission of unacknowledged frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Pending entries examined after each scheduling pass.
    pub batch: usize,
    /// Delay before each retransmission.
    #[serde(rename = "pacing_ms", with = "millis")]
    pub pacing: Duration,
    /// Retransmissions before an entry is abandoned. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            batch: 1,
            pacing: Duration::from_millis(50),
            max_attempts: None,
        }
    }
}

/// Everything a [`LinkContext`](crate::LinkContext) needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Topics in scheduling order.
    pub topics: Vec<TopicConfig>,
    pub retry: RetryPolicy,
    /// Scheduler sleep after a pass that sent nothing.
    #[serde(rename = "idle_sleep_ms", with = "millis")]
    pub idle_sleep: Duration,
    /// Stream read timeout; bounds how long shutdown waits on the reader.
    #[serde(rename = "read_timeout_ms", with = "millis")]
    pub read_timeout: Duration,
    pub dedup_window: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::rover()
    }
}

impl LinkConfig {
    fn with_topics(topics: Vec<TopicConfig>) -> Self {
        Self {
            topics,
            retry: RetryPolicy::default(),
            idle_sleep: Duration::from_millis(10),
            read_timeout: Duration::from_millis(100),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    /// The rover's topic layout.
    pub fn rover() -> Self {
        Self::with_topics(vec![
            TopicConfig::new(STATUS, 3),
            TopicConfig::new(VID_FEED, 10).live(),
            TopicConfig::new(POSITION, 1),
            TopicConfig::new(HDP, 1),
            TopicConfig::new(LDP, 1),
            TopicConfig::new(FILE, 1),
            TopicConfig::new(ACKNOWLEDGMENT, DEFAULT_ACK_WEIGHT),
        ])
    }

    /// The station's topic layout.
    pub fn station() -> Self {
        Self::with_topics(vec![
            TopicConfig::new(ALL, 3),
            TopicConfig::new(STATUS, 1),
            TopicConfig::new(FILE, 1),
            TopicConfig::new(ACKNOWLEDGMENT, DEFAULT_ACK_WEIGHT),
        ])
    }

    /// Parse a JSON configuration and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Topic names must be unique and non-empty, weights and the retry batch at least 1.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.name.is_empty() {
                return Err(LinkError::InvalidConfig("empty topic name".to_string()));
            }
            if topic.weight == 0 {
                return Err(LinkError::InvalidConfig(format!(
                    "topic {:?} has weight 0",
                    topic.name
                )));
            }
            if !seen.insert(topic.name.as_str()) {
                return Err(LinkError::InvalidConfig(format!(
                    "duplicate topic {:?}",
                    topic.name
                )));
            }
        }
        if self.retry.batch == 0 {
            return Err(LinkError::InvalidConfig(
                "retry batch must be at least 1".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "read timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Topics in scheduling order, with [`ACKNOWLEDGMENT`] appended if missing.
    pub fn effective_topics(&self) -> Vec<TopicConfig> {
        let mut topics = self.topics.clone();
        if !topics.iter().any(|topic| topic.name == ACKNOWLEDGMENT) {
            topics.push(TopicConfig::new(ACKNOWLEDGMENT, DEFAULT_ACK_WEIGHT));
        }
        topics
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
