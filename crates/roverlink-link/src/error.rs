/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No topic with this name is registered with the scheduler.
    #[error("unknown topic {0:?}")]
    UnknownTopic(String),

    /// The link configuration is inconsistent.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),

    /// A frame arrived that does not make sense in the current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The camera could not produce an image.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A worker thread panicked.
    #[error("worker thread {0} panicked")]
    WorkerPanicked(String),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] roverlink_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] roverlink_transport::TransportError),

    /// Filesystem or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
