/// Result alias that carries the custom [`SyncError`] type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// An event whose interval is empty or inverted.
    #[error("timeline `{timeline}` event {index} has an empty interval [{start_ms}, {end_ms})")]
    MalformedEvent {
        timeline: String,
        index: usize,
        start_ms: u64,
        end_ms: u64,
    },
    /// Seek targets must be finite numbers.
    #[error("cannot seek to non-finite position {0}")]
    InvalidSeek(f64),
    /// A behaviour sink refused a batch.
    #[error("event sink rejected batch: {0}")]
    Sink(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SyncError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SyncError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
