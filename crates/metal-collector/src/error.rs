/// Errors raised while reading OS counters.
///
/// A read error never ends a collection window: the collector logs it and
/// treats the tick as "no change".
///
/// # Examples
///
/// ```rust
/// use metal_collector::error::SourceError;
///
/// let err = SourceError::parse("/proc/stat", "missing cpu line");
/// assert!(err.to_string().contains("/proc/stat"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The counter file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The counter file was read but its content was not understood.
    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    /// No counter source is available for this domain on the current platform.
    #[error("{0} counters are not supported on this platform")]
    Unsupported(&'static str),
}

impl SourceError {
    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

/// Convenience type alias for counter reads.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors returned when asking the manager for a new collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    /// A window is already pending or in flight.
    #[error("collection window already in progress")]
    Busy,

    /// The manager is no longer accepting requests.
    #[error("collector manager is not running")]
    Closed,
}
