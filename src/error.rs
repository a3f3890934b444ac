use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Segment writer error: {0}")]
    Writer(#[from] WriterError),

    /// The external cancellation token fired while the producer was blocked.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("No segment is currently open")]
    NoCurrentSegment,

    #[error("The system wall clock is invalid ({0:.3}s since the epoch)")]
    InvalidClock(f64),

    #[error("Failed to spawn the segment worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Segment worker thread panicked")]
    WorkerPanicked,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("segment time cannot be less than 1.0 second (got {0})")]
    SegmentTimeTooShort(f64),

    #[error("the cached list must hold at least one segment")]
    EmptyQueue,

    #[error("segment capacity must be greater than zero")]
    ZeroCapacity,

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("could not parse format options list '{0}'")]
    MalformedFormatOptions(String),

    #[error("format options not recognized by the muxer: {0}")]
    UnrecognizedFormatOptions(String),

    #[error("subtitle streams are not supported")]
    SubtitleStream,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// The muxer emitted more bytes than the segment buffer can hold.
    #[error("segment overflow: {len} bytes do not fit ({size}/{capacity} used)")]
    Overflow {
        capacity: usize,
        size: usize,
        len: usize,
    },
}

/// Errors reported by a segment writer.
///
/// Cloneable so the background worker can publish one sticky copy that the
/// producer reads on every subsequent call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriterError {
    #[error("No segment writer found for url: {0}")]
    NotFound(String),

    #[error("Writer({writer}) init failed for url {url}: {reason}")]
    Init {
        writer: String,
        url: String,
        reason: String,
    },

    #[error("Writer({writer}) failed to persist segment {sequence}: {reason}")]
    Write {
        writer: String,
        sequence: u64,
        reason: String,
    },
}
