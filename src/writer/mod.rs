//! Segment writers: the persistence backends fed by the background worker.
//!
//! A writer is chosen by the scheme of the destination url. The registry is
//! an ordinary value built once at start-up and passed to
//! [`CachedSegmentContext::builder`](crate::CachedSegmentContext::builder);
//! there is no global registration.
//!
//! # Example
//!
//! ```rust
//! use cached_segment::writer::{url_scheme, WriterRegistry};
//!
//! let registry = WriterRegistry::with_builtin();
//! assert_eq!(url_scheme("/var/record/cam1.ts"), "file");
//! assert_eq!(registry.find("dummy://cam1").unwrap().name(), "dummy_writer");
//! assert!(registry.find("zz://cam1").is_err());
//! ```

pub mod cloud;
pub mod dummy;
pub mod file;

use crate::core::segment::Segment;
use crate::error::WriterError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use cloud::{CloudWriter, CreateRequest, ObjectStore, RemoteObject, StoreError};
pub use dummy::DummyWriter;
pub use file::FileWriter;

/// Non-fatal result of [`SegmentWriter::write_segment`].
///
/// Both variants release the segment back to the free pool; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The backend is temporarily unable to persist; the segment is dropped.
    Skipped,
}

/// Read-only view of the recording a writer serves.
#[derive(Debug, Clone)]
pub struct WriterContext {
    url: String,
    writer_timeout: Option<Duration>,
    segment_time: f64,
}

impl WriterContext {
    pub fn new(url: impl Into<String>, writer_timeout: Option<Duration>, segment_time: f64) -> Self {
        Self {
            url: url.into(),
            writer_timeout,
            segment_time,
        }
    }

    /// Destination url the recording was started with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// I/O timeout the backend should honour, `None` for unbounded.
    pub fn writer_timeout(&self) -> Option<Duration> {
        self.writer_timeout
    }

    pub fn segment_time(&self) -> f64 {
        self.segment_time
    }
}

/// A persistence backend.
///
/// `init` runs on the producer thread before the worker starts, every
/// `write_segment` runs on the worker thread, and `uninit` runs after the
/// worker has been joined.
pub trait SegmentWriter: Send {
    fn init(&mut self, _ctx: &WriterContext) -> Result<(), WriterError> {
        Ok(())
    }

    /// Persist one segment. An `Err` is fatal for the rest of the recording.
    fn write_segment(
        &mut self,
        ctx: &WriterContext,
        segment: &Segment,
    ) -> Result<WriteOutcome, WriterError>;

    fn uninit(&mut self, _ctx: &WriterContext) {}
}

/// Build a [`WriterError::Write`] for `segment`.
pub fn write_failure(writer: &str, segment: &Segment, reason: impl fmt::Display) -> WriterError {
    WriterError::Write {
        writer: writer.to_string(),
        sequence: segment.sequence(),
        reason: reason.to_string(),
    }
}

type WriterFactory = dyn Fn() -> Box<dyn SegmentWriter> + Send + Sync;

/// A registered writer: identity, claimed schemes and a factory producing
/// one instance per recording.
#[derive(Clone)]
pub struct WriterEntry {
    name: String,
    description: String,
    schemes: Vec<String>,
    factory: Arc<WriterFactory>,
}

impl WriterEntry {
    pub fn new<F, W>(
        name: impl Into<String>,
        description: impl Into<String>,
        schemes: &[&str],
        factory: F,
    ) -> Self
    where
        F: Fn() -> W + Send + Sync + 'static,
        W: SegmentWriter + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schemes: schemes.iter().map(|s| s.to_ascii_lowercase()).collect(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn SegmentWriter>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    pub fn matches(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }

    pub fn create(&self) -> Box<dyn SegmentWriter> {
        (self.factory)()
    }
}

impl fmt::Debug for WriterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schemes", &self.schemes)
            .finish()
    }
}

/// Scheme-to-writer dispatch table. Lookup is first-match-wins in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct WriterRegistry {
    entries: Vec<WriterEntry>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `file` and `dummy` writers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(FileWriter::entry())
            .register(DummyWriter::entry());
        registry
    }

    pub fn register(&mut self, entry: WriterEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[WriterEntry] {
        &self.entries
    }

    /// Find the writer claiming the scheme of `url` (`file` when it has none).
    pub fn find(&self, url: &str) -> Result<&WriterEntry, WriterError> {
        let scheme = url_scheme(url);
        self.entries
            .iter()
            .find(|entry| entry.matches(scheme))
            .ok_or_else(|| WriterError::NotFound(url.to_string()))
    }
}

/// Scheme prefix of a destination url, `"file"` when absent.
///
/// A single letter before the colon is a drive letter, not a scheme.
pub fn url_scheme(url: &str) -> &str {
    let Some((scheme, _)) = url.split_once(':') else {
        return "file";
    };
    let mut chars = scheme.chars();
    let valid = scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        scheme
    } else {
        "file"
    }
}
