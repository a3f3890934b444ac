//! # cached-segment
//!
//! A segment-based recording engine for live media. Encoded container bytes
//! are cut into bounded, keyframe-aligned segments in memory and handed to a
//! dedicated background thread that persists them through a pluggable
//! [`SegmentWriter`](writer::SegmentWriter) (local file, cloud upload, or a
//! no-op sink).
//!
//! ## Architecture
//!
//! - The **producer** is the caller's thread driving the container muxer. It
//!   owns the in-progress [`Segment`], decides where to cut
//!   ([`CachedSegmentContext::on_access_unit`]) and enqueues closed segments.
//! - The **worker** pops ready segments in FIFO order and calls the writer
//!   with the queue lock released. Used buffers return to a free pool.
//! - A writer failure is sticky: the worker stops and every later producer
//!   call reports the error.
//!
//! ## Backpressure
//!
//! With [`BackpressureMode::Block`] a full ready queue stalls the producer
//! (cancellable through a [`CancellationToken`]); with
//! [`BackpressureMode::DropOldest`] the oldest ready segment is evicted and
//! the producer never waits.
//!
//! ## Pre-roll
//!
//! While persistence is disabled the newest `pre_roll` seconds of segments
//! stay in memory and older ones are released. Enabling persistence at
//! runtime writes the retained segments first.
//!
//! ## Example
//!
//! ```rust
//! use cached_segment::writer::WriterRegistry;
//! use cached_segment::{AccessUnit, CachedSegmentConfig, CachedSegmentContext, MediaKind, RawMuxer, Recorder, TimeBase};
//!
//! let registry = WriterRegistry::with_builtin();
//! let builder = CachedSegmentContext::builder("dummy://camera")
//!     .config(CachedSegmentConfig::new().set_segment_time(4.0));
//! let mut recorder = Recorder::start(builder, &registry, RawMuxer, &[MediaKind::Video])?;
//!
//! for frame in 0..250i64 {
//!     let unit = AccessUnit::video(frame * 3_600, TimeBase::MPEG_90K, frame % 50 == 0);
//!     recorder.write(&unit, &[0x47; 188])?;
//! }
//! let stats = recorder.finish()?;
//! assert_eq!(stats.enqueued, 3);
//! # Ok::<(), cached_segment::Error>(())
//! ```

pub mod core;
pub mod error;
pub mod writer;

pub use crate::core::cancel::CancellationToken;
pub use crate::core::config::{BackpressureMode, CachedSegmentConfig, FormatOptions};
pub use crate::core::context::{CachedSegmentContext, CachedSegmentContextBuilder, SplitDecision};
pub use crate::core::recorder::{ContainerMuxer, RawMuxer, Recorder};
pub use crate::core::segment::{Segment, Sink};
pub use crate::core::segment_list::SegmentList;
pub use crate::core::stats::{SegmentEvent, SegmentInfo, StatsSnapshot};
pub use crate::core::timestamp::{AccessUnit, MediaKind, TimeBase};
pub use crate::error::{Error, Result};
pub use crate::writer::{SegmentWriter, WriteOutcome, WriterContext, WriterEntry, WriterRegistry};
