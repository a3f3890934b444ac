// src/core/context.rs - Producer side of a cached segment recording
//
// Core features:
// - Keyframe-aligned split decision against fixed target slots
// - Segment buffers recycled through the free pool
// - Validity filtering (real start, at least one second) before enqueue
// - Sequence numbers and byte offsets assigned at enqueue time
// - Writer selected by url scheme, initialised before the worker starts,
//   uninitialised after it has been joined

use crate::core::cancel::CancellationToken;
use crate::core::config::CachedSegmentConfig;
use crate::core::segment::{Segment, Sink};
use crate::core::stats::{EventSink, SegmentEvent, SegmentInfo, StatsSnapshot};
use crate::core::timestamp::{micros_to_secs, wall_clock_secs, AccessUnit, MICROS_PER_SEC};
use crate::core::worker::{spawn_worker, Shared};
use crate::error::{Error, Result};
use crate::writer::{WriterContext, WriterRegistry};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Outcome of [`CachedSegmentContext::on_access_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDecision {
    /// Keep writing into the current segment.
    Continue,
    /// Finish the current segment before writing this unit: flush the muxer
    /// into the old sink, call `close_segment_and_enqueue`, then
    /// `open_segment` and re-emit any header into the new sink.
    Cut,
}

pub struct CachedSegmentContextBuilder {
    url: String,
    config: CachedSegmentConfig,
    cancel: Option<CancellationToken>,
    events: Option<Sender<SegmentEvent>>,
}

impl CachedSegmentContextBuilder {
    pub fn config(mut self, config: CachedSegmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Token polled by a producer blocked on a full ready queue.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Channel receiving [`SegmentEvent`]s. Events are dropped when it is full.
    pub fn event_sender(mut self, sender: Sender<SegmentEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn get_config(&self) -> &CachedSegmentConfig {
        &self.config
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Select and initialise the writer, open the first segment and spawn
    /// the worker.
    pub fn start(self, registry: &WriterRegistry) -> Result<CachedSegmentContext> {
        self.config.validate()?;

        let entry = registry.find(&self.url)?;
        info!("Cached segment recording to {} using {}", self.url, entry.name());

        let writer_ctx = WriterContext::new(
            self.url.clone(),
            self.config.writer_timeout(),
            self.config.segment_time(),
        );
        let mut writer = entry.create();
        writer.init(&writer_ctx)?;

        let shared = Arc::new(Shared::new(
            entry.name(),
            writer,
            writer_ctx,
            self.config.persistence(),
            self.config.retention_keep(),
            self.config.max_queued(),
            EventSink::new(self.events),
        ));

        let mut context = CachedSegmentContext {
            url: self.url,
            next_sequence: self.config.start_number(),
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
            shared,
            worker: None,
            current: None,
            start_pts: None,
            start_ts: 0.0,
            pending_cut: None,
            segments_opened: 0,
            byte_offset: 0,
        };
        context.open_segment();

        match spawn_worker(context.shared.clone()) {
            Ok(handle) => context.worker = Some(handle),
            Err(e) => {
                error!("Failed to start segment worker: {e}");
                context.shared.uninit_writer();
                return Err(e);
            }
        }
        Ok(context)
    }
}

/// A running recording: the producer-side state plus the handle of its
/// background writer thread.
///
/// The muxer drives it from a single thread:
///
/// ```rust
/// use cached_segment::writer::WriterRegistry;
/// use cached_segment::{AccessUnit, CachedSegmentConfig, CachedSegmentContext, SplitDecision, TimeBase};
///
/// let registry = WriterRegistry::with_builtin();
/// let mut ctx = CachedSegmentContext::builder("dummy://cam1")
///     .config(CachedSegmentConfig::new().set_segment_time(2.0))
///     .start(&registry)?;
///
/// for i in 0..10i64 {
///     let unit = AccessUnit::video(i * 90_000, TimeBase::MPEG_90K, i % 2 == 0);
///     if ctx.on_access_unit(&unit, true)? == SplitDecision::Cut {
///         ctx.close_segment_and_enqueue()?;
///         ctx.open_segment();
///     }
///     ctx.write(&[0u8; 188])?;
/// }
/// let stats = ctx.stop()?;
/// assert_eq!(stats.enqueued, 5);
/// # Ok::<(), cached_segment::Error>(())
/// ```
pub struct CachedSegmentContext {
    url: String,
    config: CachedSegmentConfig,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    current: Option<Segment>,
    /// Recording start, microseconds.
    start_pts: Option<i64>,
    /// Recording start, seconds since the epoch.
    start_ts: f64,
    pending_cut: Option<i64>,
    segments_opened: u64,
    next_sequence: u64,
    byte_offset: u64,
}

impl CachedSegmentContext {
    pub fn builder(url: impl Into<String>) -> CachedSegmentContextBuilder {
        CachedSegmentContextBuilder {
            url: url.into(),
            config: CachedSegmentConfig::default(),
            cancel: None,
            events: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &CachedSegmentConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Closed segments waiting for the worker.
    pub fn queued(&self) -> usize {
        self.shared.ready_len()
    }

    pub fn current_segment(&self) -> Option<&Segment> {
        self.current.as_ref()
    }

    /// Start a new in-progress segment, reusing a free buffer when one is
    /// available.
    pub fn open_segment(&mut self) {
        if let Some(stale) = self.current.take() {
            warn!(
                "Segment opened while another was in progress, discarding {} bytes",
                stale.size()
            );
            self.discard(stale);
        }

        let mut segment = match self.shared.take_free() {
            Some(segment) => segment,
            None => {
                self.shared.stats.inc_allocated();
                Segment::with_capacity(self.config.segment_capacity())
            }
        };
        if let (Some(cut), Some(start_pts)) = (self.pending_cut.take(), self.start_pts) {
            segment.set_start(cut, self.start_ts + micros_to_secs(cut - start_pts));
        }
        self.current = Some(segment);
        self.segments_opened += 1;
        self.shared.stats.inc_opened();
    }

    /// Byte sink of the in-progress segment.
    pub fn sink(&mut self) -> Result<&mut dyn Sink> {
        match self.current.as_mut() {
            Some(segment) => Ok(segment as &mut dyn Sink),
            None => Err(Error::NoCurrentSegment),
        }
    }

    /// Append muxer output to the in-progress segment.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let segment = self.current.as_mut().ok_or(Error::NoCurrentSegment)?;
        segment.append(buf)?;
        Ok(())
    }

    /// Split hook, called before each access unit is written.
    ///
    /// Units without a pts are accepted but never start a segment or cut one.
    /// With video present only video keyframes are split candidates;
    /// otherwise every unit is. A candidate cuts once its distance from the
    /// recording start reaches the end of the current target slot.
    pub fn on_access_unit(&mut self, unit: &AccessUnit, has_video: bool) -> Result<SplitDecision> {
        if let Some(err) = self.shared.fatal() {
            return Err(err.into());
        }
        if self.current.is_none() {
            return Err(Error::NoCurrentSegment);
        }
        let Some(pts) = unit.pts_micros() else {
            return Ok(SplitDecision::Continue);
        };

        let start_pts = match self.start_pts {
            Some(start_pts) => start_pts,
            None => {
                self.start_ts = match self.config.start_ts() {
                    Some(ts) => ts,
                    None => wall_clock_secs()?,
                };
                self.start_pts = Some(pts);
                debug!("Recording starts at pts {}us, {:.3}s", pts, self.start_ts);
                pts
            }
        };
        let start_ts = self.start_ts;

        let Some(segment) = self.current.as_mut() else {
            return Err(Error::NoCurrentSegment);
        };
        if segment.start_pts().is_none() {
            segment.set_start(pts, start_ts + micros_to_secs(pts - start_pts));
        }

        let is_reference = !has_video || unit.is_video();
        if is_reference {
            if let Some(segment_start) = segment.start_pts() {
                segment.set_duration(micros_to_secs(pts - segment_start).max(0.0));
            }
        }

        let can_split = if has_video {
            unit.is_video() && unit.is_keyframe
        } else {
            true
        };
        let slot_end = self.segment_time_us().saturating_mul(self.segments_opened as i64);
        if can_split && pts - start_pts >= slot_end {
            self.pending_cut = Some(pts);
            return Ok(SplitDecision::Cut);
        }
        Ok(SplitDecision::Continue)
    }

    /// Hand the in-progress segment to the ready queue, or recycle it when
    /// it has no real start or lasts less than a second.
    ///
    /// In block mode this waits for room in the queue and fails with
    /// [`Error::Cancelled`] when the cancellation token fires meanwhile.
    pub fn close_segment_and_enqueue(&mut self) -> Result<()> {
        let segment = self.current.take().ok_or(Error::NoCurrentSegment)?;
        if let Some(err) = self.shared.fatal() {
            self.shared.recycle(segment);
            return Err(err.into());
        }

        if !segment.is_valid() {
            warn!(
                "Segment(size:{}, start_ts:{:.3}, duration:{:.3}) is invalid, discarded",
                segment.size(),
                segment.start_ts(),
                segment.duration()
            );
            self.discard(segment);
            return Ok(());
        }

        let size = segment.size() as u64;
        let info = self.shared.push_ready(
            segment,
            self.next_sequence,
            self.byte_offset,
            self.config.backpressure(),
            self.config.max_queued(),
            &self.cancel,
        )?;
        debug!(
            "Segment {} enqueued ({} bytes at {}, {:.3}s)",
            info.sequence, info.size, info.byte_offset, info.duration
        );
        self.next_sequence += 1;
        self.byte_offset += size;
        Ok(())
    }

    /// Switch persistence on or off while recording. Enabling it writes the
    /// retained pre-roll segments first, oldest first.
    pub fn set_persistence_enabled(&self, enabled: bool) {
        info!(
            "Segment persistence {} for {}",
            if enabled { "enabled" } else { "disabled" },
            self.url
        );
        self.shared.set_persistence(enabled);
    }

    /// Enqueue the trailing segment, drain and join the worker, then
    /// uninitialise the writer.
    ///
    /// Returns the writer's fatal error if persistence failed at any point.
    pub fn stop(mut self) -> Result<StatsSnapshot> {
        self.teardown()?;
        Ok(self.stats())
    }

    fn discard(&self, segment: Segment) {
        self.shared.stats.inc_discarded();
        self.shared
            .events
            .emit(SegmentEvent::Discarded(SegmentInfo::from(&segment)));
        self.shared.recycle(segment);
    }

    fn segment_time_us(&self) -> i64 {
        (self.config.segment_time() * MICROS_PER_SEC as f64).round() as i64
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let mut result = if self.current.is_some() {
            self.close_segment_and_enqueue()
        } else {
            Ok(())
        };

        self.shared.request_stop();
        if worker.join().is_err() {
            error!("Segment worker panicked");
            result = result.and(Err(Error::WorkerPanicked));
        }
        self.shared.uninit_writer();

        if let Some(err) = self.shared.fatal() {
            result = result.and(Err(err.into()));
        }
        info!("Cached segment recording to {} stopped", self.url);
        result
    }
}

impl Drop for CachedSegmentContext {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Cached segment recording to {} ended with error: {e}", self.url);
        }
    }
}
