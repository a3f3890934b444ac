// src/core/worker.rs - Shared segment state and the background writer thread
//
// Core features:
// - One mutex guards list membership (ready queue, free pool), the stop flag,
//   the persistence flag and the sticky fatal error
// - `not_empty` wakes the worker, `not_full` wakes a producer blocked on a
//   full ready queue
// - Block mode waits with a short timeout so cancellation and fatal errors
//   are noticed without a dedicated wake-up
// - Drop-oldest mode evicts from the head of the ready queue and never waits
// - The segment in the writer's hands still counts toward `max_queued`
//   until it is recycled; drop-oldest never evicts it
// - The writer is called with the lock released; segments are always
//   recycled afterwards, whatever the outcome, and a panicking writer is
//   turned into a sticky write error

use crate::core::cancel::CancellationToken;
use crate::core::config::BackpressureMode;
use crate::core::segment::Segment;
use crate::core::segment_list::SegmentList;
use crate::core::stats::{EventSink, SegmentEvent, SegmentInfo, SegmentStats};
use crate::error::{Error, Result, WriterError};
use crate::writer::{write_failure, SegmentWriter, WriteOutcome, WriterContext};
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Re-check interval of a producer blocked on a full ready queue.
const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub(crate) struct State {
    ready: SegmentList,
    free: SegmentList,
    stop: bool,
    persistence: bool,
    /// The worker holds a popped segment that is not recycled yet.
    in_flight: bool,
    fatal: Option<WriterError>,
}

impl State {
    /// Segments occupying the queue, including the one being written.
    fn occupied(&self) -> usize {
        self.ready.len() + usize::from(self.in_flight)
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    retention_keep: usize,
    writer_name: String,
    writer: Mutex<Option<Box<dyn SegmentWriter>>>,
    writer_ctx: WriterContext,
    pub(crate) stats: SegmentStats,
    pub(crate) events: EventSink,
}

impl Shared {
    pub(crate) fn new(
        writer_name: impl Into<String>,
        writer: Box<dyn SegmentWriter>,
        writer_ctx: WriterContext,
        persistence: bool,
        retention_keep: usize,
        max_queued: usize,
        events: EventSink,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                ready: SegmentList::with_capacity(max_queued),
                free: SegmentList::new(),
                stop: false,
                persistence,
                in_flight: false,
                fatal: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            retention_keep,
            writer_name: writer_name.into(),
            writer: Mutex::new(Some(writer)),
            writer_ctx,
            stats: SegmentStats::default(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ready segments the worker leaves in place.
    fn keep(&self, state: &State) -> usize {
        if state.persistence {
            0
        } else {
            self.retention_keep
        }
    }

    pub(crate) fn fatal(&self) -> Option<WriterError> {
        self.lock().fatal.clone()
    }

    pub(crate) fn take_free(&self) -> Option<Segment> {
        self.lock().free.pop_front()
    }

    pub(crate) fn recycle(&self, mut segment: Segment) {
        segment.reset();
        self.lock().free.push_back(segment);
    }

    /// Recycle the segment the worker popped and wake a blocked producer.
    fn release(&self, mut segment: Segment) {
        segment.reset();
        let mut state = self.lock();
        state.free.push_back(segment);
        state.in_flight = false;
        drop(state);
        self.not_full.notify_all();
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    pub(crate) fn set_persistence(&self, enabled: bool) {
        let mut state = self.lock();
        state.persistence = enabled;
        drop(state);
        self.not_empty.notify_all();
    }

    pub(crate) fn request_stop(&self) {
        let mut state = self.lock();
        state.stop = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Push a closed segment to the ready queue, applying backpressure first.
    ///
    /// `sequence` and `byte_offset` are stamped only once room is available;
    /// on error the segment is recycled and nothing is stamped.
    pub(crate) fn push_ready(
        &self,
        mut segment: Segment,
        sequence: u64,
        byte_offset: u64,
        mode: BackpressureMode,
        max_queued: usize,
        cancel: &CancellationToken,
    ) -> Result<SegmentInfo> {
        let mut state = self.lock();
        match mode {
            BackpressureMode::Block => {
                while state.occupied() >= max_queued {
                    let abort = if cancel.is_cancelled() {
                        Some(Error::Cancelled)
                    } else {
                        state.fatal.clone().map(Error::from)
                    };
                    if let Some(err) = abort {
                        segment.reset();
                        state.free.push_back(segment);
                        return Err(err);
                    }
                    let (guard, _) = self
                        .not_full
                        .wait_timeout(state, BLOCK_POLL_INTERVAL)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
            BackpressureMode::DropOldest => {
                while state.occupied() >= max_queued {
                    let Some(mut oldest) = state.ready.pop_front() else {
                        break;
                    };
                    warn!(
                        "Segment(size:{}, start_ts:{:.3}, duration:{:.3}, pos:{}, sequence:{}) is dropped because of slow writer",
                        oldest.size(),
                        oldest.start_ts(),
                        oldest.duration(),
                        oldest.byte_offset(),
                        oldest.sequence()
                    );
                    self.stats.inc_evicted();
                    self.events.emit(SegmentEvent::Evicted(SegmentInfo::from(&oldest)));
                    oldest.reset();
                    state.free.push_back(oldest);
                }
            }
        }

        segment.stamp(sequence, byte_offset);
        let info = SegmentInfo::from(&segment);
        state.ready.push_back(segment);
        let wake = state.ready.len() > self.keep(&state);
        drop(state);

        self.stats.inc_enqueued();
        self.events.emit(SegmentEvent::Enqueued(info));
        if wake {
            self.not_empty.notify_one();
        }
        Ok(info)
    }

    /// Call `uninit` once; later calls do nothing.
    pub(crate) fn uninit_writer(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = writer {
            writer.uninit(&self.writer_ctx);
        }
    }

    fn set_fatal(&self, err: WriterError) {
        let mut state = self.lock();
        state.fatal.get_or_insert(err);
        drop(state);
        self.not_full.notify_all();
    }
}

pub(crate) fn spawn_worker(shared: Arc<Shared>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("cseg-writer:{}", shared.writer_name))
        .spawn(move || {
            info!("Segment worker started for {}", shared.writer_ctx.url());
            let mut writer = shared.writer.lock().unwrap_or_else(PoisonError::into_inner);
            match writer.as_mut() {
                Some(writer) => run(&shared, &mut **writer),
                None => error!("Segment worker started without a writer"),
            }
            debug!("Segment worker finished.");
        })
        .map_err(Error::WorkerSpawn)
}

fn run(shared: &Shared, writer: &mut dyn SegmentWriter) {
    loop {
        let (segment, persist) = {
            let mut state = shared.lock();
            while !state.stop && state.ready.len() <= shared.keep(&state) {
                state = shared
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.stop {
                break;
            }
            let Some(segment) = state.ready.pop_front() else {
                continue;
            };
            state.in_flight = true;
            (segment, state.persistence)
        };

        if !handle_segment(shared, writer, segment, persist) {
            return;
        }
    }

    drain(shared, writer);
}

/// Remaining ready segments are handled in order on stop. Returns early on
/// the first fatal error, recycling whatever is left.
fn drain(shared: &Shared, writer: &mut dyn SegmentWriter) {
    let (mut pending, persist) = {
        let mut state = shared.lock();
        (std::mem::take(&mut state.ready), state.persistence)
    };
    if !pending.is_empty() {
        debug!("Draining {} ready segment(s)", pending.len());
    }

    while let Some(segment) = pending.pop_front() {
        if !handle_segment(shared, writer, segment, persist) {
            for segment in pending.drain_all() {
                shared.recycle(segment);
            }
            return;
        }
    }
}

/// Persist or retire one segment. Returns `false` once the writer has
/// failed fatally.
fn handle_segment(
    shared: &Shared,
    writer: &mut dyn SegmentWriter,
    segment: Segment,
    persist: bool,
) -> bool {
    let info = SegmentInfo::from(&segment);
    let keep_going = if !persist {
        debug!("Segment {} released from pre-roll window", info.sequence);
        shared.stats.inc_retired();
        shared.events.emit(SegmentEvent::Retired(info));
        true
    } else {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            writer.write_segment(&shared.writer_ctx, &segment)
        }))
        .unwrap_or_else(|payload| {
            Err(write_failure(
                &shared.writer_name,
                &segment,
                format!("writer panicked: {}", panic_message(payload.as_ref())),
            ))
        });
        match outcome {
            Ok(WriteOutcome::Written) => {
                debug!(
                    "Segment {} written ({} bytes, {:.3}s)",
                    info.sequence, info.size, info.duration
                );
                shared.stats.inc_written();
                shared.events.emit(SegmentEvent::Written(info));
                true
            }
            Ok(WriteOutcome::Skipped) => {
                warn!("Segment {} skipped by writer", info.sequence);
                shared.stats.inc_skipped();
                shared.events.emit(SegmentEvent::Skipped(info));
                true
            }
            Err(e) => {
                error!("Segment writer failed, persistence stopped: {e}");
                shared.stats.inc_failed();
                shared.events.emit(SegmentEvent::Failed {
                    segment: info,
                    reason: e.to_string(),
                });
                shared.set_fatal(e);
                false
            }
        }
    };
    shared.release(segment);
    keep_going
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Box<Any>"
    }
}
