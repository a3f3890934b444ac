// src/core/stats.rs - Segment counters and lifecycle events
//
// Counters are plain atomics updated from both the producer and the worker.
// Events go through an optional bounded channel with try_send; a slow or
// absent observer never stalls recording.

use crossbeam_channel::{Sender, TrySendError};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SegmentStats {
    opened: AtomicU64,
    allocated: AtomicU64,
    enqueued: AtomicU64,
    discarded: AtomicU64,
    evicted: AtomicU64,
    retired: AtomicU64,
    written: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`SegmentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Segments opened by the producer.
    pub opened: u64,
    /// Fresh buffers allocated because the free pool was empty.
    pub allocated: u64,
    /// Closed segments pushed to the ready queue.
    pub enqueued: u64,
    /// Closed segments recycled as invalid (no start or shorter than 1s).
    pub discarded: u64,
    /// Ready segments dropped by drop-oldest backpressure.
    pub evicted: u64,
    /// Ready segments released from the pre-roll window unwritten.
    pub retired: u64,
    /// Segments the writer persisted.
    pub written: u64,
    /// Segments the writer declined to persist.
    pub skipped: u64,
    /// Fatal write failures.
    pub failed: u64,
}

impl SegmentStats {
    pub(crate) fn inc_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_allocated(&self) {
        self.allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_retired(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opened: self.opened.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Metadata of a segment at the moment an event was raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    pub sequence: u64,
    pub size: usize,
    pub start_ts: f64,
    pub duration: f64,
    pub byte_offset: u64,
}

impl From<&crate::core::segment::Segment> for SegmentInfo {
    fn from(segment: &crate::core::segment::Segment) -> Self {
        Self {
            sequence: segment.sequence(),
            size: segment.size(),
            start_ts: segment.start_ts(),
            duration: segment.duration(),
            byte_offset: segment.byte_offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    Enqueued(SegmentInfo),
    Discarded(SegmentInfo),
    Evicted(SegmentInfo),
    Retired(SegmentInfo),
    Written(SegmentInfo),
    Skipped(SegmentInfo),
    Failed { segment: SegmentInfo, reason: String },
}

/// Optional, never-blocking event publisher.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<Sender<SegmentEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: Option<Sender<SegmentEvent>>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: SegmentEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Segment event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
