//! In-memory writer and helpers shared by the unit tests.

use crate::core::segment::Segment;
use crate::error::WriterError;
use crate::writer::{write_failure, SegmentWriter, WriteOutcome, WriterContext, WriterEntry};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WrittenSegment {
    pub sequence: u64,
    pub data: Vec<u8>,
    pub start_ts: f64,
    pub duration: f64,
    pub byte_offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Init,
    Write(WrittenSegment),
    Skipped(u64),
    Failed(u64),
    Uninit,
}

/// Records every call. Clones share the same log, so the test keeps one
/// handle while the registry hands another to the worker.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryWriter {
    pub log: Arc<Mutex<Vec<Call>>>,
    /// Sleep before every write.
    pub delay: Option<Duration>,
    /// Every write waits for a token; dropping the sender opens the gate for good.
    pub gate: Option<Receiver<()>>,
    pub fail_at: Option<u64>,
    pub panic_at: Option<u64>,
    pub fail_init: bool,
    pub skip_all: bool,
}

impl MemoryWriter {
    pub fn entry(&self) -> WriterEntry {
        let writer = self.clone();
        WriterEntry::new("memory_writer", "In-memory test writer", &["mem"], move || {
            writer.clone()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<WrittenSegment> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(segment) => Some(segment),
                _ => None,
            })
            .collect()
    }

    pub fn written_sequences(&self) -> Vec<u64> {
        self.written().iter().map(|s| s.sequence).collect()
    }

    pub fn attempted_sequences(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(segment) => Some(segment.sequence),
                Call::Skipped(seq) | Call::Failed(seq) => Some(seq),
                _ => None,
            })
            .collect()
    }
}

impl SegmentWriter for MemoryWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<(), WriterError> {
        if self.fail_init {
            return Err(WriterError::Init {
                writer: "memory_writer".to_string(),
                url: ctx.url().to_string(),
                reason: "refused".to_string(),
            });
        }
        self.log.lock().unwrap().push(Call::Init);
        Ok(())
    }

    fn write_segment(
        &mut self,
        _ctx: &WriterContext,
        segment: &Segment,
    ) -> Result<WriteOutcome, WriterError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.panic_at == Some(segment.sequence()) {
            panic!("memory writer crashed on segment {}", segment.sequence());
        }
        let mut log = self.log.lock().unwrap();
        if self.fail_at == Some(segment.sequence()) {
            log.push(Call::Failed(segment.sequence()));
            return Err(write_failure("memory_writer", segment, "disk full"));
        }
        if self.skip_all {
            log.push(Call::Skipped(segment.sequence()));
            return Ok(WriteOutcome::Skipped);
        }
        log.push(Call::Write(WrittenSegment {
            sequence: segment.sequence(),
            data: segment.data().to_vec(),
            start_ts: segment.start_ts(),
            duration: segment.duration(),
            byte_offset: segment.byte_offset(),
        }));
        Ok(WriteOutcome::Written)
    }

    fn uninit(&mut self, _ctx: &WriterContext) {
        self.log.lock().unwrap().push(Call::Uninit);
    }
}
