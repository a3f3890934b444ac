use crate::core::segment::Segment;
use crate::error::WriterError;
use crate::writer::{SegmentWriter, WriteOutcome, WriterContext, WriterEntry};
use log::info;

/// Logs every segment and persists nothing.
#[derive(Debug, Default)]
pub struct DummyWriter;

impl DummyWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn entry() -> WriterEntry {
        WriterEntry::new("dummy_writer", "Dummy segment writer", &["dummy"], DummyWriter::new)
    }
}

impl SegmentWriter for DummyWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<(), WriterError> {
        info!("Dummy writer: url {} is initialized", ctx.url());
        Ok(())
    }

    fn write_segment(
        &mut self,
        _ctx: &WriterContext,
        segment: &Segment,
    ) -> Result<WriteOutcome, WriterError> {
        info!(
            "Segment(size:{}, start_ts:{:.3}, duration:{:.3}, pos:{}, sequence:{}) is written",
            segment.size(),
            segment.start_ts(),
            segment.duration(),
            segment.byte_offset(),
            segment.sequence()
        );
        Ok(WriteOutcome::Written)
    }

    fn uninit(&mut self, ctx: &WriterContext) {
        info!("Dummy writer: url {} is un-initialized", ctx.url());
    }
}
