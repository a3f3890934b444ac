// src/core/recorder.rs - Drives a container muxer through the split-hook protocol
//
// Per access unit:
//   on_access_unit -> (on cut) flush old sink, close + enqueue, open,
//   write header into the new sink -> write_packet

use crate::core::config::FormatOptions;
use crate::core::context::{CachedSegmentContext, CachedSegmentContextBuilder, SplitDecision};
use crate::core::segment::Sink;
use crate::core::stats::StatsSnapshot;
use crate::core::timestamp::{AccessUnit, MediaKind};
use crate::error::{ConfigError, Result};
use crate::writer::WriterRegistry;
use log::{debug, warn};

/// Container framing on top of the segment byte sink.
///
/// Every method writes into whichever sink it is handed; the recorder
/// swaps sinks on a cut and calls `write_header` again so that each
/// segment can be decoded on its own.
pub trait ContainerMuxer {
    /// Apply per-segment format options. Unknown keys must be rejected.
    fn configure(&mut self, options: &FormatOptions) -> Result<()>;

    fn write_header(&mut self, sink: &mut dyn Sink) -> Result<()>;

    fn write_packet(&mut self, sink: &mut dyn Sink, unit: &AccessUnit, data: &[u8]) -> Result<()>;

    /// Emit anything still buffered before the sink is closed.
    fn flush(&mut self, _sink: &mut dyn Sink) -> Result<()> {
        Ok(())
    }

    fn write_trailer(&mut self, _sink: &mut dyn Sink) -> Result<()> {
        Ok(())
    }
}

/// Writes packet payloads verbatim, for input that is already framed
/// (for example MPEG-TS packets).
#[derive(Debug, Default)]
pub struct RawMuxer;

impl ContainerMuxer for RawMuxer {
    fn configure(&mut self, options: &FormatOptions) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }
        let keys = options.keys().collect::<Vec<_>>().join(", ");
        Err(ConfigError::UnrecognizedFormatOptions(keys).into())
    }

    fn write_header(&mut self, _sink: &mut dyn Sink) -> Result<()> {
        Ok(())
    }

    fn write_packet(&mut self, sink: &mut dyn Sink, _unit: &AccessUnit, data: &[u8]) -> Result<()> {
        sink.write(data)?;
        Ok(())
    }
}

pub struct Recorder<M> {
    context: CachedSegmentContext,
    muxer: M,
    has_video: bool,
}

impl<M: ContainerMuxer> Recorder<M> {
    /// Check the stream layout, configure the muxer, start the context and
    /// write the first header.
    pub fn start(
        builder: CachedSegmentContextBuilder,
        registry: &WriterRegistry,
        mut muxer: M,
        streams: &[MediaKind],
    ) -> Result<Self> {
        if streams.contains(&MediaKind::Subtitle) {
            return Err(ConfigError::SubtitleStream.into());
        }
        let video_streams = streams.iter().filter(|kind| **kind == MediaKind::Video).count();
        if video_streams > 1 {
            warn!("More than a single video stream present, expect issues decoding it.");
        }

        let options = builder.get_config().format_options()?;
        muxer.configure(&options)?;

        let mut context = builder.start(registry)?;
        muxer.write_header(context.sink()?)?;
        debug!("Recorder started with {} stream(s)", streams.len());

        Ok(Self {
            context,
            muxer,
            has_video: video_streams > 0,
        })
    }

    /// Feed one encoded access unit.
    pub fn write(&mut self, unit: &AccessUnit, data: &[u8]) -> Result<SplitDecision> {
        let decision = self.context.on_access_unit(unit, self.has_video)?;
        if decision == SplitDecision::Cut {
            self.muxer.flush(self.context.sink()?)?;
            self.context.close_segment_and_enqueue()?;
            self.context.open_segment();
            self.muxer.write_header(self.context.sink()?)?;
        }
        self.muxer.write_packet(self.context.sink()?, unit, data)?;
        Ok(decision)
    }

    pub fn context(&self) -> &CachedSegmentContext {
        &self.context
    }

    pub fn set_persistence_enabled(&self, enabled: bool) {
        self.context.set_persistence_enabled(enabled);
    }

    /// Write the trailer into the last segment and stop the context.
    pub fn finish(mut self) -> Result<StatsSnapshot> {
        let trailer = match self.context.sink() {
            Ok(sink) => self.muxer.write_trailer(sink),
            Err(e) => Err(e),
        };
        let stats = self.context.stop()?;
        trailer.map(|_| stats)
    }
}
