// src/core/segment.rs - Fixed-capacity segment buffer
//
// A segment is allocated once with its full capacity and recycled through the
// free pool afterwards; `reset` keeps the allocation and wipes the metadata.

use crate::error::SegmentError;
use std::io;

/// Byte sink handed to the container muxer.
///
/// The muxer only ever sees this trait; on a cut the context swaps the
/// segment behind it.
pub trait Sink {
    fn write(&mut self, buf: &[u8]) -> Result<(), SegmentError>;
}

/// One bounded chunk of the recorded byte stream plus its timing metadata.
#[derive(Debug)]
pub struct Segment {
    buffer: Vec<u8>,
    capacity: usize,
    start_ts: f64,
    duration: f64,
    byte_offset: u64,
    sequence: u64,
    start_pts: Option<i64>,
}

impl Segment {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            start_ts: 0.0,
            duration: 0.0,
            byte_offset: 0,
            sequence: 0,
            start_pts: None,
        }
    }

    /// Zero all metadata, keep the buffer allocation.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.start_ts = 0.0;
        self.duration = 0.0;
        self.byte_offset = 0;
        self.sequence = 0;
        self.start_pts = None;
    }

    /// Append muxer output. Exceeding the capacity is a configuration error:
    /// the buffer must be sized for the largest burst the muxer can emit.
    pub fn append(&mut self, buf: &[u8]) -> Result<(), SegmentError> {
        if self.buffer.len() + buf.len() > self.capacity {
            return Err(SegmentError::Overflow {
                capacity: self.capacity,
                size: self.buffer.len(),
                len: buf.len(),
            });
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start timestamp in seconds (wall/stream-clock hybrid).
    pub fn start_ts(&self) -> f64 {
        self.start_ts
    }

    /// Duration in seconds, final once the segment has been closed.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Position of the first byte within the whole recording.
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// A closed segment is worth persisting only with a real start and at
    /// least one second of media.
    pub fn is_valid(&self) -> bool {
        self.start_ts > 0.0 && self.duration >= 1.0
    }

    pub(crate) fn start_pts(&self) -> Option<i64> {
        self.start_pts
    }

    pub(crate) fn set_start(&mut self, start_pts: i64, start_ts: f64) {
        self.start_pts = Some(start_pts);
        self.start_ts = start_ts;
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    pub(crate) fn stamp(&mut self, sequence: u64, byte_offset: u64) {
        self.sequence = sequence;
        self.byte_offset = byte_offset;
    }
}

impl Sink for Segment {
    fn write(&mut self, buf: &[u8]) -> Result<(), SegmentError> {
        self.append(buf)
    }
}

impl io::Write for Segment {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn append_within_capacity() {
        let mut segment = Segment::with_capacity(8);
        segment.append(b"abc").unwrap();
        segment.append(b"defgh").unwrap();
        assert_eq!(segment.data(), b"abcdefgh");
        assert_eq!(segment.size(), 8);
    }

    #[test]
    fn append_past_capacity_fails_without_partial_write() {
        let mut segment = Segment::with_capacity(4);
        segment.append(b"abc").unwrap();
        let err = segment.append(b"de").unwrap_err();
        assert_eq!(
            err,
            SegmentError::Overflow {
                capacity: 4,
                size: 3,
                len: 2
            }
        );
        assert_eq!(segment.data(), b"abc");
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut segment = Segment::with_capacity(16);
        segment.append(b"payload").unwrap();
        segment.set_start(90_000, 1_700_000_000.0);
        segment.set_duration(4.0);
        segment.stamp(7, 1024);

        segment.reset();

        assert_eq!(segment.size(), 0);
        assert_eq!(segment.capacity(), 16);
        assert_eq!(segment.start_ts(), 0.0);
        assert_eq!(segment.duration(), 0.0);
        assert_eq!(segment.sequence(), 0);
        assert_eq!(segment.byte_offset(), 0);
        assert_eq!(segment.start_pts(), None);
        segment.append(&[0u8; 16]).unwrap();
    }

    #[test]
    fn validity_rule() {
        let mut segment = Segment::with_capacity(1);
        assert!(!segment.is_valid());

        segment.set_start(0, 1_700_000_000.0);
        segment.set_duration(0.4);
        assert!(!segment.is_valid());

        segment.set_duration(1.0);
        assert!(segment.is_valid());

        segment.set_start(0, 0.0);
        assert!(!segment.is_valid());
    }

    #[test]
    fn io_write_reports_overflow() {
        let mut segment = Segment::with_capacity(2);
        assert!(segment.write_all(b"ab").is_ok());
        assert!(segment.write_all(b"c").is_err());
    }
}
