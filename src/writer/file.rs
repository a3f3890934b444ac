use crate::core::segment::Segment;
use crate::error::WriterError;
use crate::writer::{write_failure, SegmentWriter, WriteOutcome, WriterContext, WriterEntry};
use log::{debug, info};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const NAME: &str = "file_writer";

/// Writes every segment to its own local file.
///
/// For a destination `/data/cam1.ts` the segment with start_ts 1700000000.0,
/// duration 10.0 and sequence 3 lands in `/data/cam1_1700000000.000_10.000_3.ts`.
#[derive(Debug, Default)]
pub struct FileWriter;

impl FileWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn entry() -> WriterEntry {
        WriterEntry::new(NAME, "Local file segment writer", &["file"], FileWriter::new)
    }
}

/// Local path of a `file:` destination.
fn destination_path(url: &str) -> &str {
    match url.split_once(':') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
            rest.strip_prefix("//").unwrap_or(rest)
        }
        _ => url,
    }
}

/// File name for one segment, derived from the destination path.
pub fn segment_path(url: &str, segment: &Segment) -> PathBuf {
    let path = destination_path(url);
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let (base, ext) = match path[file_start..].rfind('.') {
        Some(dot) => path.split_at(file_start + dot),
        None => (path, ""),
    };
    PathBuf::from(format!(
        "{}_{:.3}_{:.3}_{}{}",
        base,
        segment.start_ts(),
        segment.duration(),
        segment.sequence(),
        ext
    ))
}

impl SegmentWriter for FileWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<(), WriterError> {
        let path = Path::new(destination_path(ctx.url()));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(WriterError::Init {
                    writer: NAME.to_string(),
                    url: ctx.url().to_string(),
                    reason: format!("directory {} does not exist", parent.display()),
                });
            }
        }
        info!("File writer ready for {}", path.display());
        Ok(())
    }

    fn write_segment(
        &mut self,
        ctx: &WriterContext,
        segment: &Segment,
    ) -> Result<WriteOutcome, WriterError> {
        let path = segment_path(ctx.url(), segment);
        let mut file = File::create(&path)
            .map_err(|e| write_failure(NAME, segment, format!("{}: {}", path.display(), e)))?;
        file.write_all(segment.data())
            .map_err(|e| write_failure(NAME, segment, format!("{}: {}", path.display(), e)))?;
        debug!("Segment {} written to {}", segment.sequence(), path.display());
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(payload: &[u8]) -> Segment {
        let mut segment = Segment::with_capacity(64);
        segment.append(payload).unwrap();
        segment.set_start(0, 1_700_000_000.25);
        segment.set_duration(10.0);
        segment.stamp(3, 0);
        segment
    }

    #[test]
    fn segment_naming() {
        let segment = make_segment(b"x");
        assert_eq!(
            segment_path("file:///data/cam1.ts", &segment),
            PathBuf::from("/data/cam1_1700000000.250_10.000_3.ts")
        );
        assert_eq!(
            segment_path("/data/cam1", &segment),
            PathBuf::from("/data/cam1_1700000000.250_10.000_3")
        );
        assert_eq!(
            segment_path("/data.dir/cam1", &segment),
            PathBuf::from("/data.dir/cam1_1700000000.250_10.000_3")
        );
        assert_eq!(
            segment_path("cam1.ts", &segment),
            PathBuf::from("cam1_1700000000.250_10.000_3.ts")
        );
    }

    #[test]
    fn writes_segment_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}/rec.ts", dir.path().display());
        let ctx = WriterContext::new(url.clone(), None, 10.0);
        let segment = make_segment(b"segment-bytes");

        let mut writer = FileWriter::new();
        writer.init(&ctx).unwrap();
        assert_eq!(
            writer.write_segment(&ctx, &segment).unwrap(),
            WriteOutcome::Written
        );
        writer.uninit(&ctx);

        let written = std::fs::read(segment_path(&url, &segment)).unwrap();
        assert_eq!(written, b"segment-bytes");
    }

    #[test]
    fn init_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/missing/rec.ts", dir.path().display());
        let ctx = WriterContext::new(url, None, 10.0);
        assert!(matches!(
            FileWriter::new().init(&ctx),
            Err(WriterError::Init { .. })
        ));
    }

    #[test]
    fn write_failure_is_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/rec.ts", dir.path().display());
        let ctx = WriterContext::new(url, None, 10.0);
        dir.close().unwrap();

        let err = FileWriter::new()
            .write_segment(&ctx, &make_segment(b"x"))
            .unwrap_err();
        assert!(matches!(err, WriterError::Write { sequence: 3, .. }));
    }
}
