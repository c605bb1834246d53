//! Byte-range handling for video delivery.
//!
//! Only single `bytes=` ranges are honoured. Anything else is ignored and the
//! whole body is served, which clients handle as a plain 200 response.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHUNK_SIZE: u64 = 64 * 1024;

/// Inclusive byte range within a resource of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

pub fn unsatisfied_content_range(total: u64) -> String {
    format!("bytes */{}", total)
}

pub fn parse_range(header: Option<&str>, total: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = strip_bytes_unit(header.trim()) else {
        return RangeOutcome::Full;
    };
    if spec.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if suffix == 0 || total == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        return RangeOutcome::Partial(ByteRange {
            start: total.saturating_sub(suffix),
            end: total - 1,
        });
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeOutcome::Full,
        }
    };

    if start >= total {
        return RangeOutcome::Unsatisfiable;
    }

    let last = total - 1;
    RangeOutcome::Partial(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    })
}

fn strip_bytes_unit(header: &str) -> Option<&str> {
    let (unit, spec) = header.split_once('=')?;
    unit.trim().eq_ignore_ascii_case("bytes").then_some(spec)
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("ogg") | Some("ogv") => "video/ogg",
        _ => "video/mp4",
    }
}

/// Joins `name` onto `dir`, refusing anything that could escape the directory.
pub fn resolve_upload_path(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name == "."
        || name.contains("..")
    {
        return None;
    }
    Some(dir.join(name))
}

/// Opens `path` positioned at the start of `range` (or the beginning for `None`).
pub async fn open_at(path: &Path, range: Option<ByteRange>) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    if let Some(range) = range {
        file.seek(SeekFrom::Start(range.start)).await?;
    }
    Ok(file)
}

/// Streams at most `len` bytes from the current position of `file`.
pub fn file_chunks(
    file: File,
    len: u64,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    futures::stream::try_unfold((file, len), |(mut file, remaining)| async move {
        if remaining == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; remaining.min(CHUNK_SIZE) as usize];
        let read = file.read(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some((Bytes::from(buf), (file, remaining - read as u64))))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::TryStreamExt;
    use test_case::test_case;

    use super::*;

    #[test_case("bytes=0-499", 1000, 0, 499; "explicit range")]
    #[test_case("bytes=500-", 1000, 500, 999; "open ended")]
    #[test_case("bytes=-200", 1000, 800, 999; "suffix")]
    #[test_case("bytes=-5000", 1000, 0, 999; "suffix longer than file")]
    #[test_case("bytes=900-5000", 1000, 900, 999; "end clamped")]
    #[test_case("bytes=999-999", 1000, 999, 999; "last byte")]
    #[test_case("Bytes = 10-19", 1000, 10, 19; "unit is case insensitive")]
    fn satisfiable_ranges(header: &str, total: u64, start: u64, end: u64) {
        assert_eq!(
            parse_range(Some(header), total),
            RangeOutcome::Partial(ByteRange { start, end })
        );
    }

    #[test_case("bytes=1000-", 1000; "start at size")]
    #[test_case("bytes=2000-3000", 1000; "start past end")]
    #[test_case("bytes=-0", 1000; "empty suffix")]
    #[test_case("bytes=-10", 0; "empty file")]
    fn unsatisfiable_ranges(header: &str, total: u64) {
        assert_eq!(parse_range(Some(header), total), RangeOutcome::Unsatisfiable);
    }

    #[test_case("items=0-10"; "other unit")]
    #[test_case("bytes=0-10,20-30"; "multiple ranges")]
    #[test_case("bytes=abc-"; "garbage start")]
    #[test_case("bytes=10-5"; "reversed")]
    #[test_case("bytes=5"; "missing dash")]
    #[test_case("0-10"; "missing unit")]
    fn ignored_ranges(header: &str) {
        assert_eq!(parse_range(Some(header), 1000), RangeOutcome::Full);
    }

    #[test]
    fn missing_header_serves_full_body() {
        assert_eq!(parse_range(None, 1000), RangeOutcome::Full);
    }

    #[test]
    fn content_range_formats() {
        let range = ByteRange { start: 0, end: 499 };
        assert_eq!(range.len(), 500);
        assert_eq!(range.content_range(1000), "bytes 0-499/1000");
        assert_eq!(unsatisfied_content_range(1000), "bytes */1000");
    }

    #[test_case("movie.mp4", "video/mp4")]
    #[test_case("movie.WEBM", "video/webm")]
    #[test_case("movie.mkv", "video/x-matroska")]
    #[test_case("movie.mov", "video/quicktime")]
    #[test_case("movie", "video/mp4")]
    fn content_types(name: &str, expected: &str) {
        assert_eq!(content_type_for(Path::new(name)), expected);
    }

    #[test_case("../secret"; "parent traversal")]
    #[test_case("a/b.mp4"; "nested path")]
    #[test_case("a\\b.mp4"; "windows separator")]
    #[test_case(""; "empty")]
    #[test_case("."; "current dir")]
    fn traversal_names_are_rejected(name: &str) {
        assert!(resolve_upload_path(Path::new("uploads"), name).is_none());
    }

    #[test]
    fn plain_names_resolve_inside_dir() {
        let path = resolve_upload_path(Path::new("uploads"), "video-1700000000000.mp4");
        assert_eq!(path, Some(PathBuf::from("uploads/video-1700000000000.mp4")));
    }

    #[tokio::test]
    async fn file_chunks_reads_only_requested_range() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let data: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
        file.write_all(&data).expect("write temp file");

        let range = ByteRange {
            start: 70_000,
            end: 150_000,
        };
        let opened = open_at(file.path(), Some(range)).await.expect("open");
        let chunks: Vec<Bytes> = file_chunks(opened, range.len())
            .try_collect()
            .await
            .expect("stream");

        assert!(chunks.len() > 1);
        let body: Vec<u8> = chunks.concat();
        assert_eq!(body.len() as u64, range.len());
        assert_eq!(body.as_slice(), &data[70_000..=150_000]);
    }

    #[tokio::test]
    async fn file_chunks_stops_at_end_of_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"short").expect("write temp file");

        let opened = open_at(file.path(), None).await.expect("open");
        let chunks: Vec<Bytes> = file_chunks(opened, 1024).try_collect().await.expect("stream");
        assert_eq!(chunks.concat(), b"short".to_vec());
    }
}
