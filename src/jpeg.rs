/**
 * In-process JPEG capture-time rewrite
 *
 * Strategy:
 * 1. Parse the JPEG segments with img-parts (every other segment is kept as-is)
 * 2. Existing EXIF: patch the three date fields in place
 * 3. Fields absent from the existing EXIF: merge them in with little_exif
 * 4. No EXIF at all: build a fresh block with `ExifWriter`
 * 5. Write to a temp file beside the original and rename over it
 */

use chrono::NaiveDateTime;
use img_parts::jpeg::{markers, Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use log::debug;
use std::fs;
use std::io::Write;
use std::panic::{self, UnwindSafe};
use std::path::Path;
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::error::{RedateError, Result};
use crate::exif_writer::{format_exif_datetime, patch_capture_times, ExifWriter};

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts exif() hands out just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// How the EXIF block was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegRewrite {
    Patched,
    Merged,
    Created,
}

pub fn rewrite_capture_times(path: &Path, timestamp: NaiveDateTime) -> Result<JpegRewrite> {
    let file_bytes = fs::read(path).map_err(|e| RedateError::io(path, e))?;
    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| RedateError::corrupt(path, format!("failed to parse JPEG: {}", e)))?;

    let (tiff, how) = match jpeg.exif().filter(|exif| !exif.is_empty()) {
        None => {
            debug!("Creating new EXIF for {}", path.display());
            (ExifWriter::for_capture_time(timestamp).to_bytes(), JpegRewrite::Created)
        }
        Some(existing) => {
            let mut tiff = existing.to_vec();
            match patch_capture_times(&mut tiff, timestamp) {
                Ok(report) if report.is_complete() => (tiff, JpegRewrite::Patched),
                Ok(report) => {
                    debug!("{} lacks date tags {:04X?}, merging", path.display(), report.missing);
                    (merge_with_little_exif(path, timestamp)?, JpegRewrite::Merged)
                }
                Err(reason) => {
                    debug!("In-place patch failed for {}: {:#}", path.display(), reason);
                    (merge_with_little_exif(path, timestamp)?, JpegRewrite::Merged)
                }
            }
        }
    };

    install_exif(&mut jpeg, tiff);
    let output = jpeg.encoder().bytes();
    replace_atomically(path, &output)?;

    debug!("EXIF {:?} for {}", how, path.display());
    Ok(how)
}

/// Replace the EXIF APP1 segment in place, or insert one after any APP0.
fn install_exif(jpeg: &mut Jpeg, tiff: Vec<u8>) {
    let mut contents = Vec::with_capacity(EXIF_PREFIX.len() + tiff.len());
    contents.extend_from_slice(EXIF_PREFIX);
    contents.extend_from_slice(&tiff);
    let segment = JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents));

    let segments = jpeg.segments_mut();
    let existing = segments
        .iter()
        .position(|s| s.marker() == markers::APP1 && s.contents().starts_with(EXIF_PREFIX));
    match existing {
        Some(pos) => segments[pos] = segment,
        None => {
            let pos = segments.iter().take_while(|s| s.marker() == markers::APP0).count();
            segments.insert(pos, segment);
        }
    }
}

/// Re-serialize the whole EXIF block through little_exif with the date tags set.
fn merge_with_little_exif(path: &Path, timestamp: NaiveDateTime) -> Result<Vec<u8>> {
    let mut metadata = load_existing_metadata(path)
        .ok_or_else(|| RedateError::corrupt(path, "EXIF block could not be parsed or rebuilt"))?;

    let formatted = format_exif_datetime(timestamp);
    metadata.set_tag(ExifTag::ModifyDate(formatted.clone()));
    metadata.set_tag(ExifTag::DateTimeOriginal(formatted.clone()));
    metadata.set_tag(ExifTag::CreateDate(formatted));

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        return Err(RedateError::corrupt(path, "rebuilt EXIF block is empty"));
    }
    Ok(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())
}

/// Serializes panic-hook swaps across worker threads.
static PANIC_HOOK_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with the panic hook silenced, catching any panic.
fn catch_silently<T>(f: impl FnOnce() -> T + UnwindSafe) -> std::thread::Result<T> {
    let _guard = PANIC_HOOK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let prev_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let result = panic::catch_unwind(f);
    panic::set_hook(prev_hook);
    result
}

/// Returns None if little_exif can't parse (or panics on) the file.
fn load_existing_metadata(path: &Path) -> Option<Metadata> {
    let path_owned = path.to_path_buf();
    match catch_silently(move || Metadata::new_from_path(&path_owned)) {
        Ok(Ok(m)) if !m.data().is_empty() => Some(m),
        Ok(Ok(_)) => {
            debug!("little_exif loaded empty metadata");
            None
        }
        Ok(Err(e)) => {
            debug!("little_exif could not parse EXIF: {}", e);
            None
        }
        Err(_) => {
            debug!("little_exif panicked parsing EXIF");
            None
        }
    }
}

/// Fail the way `rewrite_capture_times` would if the file is not a parseable JPEG.
pub fn check_parseable(path: &Path) -> Result<()> {
    let file_bytes = fs::read(path).map_err(|e| RedateError::io(path, e))?;
    Jpeg::from_bytes(Bytes::from(file_bytes))
        .map(|_| ())
        .map_err(|e| RedateError::corrupt(path, format!("failed to parse JPEG: {}", e)))
}

/// Write `bytes` beside `path` and rename over it, keeping permissions.
pub fn replace_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let io_err = |e: std::io::Error| RedateError::io(path, e);

    let permissions = fs::metadata(path).map_err(io_err)?.permissions();
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    fs::set_permissions(tmp.path(), permissions).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bare_jpeg;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn date_time_original(path: &Path) -> String {
        let file = fs::File::open(path).unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut std::io::BufReader::new(file))
            .unwrap();
        exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
            .unwrap()
            .display_value()
            .to_string()
    }

    #[test]
    fn creates_exif_when_missing_then_patches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, bare_jpeg()).unwrap();

        assert_eq!(rewrite_capture_times(&path, ts(8, 0, 0)).unwrap(), JpegRewrite::Created);
        assert_eq!(date_time_original(&path), "2024-06-01 08:00:00");

        assert_eq!(rewrite_capture_times(&path, ts(8, 7, 30)).unwrap(), JpegRewrite::Patched);
        assert_eq!(date_time_original(&path), "2024-06-01 08:07:30");
    }

    #[test]
    fn non_jpeg_bytes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = rewrite_capture_times(&path, ts(0, 0, 0)).unwrap_err();
        assert!(matches!(
            err,
            RedateError::MetadataWrite { cause: crate::error::WriteCause::Corrupt(_), .. }
        ));
        assert_eq!(fs::read(&path).unwrap(), b"definitely not a jpeg");
    }

    #[test]
    fn concurrent_silenced_panics_restore_the_hook() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let seen = Arc::new(AtomicUsize::new(0));
        {
            let _guard = PANIC_HOOK_LOCK.lock().unwrap_or_else(|p| p.into_inner());
            let counter = Arc::clone(&seen);
            panic::set_hook(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let workers: Vec<_> = (0..16)
            .map(|i| {
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let caught = catch_silently(move || {
                            if i % 2 == 0 {
                                panic!("silenced");
                            }
                        });
                        assert_eq!(caught.is_err(), i % 2 == 0);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let _guard = PANIC_HOOK_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        let _ = panic::catch_unwind(|| panic!("visible"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let _ = panic::take_hook();
    }

    #[test]
    fn parse_check_matches_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jpg");
        fs::write(&good, bare_jpeg()).unwrap();
        assert!(check_parseable(&good).is_ok());
        assert_eq!(fs::read(&good).unwrap(), bare_jpeg());

        let bad = dir.path().join("bad.jpg");
        fs::write(&bad, b"garbage").unwrap();
        assert!(matches!(
            check_parseable(&bad),
            Err(RedateError::MetadataWrite { cause: crate::error::WriteCause::Corrupt(_), .. })
        ));
    }

    #[test]
    fn replace_keeps_only_new_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, b"old").unwrap();
        replace_atomically(&path, b"new contents").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new contents");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
