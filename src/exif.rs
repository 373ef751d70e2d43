/**
 * Original-timestamp source
 *
 * Lookup order (most to least specific):
 * 1. DateTimeOriginal (kamadak-exif)
 * 2. DateTime, the generic last-modified field (kamadak-exif)
 * 3. File modification time (last resort, logged as a warning)
 */

use anyhow::{anyhow, Context};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use exif::{In, Reader as ExifReader, Tag, Value};
use log::{debug, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{RedateError, Result};

/// Where an original timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampOrigin {
    DateTimeOriginal,
    DateTime,
    FileModified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalTimestamp {
    pub timestamp: NaiveDateTime,
    pub origin: TimestampOrigin,
}

impl OriginalTimestamp {
    pub fn is_embedded(&self) -> bool {
        self.origin != TimestampOrigin::FileModified
    }
}

/// Anything that can supply the pre-correction timestamp of a file.
pub trait TimestampSource: Send + Sync {
    fn read_original_timestamp(&self, path: &Path) -> Result<OriginalTimestamp>;
}

pub struct ExifProcessor;

impl ExifProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Read the best-known capture time, degrading to the filesystem mtime.
    pub fn read_original_timestamp(&self, file_path: &Path) -> Result<OriginalTimestamp> {
        match self.read_embedded(file_path) {
            Ok(found) => {
                debug!("{:?} from EXIF for {}: {}", found.origin, file_path.display(), found.timestamp);
                Ok(found)
            }
            Err(reason) => {
                warn!(
                    "Could not read embedded timestamp from {} ({:#}), using file modification time",
                    file_path.display(),
                    reason
                );
                let timestamp = file_mtime(file_path)?;
                Ok(OriginalTimestamp { timestamp, origin: TimestampOrigin::FileModified })
            }
        }
    }

    fn read_embedded(&self, file_path: &Path) -> anyhow::Result<OriginalTimestamp> {
        let file = File::open(file_path).context("failed to open file")?;
        let mut bufreader = BufReader::new(&file);

        let exif = ExifReader::new()
            .read_from_container(&mut bufreader)
            .context("no EXIF data")?;

        let fields = [
            (Tag::DateTimeOriginal, TimestampOrigin::DateTimeOriginal),
            (Tag::DateTime, TimestampOrigin::DateTime),
        ];

        for (tag, origin) in fields {
            let Some(field) = exif.get_field(tag, In::PRIMARY) else {
                continue;
            };
            match ascii_datetime(&field.value) {
                Some(timestamp) => return Ok(OriginalTimestamp { timestamp, origin }),
                None => debug!("Unusable {} value in {}", tag, file_path.display()),
            }
        }

        Err(anyhow!("no usable DateTimeOriginal or DateTime field"))
    }
}

impl Default for ExifProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampSource for ExifProcessor {
    fn read_original_timestamp(&self, path: &Path) -> Result<OriginalTimestamp> {
        ExifProcessor::read_original_timestamp(self, path)
    }
}

fn ascii_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(ref chunks) = *value else {
        return None;
    };
    let raw = chunks.first()?;
    if is_zero_timestamp(raw) {
        return None;
    }
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
}

/// Cameras without a clock write "0000:00:00 00:00:00".
fn is_zero_timestamp(raw: &[u8]) -> bool {
    raw.iter().all(|b| matches!(b, b'0' | b':' | b' ' | 0))
}

/// Filesystem mtime as local wall-clock time, truncated to whole seconds.
pub fn file_mtime(file_path: &Path) -> Result<NaiveDateTime> {
    let read_err = |e: std::io::Error| RedateError::TimestampRead {
        path: file_path.to_path_buf(),
        reason: e.to_string(),
    };
    let mtime = std::fs::metadata(file_path)
        .and_then(|m| m.modified())
        .map_err(read_err)?;
    let local: DateTime<Local> = mtime.into();
    let naive = local.naive_local();
    Ok(naive.with_nanosecond(0).unwrap_or(naive))
}
