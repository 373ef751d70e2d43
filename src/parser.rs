/**
 * Filename date parsing for the `auto` policy
 */

use chrono::{NaiveDate, NaiveDateTime};
use log::trace;
use std::path::Path;

use crate::error::{RedateError, Result};

/// Tried in order when the primary format does not match.
pub const FALLBACK_FORMATS: [&str; 6] = [
    "%Y%m%d_%H%M%S",
    "%Y-%m-%d_%H-%M-%S",
    "%Y%m%d",
    "%Y-%m-%d",
    "IMG_%Y%m%d_%H%M%S",
    "VID_%Y%m%d_%H%M%S",
];

/// Stripped (case-insensitively, first match only) before retrying a format.
pub const COMMON_PREFIXES: [&str; 6] = ["IMG_", "VID_", "PHOTO_", "PIC_", "IMAGE_", "VIDEO_"];

pub struct FilenameDateParser {
    format: String,
}

impl FilenameDateParser {
    pub fn new(format: impl Into<String>) -> Self {
        Self { format: format.into() }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Parse a date/time out of `filename` (extension is ignored).
    pub fn parse(&self, filename: &str) -> Result<NaiveDateTime> {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);

        if let Some(dt) = parse_with(stem, &self.format) {
            return Ok(dt);
        }

        let cleaned = strip_common_prefix(stem);
        for format in FALLBACK_FORMATS {
            if let Some(dt) = parse_with(stem, format) {
                return Ok(dt);
            }
            if let Some(dt) = parse_with(cleaned, format) {
                return Ok(dt);
            }
        }

        Err(RedateError::TimestampParse { filename: filename.to_string() })
    }

    pub fn is_valid_date_format(&self, filename: &str) -> bool {
        self.parse(filename).is_ok()
    }
}

/// Full date-time first, then date-only at midnight.
fn parse_with(input: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
        return Some(dt);
    }
    let date = NaiveDate::parse_from_str(input, format).ok()?;
    trace!("'{}' matched date-only format '{}'", input, format);
    date.and_hms_opt(0, 0, 0)
}

fn strip_common_prefix(stem: &str) -> &str {
    for prefix in COMMON_PREFIXES {
        let matches = stem
            .get(..prefix.len())
            .map(|head| head.eq_ignore_ascii_case(prefix))
            .unwrap_or(false);
        if matches {
            return &stem[prefix.len()..];
        }
    }
    stem
}
