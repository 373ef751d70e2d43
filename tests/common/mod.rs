#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

use redate_rs::exif::ExifProcessor;
use redate_rs::jpeg::rewrite_capture_times;
use redate_rs::metadata::set_filesystem_times;

pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
}

/// Minimal decodable-enough JPEG without any EXIF block.
pub fn bare_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    bytes.extend_from_slice(&[0x9A, 0xBC]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

/// JPEG whose EXIF capture time is `taken`.
pub fn jpeg_taken_at(dir: &Path, name: &str, taken: NaiveDateTime) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bare_jpeg()).unwrap();
    rewrite_capture_times(&path, taken).unwrap();
    path
}

/// PNG with no embedded time; its mtime is `modified`.
pub fn png_modified_at(dir: &Path, name: &str, modified: NaiveDateTime) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, PNG_SIGNATURE).unwrap();
    set_filesystem_times(&path, modified).unwrap();
    path
}

pub fn capture_time(path: &Path) -> NaiveDateTime {
    ExifProcessor::new().read_original_timestamp(path).unwrap().timestamp
}
