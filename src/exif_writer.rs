/**
 * EXIF Writer module - capture-time fields in TIFF-structured EXIF blocks
 *
 * Two operations on the TIFF payload of a JPEG APP1 segment:
 * - building a minimal block from scratch (IFD0 + Exif sub-IFD)
 * - patching the three date fields of an existing block in place
 *
 * Both follow the EXIF 2.3 layout: 8-byte TIFF header, 12-byte IFD entries,
 * values wider than 4 bytes stored out of line at word-aligned offsets.
 */

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use log::debug;

pub const TAG_DATE_TIME: u16 = 0x0132;
pub const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
pub const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

/// The fields every writer sets to the same target value.
pub const CAPTURE_TIME_TAGS: [u16; 3] = [TAG_DATE_TIME, TAG_DATE_TIME_ORIGINAL, TAG_DATE_TIME_DIGITIZED];

/// "YYYY:MM:DD HH:MM:SS" plus the NUL terminator.
pub const EXIF_DATETIME_LEN: usize = 20;

/// EXIF tag types as defined in EXIF specification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExifTagType {
    Ascii = 2,
    Long = 4,
}

/// EXIF tag definition
#[derive(Debug, Clone)]
pub struct ExifTag {
    pub tag_id: u16,
    pub tag_type: ExifTagType,
    pub count: u32,
    pub value: Vec<u8>,
}

/// EXIF IFD (Image File Directory) structure
#[derive(Debug, Clone, Default)]
pub struct ExifIfd {
    pub entries: Vec<ExifTag>,
}

impl ExifIfd {
    fn push(&mut self, tag: ExifTag) {
        self.entries.retain(|t| t.tag_id != tag.tag_id);
        self.entries.push(tag);
        self.entries.sort_by_key(|t| t.tag_id);
    }

    /// Bytes occupied by the directory plus its out-of-line values.
    fn encoded_len(&self) -> usize {
        let values: usize = self
            .entries
            .iter()
            .filter(|e| e.value.len() > 4)
            .map(|e| padded(e.value.len()))
            .sum();
        2 + 12 * self.entries.len() + 4 + values
    }
}

fn padded(len: usize) -> usize {
    len + (len % 2)
}

pub fn format_exif_datetime(timestamp: NaiveDateTime) -> String {
    timestamp.format("%Y:%m:%d %H:%M:%S").to_string()
}

/// EXIF writer for creating capture-time EXIF blocks
pub struct ExifWriter {
    primary_ifd: ExifIfd,
    exif_ifd: ExifIfd,
    is_little_endian: bool,
}

impl ExifWriter {
    pub fn new() -> Self {
        Self {
            primary_ifd: ExifIfd::default(),
            exif_ifd: ExifIfd::default(),
            is_little_endian: true,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.is_little_endian = false;
        self
    }

    /// A writer pre-loaded with all three capture-time fields.
    pub fn for_capture_time(timestamp: NaiveDateTime) -> Self {
        let mut writer = Self::new();
        for tag_id in CAPTURE_TIME_TAGS {
            writer.add_timestamp(tag_id, timestamp);
        }
        writer
    }

    /// Add a date tag; it lands in IFD0 or the Exif sub-IFD depending on the tag.
    pub fn add_timestamp(&mut self, tag_id: u16, timestamp: NaiveDateTime) {
        self.add_ascii_tag(tag_id, &format_exif_datetime(timestamp));
    }

    /// Add an ASCII string tag
    pub fn add_ascii_tag(&mut self, tag_id: u16, value: &str) {
        let mut ascii_bytes = value.as_bytes().to_vec();
        ascii_bytes.push(0);

        let tag = ExifTag {
            tag_id,
            tag_type: ExifTagType::Ascii,
            count: ascii_bytes.len() as u32,
            value: ascii_bytes,
        };

        if is_exif_ifd_tag(tag_id) {
            self.exif_ifd.push(tag);
        } else {
            self.primary_ifd.push(tag);
        }
    }

    /// Serialize to the TIFF payload expected after the `Exif\0\0` marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut primary = self.primary_ifd.clone();
        let has_exif_ifd = !self.exif_ifd.entries.is_empty();
        if has_exif_ifd {
            // Placeholder value; the real offset is known once IFD0's size is.
            primary.push(self.long_tag(TAG_EXIF_IFD_POINTER, 0));
            let exif_offset = 8 + primary.encoded_len() as u32;
            primary.push(self.long_tag(TAG_EXIF_IFD_POINTER, exif_offset));
        }

        let mut data = Vec::with_capacity(8 + primary.encoded_len() + self.exif_ifd.encoded_len());
        self.write_tiff_header(&mut data);
        self.write_ifd(&mut data, &primary);
        if has_exif_ifd {
            self.write_ifd(&mut data, &self.exif_ifd);
        }
        debug!("Built {}-byte EXIF block", data.len());
        data
    }

    fn long_tag(&self, tag_id: u16, value: u32) -> ExifTag {
        ExifTag {
            tag_id,
            tag_type: ExifTagType::Long,
            count: 1,
            value: self.u32_bytes(value).to_vec(),
        }
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        if self.is_little_endian { v.to_le_bytes() } else { v.to_be_bytes() }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        if self.is_little_endian { v.to_le_bytes() } else { v.to_be_bytes() }
    }

    /// Write TIFF header (8 bytes)
    fn write_tiff_header(&self, data: &mut Vec<u8>) {
        data.extend_from_slice(if self.is_little_endian { b"II" } else { b"MM" });
        data.extend_from_slice(&self.u16_bytes(42));
        data.extend_from_slice(&self.u32_bytes(8));
    }

    /// Write one IFD with its out-of-line values directly after it.
    /// The next-IFD link is always 0: no thumbnail IFD is produced.
    fn write_ifd(&self, data: &mut Vec<u8>, ifd: &ExifIfd) {
        let ifd_start = data.len();
        let mut value_cursor = ifd_start + 2 + 12 * ifd.entries.len() + 4;

        data.extend_from_slice(&self.u16_bytes(ifd.entries.len() as u16));
        for entry in &ifd.entries {
            data.extend_from_slice(&self.u16_bytes(entry.tag_id));
            data.extend_from_slice(&self.u16_bytes(entry.tag_type as u16));
            data.extend_from_slice(&self.u32_bytes(entry.count));
            if entry.value.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..entry.value.len()].copy_from_slice(&entry.value);
                data.extend_from_slice(&inline);
            } else {
                data.extend_from_slice(&self.u32_bytes(value_cursor as u32));
                value_cursor += padded(entry.value.len());
            }
        }
        data.extend_from_slice(&self.u32_bytes(0));

        for entry in ifd.entries.iter().filter(|e| e.value.len() > 4) {
            data.extend_from_slice(&entry.value);
            if entry.value.len() % 2 != 0 {
                data.push(0);
            }
        }
    }
}

impl Default for ExifWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_exif_ifd_tag(tag_id: u16) -> bool {
    matches!(tag_id, TAG_DATE_TIME_ORIGINAL | TAG_DATE_TIME_DIGITIZED)
}

/// What an in-place patch managed to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub patched: Vec<u16>,
    /// Present-but-unusable fields count as missing: they need a rebuild.
    pub missing: Vec<u16>,
}

impl PatchReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Clone, Copy)]
struct TiffReader<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let little_endian = match data.get(..2) {
            Some(b"II") => true,
            Some(b"MM") => false,
            _ => bail!("missing TIFF byte-order marker"),
        };
        let reader = Self { data, little_endian };
        if reader.u16_at(2)? != 42 {
            bail!("bad TIFF magic number");
        }
        Ok(reader)
    }

    fn u16_at(&self, offset: usize) -> Result<u16> {
        let bytes: [u8; 2] = self
            .data
            .get(offset..offset + 2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| anyhow!("read past end of EXIF block at {}", offset))?;
        Ok(if self.little_endian { u16::from_le_bytes(bytes) } else { u16::from_be_bytes(bytes) })
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        let bytes: [u8; 4] = self
            .data
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| anyhow!("read past end of EXIF block at {}", offset))?;
        Ok(if self.little_endian { u32::from_le_bytes(bytes) } else { u32::from_be_bytes(bytes) })
    }

    /// (tag, type, count, value-or-offset field position) for each entry.
    fn entries(&self, ifd_offset: usize) -> Result<Vec<(u16, u16, u32, usize)>> {
        let count = self.u16_at(ifd_offset)? as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let pos = ifd_offset + 2 + 12 * i;
            entries.push((self.u16_at(pos)?, self.u16_at(pos + 2)?, self.u32_at(pos + 4)?, pos + 8));
        }
        Ok(entries)
    }
}

/// Overwrite the capture-time fields of an existing TIFF payload in place.
///
/// Offsets never move: a field is only rewritten when it is an ASCII value
/// with room for a full date string. Anything else is reported as missing.
/// Errors mean the block itself is malformed.
pub fn patch_capture_times(tiff: &mut [u8], timestamp: NaiveDateTime) -> Result<PatchReport> {
    let reader = TiffReader::new(tiff)?;
    let ifd0 = reader.u32_at(4)? as usize;
    let ifd0_entries = reader.entries(ifd0).context("failed to read IFD0")?;

    let exif_ifd = ifd0_entries
        .iter()
        .find(|(tag, ..)| *tag == TAG_EXIF_IFD_POINTER)
        .map(|&(_, _, _, value_pos)| reader.u32_at(value_pos))
        .transpose()?;
    let exif_entries = match exif_ifd {
        Some(offset) => reader.entries(offset as usize).context("failed to read Exif sub-IFD")?,
        None => Vec::new(),
    };

    let mut targets = Vec::new();
    for tag_id in CAPTURE_TIME_TAGS {
        let pool = if is_exif_ifd_tag(tag_id) { &exif_entries } else { &ifd0_entries };
        let slot = pool
            .iter()
            .find(|(tag, ..)| *tag == tag_id)
            .filter(|&&(_, tag_type, count, _)| {
                tag_type == ExifTagType::Ascii as u16 && count as usize >= EXIF_DATETIME_LEN
            })
            .map(|&(_, _, count, value_pos)| reader.u32_at(value_pos).map(|off| (off as usize, count as usize)))
            .transpose()?;
        targets.push((tag_id, slot));
    }

    let formatted = format_exif_datetime(timestamp);
    let mut report = PatchReport::default();
    for (tag_id, slot) in targets {
        let Some((offset, count)) = slot else {
            report.missing.push(tag_id);
            continue;
        };
        let field = tiff
            .get_mut(offset..offset + count)
            .ok_or_else(|| anyhow!("tag 0x{:04X} value lies outside the EXIF block", tag_id))?;
        field.fill(0);
        field[..formatted.len()].copy_from_slice(formatted.as_bytes());
        report.patched.push(tag_id);
    }

    debug!("EXIF patch: {} patched, {} missing", report.patched.len(), report.missing.len());
    Ok(report)
}
