/**
 * Metadata writer: turns a target timestamp into a file mutation
 *
 * Fallback chain per file:
 * 1. Embedded rewrite when the active backend handles the format
 * 2. Filesystem access/modification times otherwise
 * 3. Skip (never fail) when the external tool is missing
 */

use chrono::{Local, NaiveDateTime, TimeZone};
use filetime::FileTime;
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Backend;
use crate::error::{RedateError, Result};
use crate::exif::{ExifProcessor, OriginalTimestamp, TimestampSource};
use crate::exiftool::ExifTool;
use crate::format::{extension_of, strategy_for, ImageKind, Strategy};
use crate::jpeg::{check_parseable, rewrite_capture_times, JpegRewrite};

const IN_PROCESS_KINDS: [ImageKind; 1] = [ImageKind::Jpeg];
const EXIFTOOL_KINDS: [ImageKind; 3] = [ImageKind::Jpeg, ImageKind::Png, ImageKind::Tiff];

/// What `update` did (or would do) to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Embedded,
    FilesystemOnly,
    /// Nothing was touched; `strategy` is what a real run would use.
    DryRun { strategy: Option<Strategy> },
    /// Embedded-capable file, but the external tool is not installed.
    SkippedToolUnavailable,
}

impl UpdateOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, UpdateOutcome::SkippedToolUnavailable)
    }
}

enum EmbeddedBackend {
    InProcess,
    ExifTool(ExifTool),
}

pub struct MetadataWriter {
    backend: EmbeddedBackend,
    source: Box<dyn TimestampSource>,
    tool_warned: AtomicBool,
}

impl MetadataWriter {
    /// Build the writer for `backend`; the external tool is probed here, once.
    pub fn new(backend: Backend, tool_timeout: Duration) -> Self {
        match backend {
            Backend::InProcess => Self::in_process(),
            Backend::ExifTool => Self::with_exiftool(ExifTool::probe(tool_timeout)),
        }
    }

    pub fn in_process() -> Self {
        Self::build(EmbeddedBackend::InProcess)
    }

    pub fn with_exiftool(tool: ExifTool) -> Self {
        if !tool.is_available() {
            warn!("exiftool not found; embedded timestamps will not be rewritten");
        }
        Self::build(EmbeddedBackend::ExifTool(tool))
    }

    fn build(backend: EmbeddedBackend) -> Self {
        Self {
            backend,
            source: Box::new(ExifProcessor::new()),
            tool_warned: AtomicBool::new(false),
        }
    }

    /// Replace the original-timestamp source.
    pub fn with_source(mut self, source: impl TimestampSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn is_supported(&self, name: impl AsRef<Path>) -> bool {
        ImageKind::from_path(name.as_ref()).is_some()
    }

    pub fn read_original_timestamp(&self, path: &Path) -> Result<OriginalTimestamp> {
        self.source.read_original_timestamp(path)
    }

    fn embedded_kinds(&self) -> &'static [ImageKind] {
        match self.backend {
            EmbeddedBackend::InProcess => &IN_PROCESS_KINDS,
            EmbeddedBackend::ExifTool(_) => &EXIFTOOL_KINDS,
        }
    }

    /// Strategy a real update would use for `path`.
    pub fn strategy(&self, path: &Path) -> Result<Strategy> {
        let kind = ImageKind::from_path(path).ok_or_else(|| RedateError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: extension_of(path).unwrap_or_default(),
        })?;
        Ok(strategy_for(kind, self.embedded_kinds()))
    }

    fn warn_tool_missing_once(&self) {
        if !self.tool_warned.swap(true, Ordering::Relaxed) {
            warn!("Skipping embedded timestamp rewrites: exiftool is not available");
        }
    }

    /// Persist `timestamp` for `path`. A dry run never touches the file.
    pub fn update(&self, path: &Path, timestamp: NaiveDateTime, dry_run: bool) -> Result<UpdateOutcome> {
        if dry_run {
            let strategy = self.strategy(path).ok();
            if strategy == Some(Strategy::Embedded) {
                match &self.backend {
                    EmbeddedBackend::ExifTool(tool) if !tool.is_available() => {
                        self.warn_tool_missing_once();
                        return Ok(UpdateOutcome::SkippedToolUnavailable);
                    }
                    EmbeddedBackend::ExifTool(_) => {}
                    // A real run would reject it here too.
                    EmbeddedBackend::InProcess => check_parseable(path)?,
                }
            }
            info!(
                "Would update metadata for: {} to {}",
                path.display(),
                timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            return Ok(UpdateOutcome::DryRun { strategy });
        }

        match self.strategy(path)? {
            Strategy::Embedded => self.update_embedded(path, timestamp),
            Strategy::FilesystemOnly => {
                set_filesystem_times(path, timestamp)?;
                debug!("Set filesystem times for {}", path.display());
                Ok(UpdateOutcome::FilesystemOnly)
            }
        }
    }

    fn update_embedded(&self, path: &Path, timestamp: NaiveDateTime) -> Result<UpdateOutcome> {
        match &self.backend {
            EmbeddedBackend::InProcess => {
                let how: JpegRewrite = rewrite_capture_times(path, timestamp)?;
                set_filesystem_times(path, timestamp)?;
                debug!("Updated EXIF ({:?}) for {}", how, path.display());
            }
            EmbeddedBackend::ExifTool(tool) if !tool.is_available() => {
                self.warn_tool_missing_once();
                return Ok(UpdateOutcome::SkippedToolUnavailable);
            }
            EmbeddedBackend::ExifTool(tool) => {
                if let Err(cause) = tool.clean_rebuild(path) {
                    warn!(
                        "Metadata rebuild failed for {} ({}), continuing with original structure",
                        path.display(),
                        cause
                    );
                }
                tool.set_dates(path, timestamp).map_err(|cause| {
                    error!("exiftool could not set dates on {}: {}", path.display(), cause);
                    RedateError::write(path, cause)
                })?;
            }
        }
        Ok(UpdateOutcome::Embedded)
    }
}

/// Local wall-clock time to a filesystem timestamp. Ambiguous (DST fold)
/// times take the earlier instant; nonexistent ones are read as UTC.
pub fn to_file_time(timestamp: NaiveDateTime) -> FileTime {
    let secs = match Local.from_local_datetime(&timestamp).earliest() {
        Some(local) => local.timestamp(),
        None => timestamp.and_utc().timestamp(),
    };
    FileTime::from_unix_time(secs, 0)
}

pub fn set_filesystem_times(path: &Path, timestamp: NaiveDateTime) -> Result<()> {
    let ft = to_file_time(timestamp);
    filetime::set_file_times(path, ft, ft).map_err(|e| RedateError::io(path, e))
}
