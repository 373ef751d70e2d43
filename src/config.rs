/**
 * Run configuration: which policy to apply, where, and how
 */

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RedateError, Result};

pub const DEFAULT_FILENAME_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timestamp-assignment policy for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every file gets the same date/time.
    Fixed(NaiveDateTime),
    /// Each file's date/time is parsed from its filename.
    FromFilename { format: String },
    /// The earliest photo gets `base`, the rest keep their original offsets.
    Sequential { base: NaiveDateTime },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Fixed(_) => "fixed",
            Mode::FromFilename { .. } => "auto",
            Mode::Sequential { .. } => "sequential",
        }
    }
}

/// Which implementation rewrites embedded metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    InProcess,
    ExifTool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub folder: PathBuf,
    pub mode: Mode,
    pub dry_run: bool,
    pub recursive: bool,
    pub backend: Backend,
    pub workers: Option<usize>,
    pub tool_timeout: Duration,
}

impl Config {
    pub fn new(folder: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            folder: folder.into(),
            mode,
            dry_run: false,
            recursive: true,
            backend: Backend::default(),
            workers: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.folder.exists() {
            return Err(RedateError::Config("folder does not exist".to_string()));
        }
        if !self.folder.is_dir() {
            return Err(RedateError::Config(format!(
                "not a directory: {}",
                self.folder.display()
            )));
        }
        if let Mode::FromFilename { format } = &self.mode {
            if format.trim().is_empty() {
                return Err(RedateError::Config("filename format must not be empty".to_string()));
            }
        }
        if self.workers == Some(0) {
            return Err(RedateError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Thread count for the per-file phases: requested, else half the CPUs.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get() / 2).max(1)
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| RedateError::Config("invalid date format, use YYYY-MM-DD".to_string()))
}

/// Parse an `HH:MM:SS` time of day.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
        .map_err(|_| RedateError::Config("invalid time format, use HH:MM:SS".to_string()))
}

/// Combine a date with an optional time; a missing time means midnight.
pub fn combine(date: &str, time: Option<&str>) -> Result<NaiveDateTime> {
    let date = parse_date(date)?;
    let time = match time {
        Some(t) => parse_time(t)?,
        None => NaiveTime::MIN,
    };
    Ok(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn combine_defaults_to_midnight() {
        let dt = combine("2024-06-01", None).unwrap();
        assert_eq!(dt.to_string(), "2024-06-01 00:00:00");
    }

    #[test]
    fn combine_with_time() {
        let dt = combine("2024-06-01", Some("08:07:30")).unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (8, 7, 30));
    }

    #[test]
    fn bad_date_and_time_are_rejected() {
        let err = combine("01/06/2024", None).unwrap_err();
        assert_eq!(err.to_string(), "invalid date format, use YYYY-MM-DD");
        let err = combine("2024-06-01", Some("8h")).unwrap_err();
        assert_eq!(err.to_string(), "invalid time format, use HH:MM:SS");
    }

    #[test]
    fn validate_checks_folder() {
        let cfg = Config::new("/definitely/not/here", Mode::Fixed(combine("2024-01-01", None).unwrap()));
        assert!(cfg.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path(), Mode::FromFilename { format: DEFAULT_FILENAME_FORMAT.into() });
        assert!(cfg.validate().is_ok());
        assert!(cfg.clone().workers(Some(0)).validate().is_err());
    }

    #[test]
    fn worker_count_is_never_zero() {
        let cfg = Config::new(".", Mode::Fixed(combine("2024-01-01", None).unwrap()));
        assert!(cfg.worker_count() >= 1);
        assert_eq!(cfg.workers(Some(3)).worker_count(), 3);
    }
}
