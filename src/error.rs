/**
 * Error taxonomy for timestamp correction runs
 *
 * Only `EmptyInput` is fatal for a batch; every other variant is reported
 * against a single file and the run carries on.
 */

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedateError>;

/// Why a metadata mutation failed for one file.
#[derive(Debug, Error)]
pub enum WriteCause {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The embedded metadata container could not be parsed or rebuilt.
    #[error("corrupt metadata structure: {0}")]
    Corrupt(String),
    /// The external tool ran but reported failure.
    #[error("exiftool exited with {}: {}", exit_code(.status), .stderr.trim())]
    ToolFailed { status: Option<i32>, stderr: String },
    #[error("exiftool did not finish within {seconds}s")]
    ToolTimeout { seconds: u64 },
}

/// Killed-by-signal processes have no exit code.
fn exit_code(status: &Option<i32>) -> String {
    status.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}

#[derive(Debug, Error)]
pub enum RedateError {
    #[error("no supported image files found in folder")]
    EmptyInput,

    #[error("could not read timestamp from {}: {reason}", .path.display())]
    TimestampRead { path: PathBuf, reason: String },

    #[error("could not parse date from filename: {filename}")]
    TimestampParse { filename: String },

    #[error("failed to update metadata for {}: {cause}", .path.display())]
    MetadataWrite {
        path: PathBuf,
        #[source]
        cause: WriteCause,
    },

    #[error("unsupported file format: {extension:?} ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("calculator is {actual}, operation requires {expected}")]
    InvalidPhase { expected: &'static str, actual: &'static str },

    #[error("{0}")]
    Config(String),
}

impl RedateError {
    pub fn write(path: impl Into<PathBuf>, cause: WriteCause) -> Self {
        RedateError::MetadataWrite { path: path.into(), cause }
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::write(path, WriteCause::Io(err))
    }

    pub fn corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::write(path, WriteCause::Corrupt(msg.into()))
    }
}
