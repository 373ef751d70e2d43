pub mod config;
pub mod error;
pub mod exif;
pub mod exif_writer;
pub mod exiftool;
pub mod format;
pub mod jpeg;
pub mod metadata;
pub mod parser;
pub mod pipeline;
pub mod sequential;

#[cfg(test)]
mod test_support;

pub use config::{Backend, Config, Mode};
pub use error::{RedateError, Result};
pub use metadata::{MetadataWriter, UpdateOutcome};
pub use pipeline::{BatchProcessor, ProcessingStats, RunReport};
pub use sequential::SequentialCalculator;
