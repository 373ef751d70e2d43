/**
 * Batch pipeline: walks a folder and applies one timestamp policy
 *
 * Fixed and filename policies are single-pass. The sequential policy is
 * collect (parallel) -> calculate -> apply (parallel); the apply pass never
 * starts before every original timestamp has been merged into the calculator.
 */

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, Mode};
use crate::error::RedateError;
use crate::exif::OriginalTimestamp;
use crate::metadata::MetadataWriter;
use crate::parser::FilenameDateParser;
use crate::sequential::SequentialCalculator;

/// Per-file result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Processed { timestamp: NaiveDateTime },
    Skipped { reason: String },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub file_path: PathBuf,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub error_files: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: ProcessingStats,
    pub results: Vec<ProcessResult>,
}

impl RunReport {
    fn record(&mut self, result: ProcessResult) {
        match &result.status {
            FileStatus::Processed { .. } => self.stats.processed_files += 1,
            FileStatus::Skipped { .. } => self.stats.skipped_files += 1,
            FileStatus::Error { .. } => self.stats.error_files += 1,
        }
        self.results.push(result);
    }

    pub fn errors(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.results.iter().filter_map(|r| match &r.status {
            FileStatus::Error { message } => Some((r.file_path.as_path(), message.as_str())),
            _ => None,
        })
    }
}

pub struct BatchProcessor {
    config: Config,
    writer: MetadataWriter,
    pool: ThreadPool,
}

impl BatchProcessor {
    pub fn new(config: Config) -> Result<Self> {
        let writer = MetadataWriter::new(config.backend, config.tool_timeout);
        Self::with_writer(config, writer)
    }

    pub fn with_writer(config: Config, writer: MetadataWriter) -> Result<Self> {
        config.validate()?;
        let threads = config.worker_count();
        info!("Using thread pool with {} threads (CPUs: {})", threads, num_cpus::get());
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("redate-worker-{}", i))
            .build()
            .context("Failed to build worker thread pool")?;
        Ok(Self { config, writer, pool })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn process_folder(&self) -> Result<RunReport> {
        info!("Processing folder: {}", self.config.folder().display());
        if self.config.dry_run {
            info!("DRY RUN MODE - No files will be modified");
        }

        match &self.config.mode {
            Mode::Sequential { base } => self.process_sequential(*base),
            Mode::Fixed(target) => {
                let target = *target;
                self.process_direct(|_| Ok(target))
            }
            Mode::FromFilename { format } => {
                let parser = FilenameDateParser::new(format.clone());
                info!("Parsing dates from filenames with format {}", parser.format());
                self.process_direct(move |path| {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                    parser.parse(name)
                })
            }
        }
    }

    /// Every regular file under the folder, in a stable order.
    fn walk(&self) -> Vec<PathBuf> {
        let walker = if self.config.recursive {
            WalkDir::new(&self.config.folder)
        } else {
            WalkDir::new(&self.config.folder).max_depth(1)
        };
        walker
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Error accessing path: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Split walked files into supported files and skip results.
    fn classify(&self, files: Vec<PathBuf>, report: &mut RunReport) -> Vec<PathBuf> {
        report.stats.total_files = files.len();
        let mut supported = Vec::with_capacity(files.len());
        for path in files {
            if self.writer.is_supported(&path) {
                supported.push(path);
            } else {
                debug!("Skipping unsupported file: {}", path.display());
                report.record(ProcessResult {
                    file_path: path,
                    status: FileStatus::Skipped { reason: "unsupported format".to_string() },
                });
            }
        }
        supported
    }

    fn process_direct<F>(&self, target_for: F) -> Result<RunReport>
    where
        F: Fn(&Path) -> crate::Result<NaiveDateTime> + Sync,
    {
        let mut report = RunReport::default();
        let files = self.classify(self.walk(), &mut report);

        let pb = progress_bar(files.len() as u64, "Updating files");
        let results: Vec<ProcessResult> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let result = match target_for(path) {
                        Ok(target) => {
                            debug!("Target for {}: {}", path.display(), target);
                            self.apply(path, target)
                        }
                        Err(e) => {
                            error!("{}", e);
                            error_result(path, &e)
                        }
                    };
                    pb.inc(1);
                    result
                })
                .collect()
        });
        pb.finish_with_message("Update complete");

        for result in results {
            report.record(result);
        }
        Ok(report)
    }

    fn process_sequential(&self, base: NaiveDateTime) -> Result<RunReport> {
        info!("Running in SEQUENTIAL mode - preserving time differences");
        let mut report = RunReport::default();
        let files = self.classify(self.walk(), &mut report);

        // Phase 1: collect originals. Results are merged in walk order.
        let pb = progress_bar(files.len() as u64, "Reading timestamps");
        let originals: Vec<(PathBuf, crate::Result<OriginalTimestamp>)> = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let read = self.writer.read_original_timestamp(path);
                    pb.inc(1);
                    (path.clone(), read)
                })
                .collect()
        });
        pb.finish_with_message("Timestamps collected");

        let mut calculator = SequentialCalculator::new(base);
        let mut unreadable = HashSet::new();
        for (path, read) in originals {
            match read {
                Ok(original) => {
                    debug!("Collected timestamp for {}: {}", path.display(), original.timestamp);
                    calculator.add_photo(path, original.timestamp)?;
                }
                Err(e) => {
                    error!("{}", e);
                    report.record(error_result(&path, &e));
                    unreadable.insert(path);
                }
            }
        }

        // Phase 2: calculate.
        info!("Found {} photos, calculating sequential times...", calculator.photo_count());
        calculator.calculate_new_times()?;
        if let Some(earliest) = calculator.records().first() {
            info!(
                "Earliest photo {} ({}) anchors the run at {}",
                earliest.path.display(),
                earliest.original_timestamp,
                calculator.base_timestamp()
            );
        }

        // Phase 3: apply, strictly after every new time is known.
        let targets: Vec<(PathBuf, Option<NaiveDateTime>)> = files
            .into_iter()
            .filter(|path| !unreadable.contains(path))
            .map(|path| {
                let target = calculator.photo_new_time(&path);
                (path, target)
            })
            .collect();

        let pb = progress_bar(targets.len() as u64, "Updating files");
        let results: Vec<ProcessResult> = self.pool.install(|| {
            targets
                .par_iter()
                .map(|(path, target)| {
                    let result = match target {
                        Some(target) => self.apply(path, *target),
                        None => {
                            error!("No calculated time found for {}", path.display());
                            ProcessResult {
                                file_path: path.clone(),
                                status: FileStatus::Error { message: "no calculated time found".to_string() },
                            }
                        }
                    };
                    pb.inc(1);
                    result
                })
                .collect()
        });
        pb.finish_with_message("Update complete");

        for result in results {
            report.record(result);
        }
        Ok(report)
    }

    fn apply(&self, path: &Path, target: NaiveDateTime) -> ProcessResult {
        let status = match self.writer.update(path, target, self.config.dry_run) {
            Ok(outcome) if outcome.is_skip() => FileStatus::Skipped {
                reason: "exiftool unavailable".to_string(),
            },
            Ok(outcome) => {
                info!(
                    "Successfully processed: {} -> {} ({:?})",
                    path.display(),
                    target.format("%Y-%m-%d %H:%M:%S"),
                    outcome
                );
                FileStatus::Processed { timestamp: target }
            }
            Err(e) => {
                error!("{}", e);
                FileStatus::Error { message: e.to_string() }
            }
        };
        ProcessResult { file_path: path.to_path_buf(), status }
    }
}

fn error_result(path: &Path, err: &RedateError) -> ProcessResult {
    ProcessResult {
        file_path: path.to_path_buf(),
        status: FileStatus::Error { message: err.to_string() },
    }
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1} files/s) ETA: {eta} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_each_status() {
        let mut report = RunReport::default();
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        report.record(ProcessResult { file_path: "a".into(), status: FileStatus::Processed { timestamp: ts } });
        report.record(ProcessResult { file_path: "b".into(), status: FileStatus::Skipped { reason: "x".into() } });
        report.record(ProcessResult { file_path: "c".into(), status: FileStatus::Error { message: "boom".into() } });

        assert_eq!(report.stats.processed_files, 1);
        assert_eq!(report.stats.skipped_files, 1);
        assert_eq!(report.stats.error_files, 1);
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors, vec![(Path::new("c"), "boom")]);
    }
}
