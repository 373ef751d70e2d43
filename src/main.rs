use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use redate_rs::config::{self, Backend, Config, Mode, DEFAULT_FILENAME_FORMAT};
use redate_rs::pipeline::{BatchProcessor, RunReport};

#[derive(Parser)]
#[command(name = "redate-rs")]
#[command(version)]
#[command(about = "Bulk rewrite of image capture timestamps")]
#[command(long_about = "Rewrites the capture date/time of every image in a folder.

Modes:
- set: give every image the same date/time
- auto: parse each image's date/time from its filename
- sequential: the earliest image gets the given start time, every other image keeps its exact offset from it

EXIF DateTime, DateTimeOriginal and DateTimeDigitized are rewritten for JPEG files; the filesystem modification time is always set.
With --exiftool, PNG and TIFF files get embedded dates as well.

Running sequential mode twice reads the already-corrected times as originals. Offsets survive, the first run's originals do not; keep a copy if they matter.")]
struct Cli {
    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Show what would be changed without modifying any file
    #[arg(long, global = true)]
    dry_run: bool,
    /// Rewrite embedded dates with the external exiftool program
    #[arg(long, global = true)]
    exiftool: bool,
    /// Seconds before a hung exiftool invocation is killed
    #[arg(long, default_value = "60", global = true)]
    tool_timeout: u64,
    /// Number of parallel workers (default: CPU count / 2 for I/O optimization)
    #[arg(short, long, global = true)]
    workers: Option<usize>,
    /// Disable recursive directory traversal (only process files in immediate directory)
    #[arg(long, global = true)]
    no_recursive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set one fixed date/time on every image
    Set {
        /// Folder containing the images
        folder: PathBuf,
        /// Date to set (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Time to set (HH:MM:SS, default: 00:00:00)
        #[arg(short, long)]
        time: Option<String>,
    },
    /// Parse each image's date/time from its filename
    Auto {
        /// Folder containing the images
        folder: PathBuf,
        /// chrono format of the filename stem
        #[arg(short, long, default_value = DEFAULT_FILENAME_FORMAT)]
        format: String,
    },
    /// Shift all images so the earliest starts at the given time
    Sequential {
        /// Folder containing the images
        folder: PathBuf,
        /// Date for the earliest image (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
        /// Time for the earliest image (HH:MM:SS)
        #[arg(short = 's', long)]
        start_time: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose)?;

    info!("Starting redate-rs");

    let config = build_config(cli.command, &cli.run)?;
    info!("Mode: {}", config.mode.name());

    let processor = BatchProcessor::new(config)?;
    let report = processor
        .process_folder()
        .with_context(|| format!("Failed to process {}", processor.config().folder().display()))?;

    print_summary(&report, processor.config().dry_run);
    Ok(())
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    Ok(())
}

fn build_config(command: Commands, run: &RunArgs) -> Result<Config> {
    let (folder, mode) = match command {
        Commands::Set { folder, date, time } => {
            let target = config::combine(&date, time.as_deref())?;
            (folder, Mode::Fixed(target))
        }
        Commands::Auto { folder, format } => (folder, Mode::FromFilename { format }),
        Commands::Sequential { folder, date, start_time } => {
            let base = config::combine(&date, Some(start_time.as_str()))?;
            (folder, Mode::Sequential { base })
        }
    };

    let backend = if run.exiftool { Backend::ExifTool } else { Backend::InProcess };
    let config = Config::new(folder, mode)
        .dry_run(run.dry_run)
        .recursive(!run.no_recursive)
        .backend(backend)
        .workers(run.workers)
        .tool_timeout(Duration::from_secs(run.tool_timeout));
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_summary(report: &RunReport, dry_run: bool) {
    let stats = &report.stats;

    if dry_run {
        println!("\nDry run complete! No files were modified.");
    } else {
        println!("\nProcessing complete!");
    }
    println!("Files found: {}", stats.total_files);
    println!("Files processed: {}", stats.processed_files);
    println!("Files skipped: {}", stats.skipped_files);
    println!("Errors: {}", stats.error_files);

    if stats.error_files > 0 {
        println!("\nErrors:");
        for (path, message) in report.errors() {
            println!("  {}: {}", path.display(), message);
        }
    }
}
