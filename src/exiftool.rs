/**
 * External exiftool capability
 *
 * Availability is probed once when the handle is built and never re-checked.
 * Every invocation has a bounded wait: the child is killed at the deadline.
 */

use chrono::NaiveDateTime;
use log::{debug, info};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::WriteCause;
use crate::exif_writer::format_exif_datetime;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Strips every tag and copies them back, repairing broken containers.
const CLEAN_REBUILD_ARGS: [&str; 7] = [
    "-all=",
    "-tagsfromfile",
    "@",
    "-all:all",
    "-unsafe",
    "-icc_profile",
    "-overwrite_original",
];

#[derive(Debug, Clone)]
pub struct ExifTool {
    program: String,
    available: bool,
    timeout: Duration,
}

impl ExifTool {
    /// Probe `exiftool` on PATH.
    pub fn probe(timeout: Duration) -> Self {
        Self::probe_program("exiftool", timeout)
    }

    pub fn probe_program(program: &str, timeout: Duration) -> Self {
        let mut tool = Self {
            program: program.to_string(),
            available: false,
            timeout,
        };
        tool.available = match tool.run(&["-ver"]) {
            Ok(version) => {
                info!("Found {} {}", program, version.trim());
                true
            }
            Err(e) => {
                debug!("{} not usable: {}", program, e);
                false
            }
        };
        tool
    }

    /// A handle that was never found; every write degrades.
    pub fn unavailable() -> Self {
        Self {
            program: "exiftool".to_string(),
            available: false,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Step 1: rebuild the metadata container from its own tags.
    pub fn clean_rebuild(&self, path: &Path) -> Result<(), WriteCause> {
        let mut args: Vec<&str> = CLEAN_REBUILD_ARGS.to_vec();
        let path_arg = path.to_string_lossy();
        args.push(&path_arg);
        self.run(&args).map(|_| ())
    }

    /// Step 2: set every date field plus the filesystem mtime.
    pub fn set_dates(&self, path: &Path, timestamp: NaiveDateTime) -> Result<(), WriteCause> {
        let formatted = format_exif_datetime(timestamp);
        let all_dates = format!("-AllDates={}", formatted);
        let file_modify = format!("-FileModifyDate={}", formatted);
        let path_arg = path.to_string_lossy();
        self.run(&["-overwrite_original", &all_dates, &file_modify, &path_arg])
            .map(|_| ())
    }

    /// Run the tool and return its stdout, or why it failed.
    fn run(&self, args: &[&str]) -> Result<String, WriteCause> {
        debug!("Running {} {}", self.program, args.join(" "));
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(WriteCause::Io)?;

        // Drain pipes on their own threads so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_bounded(&mut child, self.timeout)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else {
            Err(WriteCause::ToolFailed { status: status.code(), stderr })
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut out = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut out) {
                debug!("Failed to drain child pipe: {}", e);
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    })
}

fn wait_bounded(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus, WriteCause> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(WriteCause::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WriteCause::ToolTimeout { seconds: timeout.as_secs() });
        }
        thread::sleep(POLL_INTERVAL);
    }
}
