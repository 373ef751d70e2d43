/**
 * Sequential timestamp reconciliation
 *
 * The earliest photo gets the base time; every other photo keeps its exact
 * offset from that earliest original. Because the anchor is the minimum over
 * the whole set, the calculator runs in three explicit phases:
 * 1. `Collecting`: `add_photo` appends records, nothing is computed yet
 * 2. `Computing`: entered and left inside `calculate_new_times`
 * 3. `Applying`: new times are readable, the record set is frozen
 *
 * Running the policy twice over the same folder reads the already-corrected
 * times as originals. Offsets between photos survive, but the "original"
 * information from the first run is gone; keep copies if it matters.
 */

use chrono::NaiveDateTime;
use log::{debug, trace};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{RedateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Computing,
    Applying,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Collecting => "collecting",
            Phase::Computing => "computing",
            Phase::Applying => "applying",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub original_timestamp: NaiveDateTime,
    new_timestamp: Option<NaiveDateTime>,
    /// Insertion sequence number.
    seq: usize,
}

pub struct SequentialCalculator {
    base_timestamp: NaiveDateTime,
    records: Vec<PhotoRecord>,
    /// Path to record index; built once calculation completes.
    index: HashMap<PathBuf, usize>,
    phase: Phase,
}

impl SequentialCalculator {
    pub fn new(base_timestamp: NaiveDateTime) -> Self {
        Self {
            base_timestamp,
            records: Vec::new(),
            index: HashMap::new(),
            phase: Phase::Collecting,
        }
    }

    pub fn base_timestamp(&self) -> NaiveDateTime {
        self.base_timestamp
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record one photo. Call order is irrelevant; duplicate paths are kept
    /// as separate records.
    pub fn add_photo(&mut self, path: impl Into<PathBuf>, original_timestamp: NaiveDateTime) -> Result<()> {
        self.require(Phase::Collecting)?;
        let seq = self.records.len();
        self.records.push(PhotoRecord {
            path: path.into(),
            original_timestamp,
            new_timestamp: None,
            seq,
        });
        Ok(())
    }

    /// Number of records collected so far.
    pub fn photo_count(&self) -> usize {
        self.records.len()
    }

    /// Sort by original time and assign every record its new time.
    ///
    /// The sort is stable, so equal originals keep insertion order and get
    /// equal new times.
    pub fn calculate_new_times(&mut self) -> Result<()> {
        self.require(Phase::Collecting)?;
        if self.records.is_empty() {
            return Err(RedateError::EmptyInput);
        }
        self.phase = Phase::Computing;

        self.records.sort_by_key(|r| r.original_timestamp);
        let first_original = self.records[0].original_timestamp;

        for (i, record) in self.records.iter_mut().enumerate() {
            let delta = record.original_timestamp - first_original;
            let new_time = self.base_timestamp + delta;
            trace!(
                "Photo {}: {} -> {} (diff: {}s)",
                i + 1,
                record.original_timestamp,
                new_time,
                delta.num_seconds()
            );
            record.new_timestamp = Some(new_time);
        }

        // First match wins for duplicate paths.
        self.index.clear();
        let mut by_insertion: Vec<usize> = (0..self.records.len()).collect();
        by_insertion.sort_by_key(|&i| self.records[i].seq);
        for i in by_insertion {
            self.index.entry(self.records[i].path.clone()).or_insert(i);
        }

        debug!(
            "First photo time: {} -> {} ({} photos)",
            first_original,
            self.base_timestamp,
            self.records.len()
        );
        self.phase = Phase::Applying;
        Ok(())
    }

    /// New time for `path`; `None` before calculation or for unknown paths.
    pub fn photo_new_time(&self, path: &Path) -> Option<NaiveDateTime> {
        if self.phase != Phase::Applying {
            return None;
        }
        let &i = self.index.get(path)?;
        self.records[i].new_timestamp
    }

    /// Records in chronological order once calculated, insertion order before.
    pub fn records(&self) -> &[PhotoRecord] {
        &self.records
    }

    fn require(&self, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RedateError::InvalidPhase { expected: expected.name(), actual: self.phase.name() })
        }
    }
}
