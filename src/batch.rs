//! # Per-file outcomes of batch sweeps
//!
//! Every sweep in the crate (split, filters, conversion, aggregation) processes a sorted
//! list of files and must never stop on the first bad one. Each file yields a
//! [`FileOutcome`]; the sweep collects them in a [`BatchReport`] which logs as it goes
//! and decides at the end whether the run produced anything.
//!
//! ## Example
//!
//! ```rust
//! use camino::Utf8PathBuf;
//! use trajclust::batch::{BatchReport, FileOutcome};
//!
//! let mut report = BatchReport::new("split");
//! report.record("a.txt", FileOutcome::Processed(vec![Utf8PathBuf::from("out/a.txt")]));
//! report.record("b.txt", FileOutcome::Skipped("already processed".into()));
//! assert_eq!(report.processed_count(), 1);
//! assert!(report.into_result().is_ok());
//! ```
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::trajclust_errors::{DataError, FormatError, TrajclustError};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// The file was handled; the paths it produced (possibly none).
    Processed(Vec<Utf8PathBuf>),
    /// Deliberately not handled (out of scope, already processed, ...).
    Skipped(String),
    FormatFailure(FormatError),
    DataFailure(DataError),
    IoFailure(String),
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FileOutcome::FormatFailure(_) | FileOutcome::DataFailure(_) | FileOutcome::IoFailure(_)
        )
    }
}

impl From<TrajclustError> for FileOutcome {
    fn from(err: TrajclustError) -> Self {
        match err {
            TrajclustError::Format(e) => FileOutcome::FormatFailure(e),
            TrajclustError::Data(e) => FileOutcome::DataFailure(e),
            other => FileOutcome::IoFailure(other.to_string()),
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Processed(outputs) => write!(f, "processed ({} outputs)", outputs.len()),
            FileOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            FileOutcome::FormatFailure(e) => write!(f, "format error: {e}"),
            FileOutcome::DataFailure(e) => write!(f, "data error: {e}"),
            FileOutcome::IoFailure(e) => write!(f, "i/o error: {e}"),
        }
    }
}

/// Outcomes of one sweep, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    label: String,
    outcomes: Vec<(Utf8PathBuf, FileOutcome)>,
}

impl BatchReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record the outcome of `path`, logging skips and failures.
    pub fn record(&mut self, path: impl Into<Utf8PathBuf>, outcome: FileOutcome) {
        let path = path.into();
        match &outcome {
            FileOutcome::Processed(outputs) => {
                debug!(batch = %self.label, path = %path, outputs = outputs.len(), "processed")
            }
            FileOutcome::Skipped(reason) => {
                debug!(batch = %self.label, path = %path, reason = %reason, "skipped")
            }
            failure => warn!(batch = %self.label, path = %path, error = %failure, "file failed"),
        }
        self.outcomes.push((path, outcome));
    }

    /// Convenience for `Result`-returning per-file steps.
    pub fn record_result(
        &mut self,
        path: impl Into<Utf8PathBuf>,
        result: Result<Vec<Utf8PathBuf>, TrajclustError>,
    ) {
        let outcome = match result {
            Ok(outputs) => FileOutcome::Processed(outputs),
            Err(e) => e.into(),
        };
        self.record(path, outcome);
    }

    pub fn outcomes(&self) -> &[(Utf8PathBuf, FileOutcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, path: &Utf8Path) -> Option<&FileOutcome> {
        self.outcomes
            .iter()
            .find(|(p, _)| p.as_path() == path)
            .map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Processed(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Skipped(_)))
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failure()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Utf8Path, &FileOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_failure())
            .map(|(p, o)| (p.as_path(), o))
    }

    /// Every path produced by the processed files, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &Utf8Path> {
        self.outcomes
            .iter()
            .flat_map(|(_, o)| match o {
                FileOutcome::Processed(outputs) => outputs.as_slice(),
                _ => Default::default(),
            })
            .map(Utf8PathBuf::as_path)
    }

    /// Fold another report into this one (used by sweeps made of sub-sweeps).
    pub fn absorb(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
    }

    /// `Ok(self)` when at least one file was processed, [`TrajclustError::EmptyBatch`]
    /// otherwise.
    pub fn into_result(self) -> Result<Self, TrajclustError> {
        if self.processed_count() == 0 {
            Err(TrajclustError::EmptyBatch(format!(
                "{}: nothing processed out of {} files",
                self.label,
                self.len()
            )))
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for BatchReport {
    /// Compact by default; one line per failure with the alternate flag (`{:#}`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Batch '{}'", self.label)?;
            writeln!(f, "-----------------------------------------")?;
            writeln!(f, "files     : {}", self.len())?;
            writeln!(f, "processed : {}", self.processed_count())?;
            writeln!(f, "skipped   : {}", self.skipped_count())?;
            write!(f, "failed    : {}", self.failure_count())?;
            for (path, outcome) in self.failures() {
                write!(f, "\n  {path}: {outcome}")?;
            }
            Ok(())
        } else {
            write!(
                f,
                "{}: files={}, processed={}, skipped={}, failed={}",
                self.label,
                self.len(),
                self.processed_count(),
                self.skipped_count(),
                self.failure_count()
            )
        }
    }
}

/// Regular files under `input` (or `input` itself when it is a file), sorted by path.
///
/// Entries that cannot be read or whose path is not UTF-8 are logged and left out.
pub fn collect_files(input: &Utf8Path) -> Result<Vec<Utf8PathBuf>, TrajclustError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(TrajclustError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{input} is neither a file nor a directory"),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(root = %input, error = %e, "unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => files.push(path),
            Err(path) => warn!(path = %path.display(), "skipping non UTF-8 path"),
        }
    }
    files.sort();
    Ok(files)
}
