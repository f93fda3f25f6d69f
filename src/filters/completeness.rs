//! Completeness filter.
//!
//! A trajectory file is complete when its final data row sits at the end of the modeled
//! window, `|lag| == duration`. Only the tail of the file is inspected: the last line with
//! enough tokens to hold a lag hour. Files that cannot be read or whose final lag is not a
//! number are indeterminate; they are reported and never deleted.
//!
//! Running the filter twice in [`CompletenessMode::Delete`] is a no-op the second time.
use std::fmt;

use camino::Utf8Path;
use tracing::info;

use crate::batch::{collect_files, BatchReport, FileOutcome};
use crate::constants::{DEFAULT_DURATION_HOURS, LAG_OFFSET};
use crate::progress::SweepProgress;
use crate::trajclust_errors::{FormatError, TrajclustError};

/// What to do with incomplete files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletenessMode {
    /// Report incomplete files, touch nothing.
    #[default]
    ReportOnly,
    /// Delete incomplete files.
    Delete,
}

impl fmt::Display for CompletenessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletenessMode::ReportOnly => write!(f, "report-only"),
            CompletenessMode::Delete => write!(f, "delete"),
        }
    }
}

/// Configuration of [`filter_incomplete`].
///
/// Fields
/// -----------------
/// * `duration` – Modeled window in hours (default 240).
/// * `id_column` – Token holding the trajectory id in this dataset generation (0 or 1);
///   the lag hour is read `8` tokens further.
/// * `mode` – [`CompletenessMode::ReportOnly`] (default) or [`CompletenessMode::Delete`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessParams {
    pub duration: i32,
    pub id_column: usize,
    pub mode: CompletenessMode,
}

impl CompletenessParams {
    pub fn builder() -> CompletenessParamsBuilder {
        CompletenessParamsBuilder::default()
    }

    fn lag_column(&self) -> usize {
        self.id_column + LAG_OFFSET
    }
}

impl Default for CompletenessParams {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_HOURS,
            id_column: 0,
            mode: CompletenessMode::ReportOnly,
        }
    }
}

impl fmt::Display for CompletenessParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Completeness parameters")?;
            writeln!(f, "-----------------------")?;
            writeln!(f, "  duration  = {} h", self.duration)?;
            writeln!(f, "  id_column = {}", self.id_column)?;
            write!(f, "  mode      = {}", self.mode)
        } else {
            write!(
                f,
                "CompletenessParams(duration={}h, id_column={}, mode={})",
                self.duration, self.id_column, self.mode
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletenessParamsBuilder {
    params: CompletenessParams,
}

impl CompletenessParamsBuilder {
    pub fn duration(mut self, v: i32) -> Self {
        self.params.duration = v;
        self
    }

    pub fn id_column(mut self, v: usize) -> Self {
        self.params.id_column = v;
        self
    }

    pub fn mode(mut self, v: CompletenessMode) -> Self {
        self.params.mode = v;
        self
    }

    pub fn build(self) -> Result<CompletenessParams, TrajclustError> {
        if self.params.duration <= 0 {
            return Err(TrajclustError::InvalidParameter(
                "duration must be > 0".into(),
            ));
        }
        if self.params.id_column > 1 {
            return Err(TrajclustError::InvalidParameter(
                "id_column must be 0 or 1".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Completeness of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum Completeness {
    Complete,
    Incomplete { last_lag: f64 },
}

/// Inspect the final data row of a tdump text.
///
/// Return
/// ----------
/// * [`Completeness::Complete`] iff the lag hour of the last line holding at least
///   `lag column + 1` tokens has absolute value `duration`.
/// * [`FormatError::NoDataRows`] if no line is long enough, [`FormatError::MalformedRow`]
///   if the lag token is not a number.
pub fn final_row_completeness(
    text: &str,
    params: &CompletenessParams,
) -> Result<Completeness, FormatError> {
    let col = params.lag_column();
    let lines: Vec<&str> = text.lines().collect();
    let (line, tokens) = lines
        .iter()
        .enumerate()
        .rev()
        .map(|(i, l)| (i + 1, l.split_whitespace().collect::<Vec<_>>()))
        .find(|(_, t)| t.len() > col)
        .ok_or(FormatError::NoDataRows)?;

    let last_lag = tokens[col]
        .parse::<f64>()
        .map_err(|_| FormatError::MalformedRow {
            line,
            reason: format!("lag hour '{}' is not a number", tokens[col]),
        })?;

    if last_lag.abs() == f64::from(params.duration) {
        Ok(Completeness::Complete)
    } else {
        Ok(Completeness::Incomplete { last_lag })
    }
}

fn check_file(path: &Utf8Path, params: &CompletenessParams) -> Result<FileOutcome, TrajclustError> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    match final_row_completeness(&text, params)? {
        Completeness::Complete => Ok(FileOutcome::Processed(vec![path.to_path_buf()])),
        Completeness::Incomplete { last_lag } => match params.mode {
            CompletenessMode::ReportOnly => Ok(FileOutcome::Skipped(format!(
                "incomplete (last lag {last_lag:.1}), would delete"
            ))),
            CompletenessMode::Delete => {
                std::fs::remove_file(path)?;
                Ok(FileOutcome::Skipped(format!(
                    "incomplete (last lag {last_lag:.1}), deleted"
                )))
            }
        },
    }
}

/// Sweep `root` recursively and remove or report incomplete trajectory files.
///
/// Return
/// ----------
/// * A [`BatchReport`] where complete files are `Processed` (their own path as output),
///   incomplete files are `Skipped` with the final lag and the action taken, and
///   indeterminate files are failures.
pub fn filter_incomplete(
    root: &Utf8Path,
    params: &CompletenessParams,
) -> Result<BatchReport, TrajclustError> {
    let files = collect_files(root)?;
    info!(root = %root, files = files.len(), %params, "checking trajectory completeness");

    let mut report = BatchReport::new("completeness");
    let mut progress = SweepProgress::new(files.len(), "completeness");
    for path in files {
        let outcome = check_file(&path, params).unwrap_or_else(FileOutcome::from);
        report.record(path, outcome);
        progress.tick();
    }
    progress.finish();

    info!("{report}");
    Ok(report)
}

#[cfg(test)]
mod completeness_test {
    use super::*;

    fn rows(last_lag: &str) -> String {
        format!(
            "     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0
     1     1    95     1     5    18     0     0 {last_lag:>7}   30.000  -80.000    800.0

"
        )
    }

    #[test]
    fn test_final_row_decides() {
        let params = CompletenessParams::default();
        assert_eq!(
            final_row_completeness(&rows("-240.0"), &params),
            Ok(Completeness::Complete)
        );
        assert_eq!(
            final_row_completeness(&rows("240.0"), &params),
            Ok(Completeness::Complete)
        );
        assert_eq!(
            final_row_completeness(&rows("-239.0"), &params),
            Ok(Completeness::Incomplete { last_lag: -239.0 })
        );
    }

    #[test]
    fn test_indeterminate_rows() {
        let params = CompletenessParams::default();
        assert_eq!(
            final_row_completeness("     1 PRESSURE\n", &params),
            Err(FormatError::NoDataRows)
        );
        assert!(matches!(
            final_row_completeness(&rows("-24x.0"), &params),
            Err(FormatError::MalformedRow { line: 3, .. })
        ));
    }

    #[test]
    fn test_short_trailing_lines_are_passed_over() {
        let params = CompletenessParams::default();
        let text = format!("{}   end\n\n", rows("-24x.0"));
        assert!(matches!(
            final_row_completeness(&text, &params),
            Err(FormatError::MalformedRow { line: 3, .. })
        ));
        let text = format!("{}   end\r\n", rows("-120.0").replace('\n', "\r\n"));
        assert_eq!(
            final_row_completeness(&text, &params),
            Ok(Completeness::Incomplete { last_lag: -120.0 })
        );
    }

    #[test]
    fn test_second_id_column_shifts_lag() {
        let params = CompletenessParams::builder().id_column(1).build().unwrap();
        let text = "    77     1     1    95     1     5    18     0     0  -240.0   30.000  -80.000\n";
        assert_eq!(
            final_row_completeness(text, &params),
            Ok(Completeness::Complete)
        );
    }

    #[test]
    fn test_builder_validation() {
        assert!(CompletenessParams::builder().duration(0).build().is_err());
        assert!(CompletenessParams::builder().id_column(2).build().is_err());
    }
}
