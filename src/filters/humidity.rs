//! # Humidity-delta filter and INFILE generation
//!
//! Selects, for one release point, the trajectories whose specific humidity is higher at
//! the release point than at the far end of the trajectory (`Δq > 0`: the air mass gained
//! moisture on its way), and writes their absolute paths to the INFILE of the external
//! cluster tool.
//!
//! ## Candidate selection
//! -----------------
//! Files are looked up in `root/<year>/<point>` for every year of `[start, end]` (missing
//! year directories are logged and skipped). A file is a candidate when its stem ends with
//! an eight-digit `YYMMDDHH` release stamp whose month is requested (no months = all) and
//! whose hour is one of the keep-hours (default `06` and `18`).
//!
//! ## Humidity column
//! -----------------
//! When the marker line names a specific-humidity variable (`SPCHUMID`, `SPHU`, `SPCHUM`)
//! that diagnostic is used; otherwise the last diagnostic variable of the row is taken.
//!
//! ## Failure policy
//! -----------------
//! Per-file failures are logged and excluded. The run fails with
//! [`TrajclustError::EmptyBatch`] only when no trajectory is retained, in which case no
//! INFILE is written.
use std::fmt;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::{info, warn};

use crate::batch::{BatchReport, FileOutcome};
use crate::constants::DEFAULT_KEEP_HOURS;
use crate::manifest::write_infile;
use crate::progress::SweepProgress;
use crate::tdump::{DataRow, TdumpDocument};
use crate::trajclust_errors::{DataError, FormatError, TrajclustError};

static STAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{8})$").expect("release stamp regex"));

/// Configuration of [`filter_humidity`].
///
/// Fields
/// -----------------
/// * `years` – Inclusive `(start, end)` range of year directories.
/// * `months` – Release months to keep; empty keeps every month.
/// * `point` – Release-point directory name (`P1` … `P10`).
/// * `keep_hours` – Release hours to keep (default 6 and 18).
#[derive(Debug, Clone, PartialEq)]
pub struct HumidityParams {
    pub years: (i32, i32),
    pub months: Vec<u32>,
    pub point: String,
    pub keep_hours: Vec<u32>,
}

impl HumidityParams {
    pub fn builder() -> HumidityParamsBuilder {
        HumidityParamsBuilder::default()
    }

    /// Whether a file stem passes the month and hour selection.
    pub fn accepts_stem(&self, stem: &str) -> bool {
        release_stamp(stem).is_some_and(|(month, hour)| {
            (self.months.is_empty() || self.months.contains(&month))
                && self.keep_hours.contains(&hour)
        })
    }
}

impl Default for HumidityParams {
    fn default() -> Self {
        Self {
            years: (1950, 2020),
            months: Vec::new(),
            point: "P1".to_string(),
            keep_hours: DEFAULT_KEEP_HOURS.to_vec(),
        }
    }
}

impl fmt::Display for HumidityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let months = if self.months.is_empty() {
            "all".to_string()
        } else {
            format!("{:?}", self.months)
        };
        if f.alternate() {
            writeln!(f, "Humidity filter parameters")?;
            writeln!(f, "--------------------------")?;
            writeln!(f, "  years      = {}-{}", self.years.0, self.years.1)?;
            writeln!(f, "  months     = {months}")?;
            writeln!(f, "  point      = {}", self.point)?;
            write!(f, "  keep_hours = {:?}", self.keep_hours)
        } else {
            write!(
                f,
                "HumidityParams(years={}-{}, months={months}, point={}, keep_hours={:?})",
                self.years.0, self.years.1, self.point, self.keep_hours
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HumidityParamsBuilder {
    params: HumidityParams,
}

impl HumidityParamsBuilder {
    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.params.years = (start, end);
        self
    }

    pub fn months(mut self, v: impl IntoIterator<Item = u32>) -> Self {
        self.params.months = v.into_iter().collect();
        self
    }

    pub fn point(mut self, v: impl Into<String>) -> Self {
        self.params.point = v.into();
        self
    }

    pub fn keep_hours(mut self, v: impl IntoIterator<Item = u32>) -> Self {
        self.params.keep_hours = v.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<HumidityParams, TrajclustError> {
        let p = &self.params;
        if p.years.0 > p.years.1 {
            return Err(TrajclustError::InvalidParameter(format!(
                "years must be ordered, got {}-{}",
                p.years.0, p.years.1
            )));
        }
        if p.months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(TrajclustError::InvalidParameter(
                "months must be within 1..=12".into(),
            ));
        }
        if p.keep_hours.is_empty() || p.keep_hours.iter().any(|h| *h > 23) {
            return Err(TrajclustError::InvalidParameter(
                "keep_hours must be a non-empty set of hours within 0..=23".into(),
            ));
        }
        if p.point.is_empty() {
            return Err(TrajclustError::InvalidParameter(
                "point must not be empty".into(),
            ));
        }
        Ok(self.params)
    }
}

/// `(month, hour)` of a `...YYMMDDHH` file stem.
pub fn release_stamp(stem: &str) -> Option<(u32, u32)> {
    let caps = STAMP_RE.captures(stem)?;
    let s = &caps[1];
    Some((s[2..4].parse().ok()?, s[6..8].parse().ok()?))
}

fn humidity_of(doc: &TdumpDocument, row: &DataRow) -> Result<f64, DataError> {
    let missing = || DataError::MissingHumidity(row.line_number());
    let extras = &row.fields().ok_or_else(missing)?.point.extra_fields;
    match doc.layout().humidity_extra_index() {
        Some(i) => extras.get(i).copied().ok_or_else(missing),
        None => extras.last().copied().ok_or_else(missing),
    }
}

/// `q(first data row) − q(last data row)` of a document.
pub fn delta_q(doc: &TdumpDocument) -> Result<f64, TrajclustError> {
    let mut valid = doc.rows().iter().filter(|r| r.fields().is_some());
    let first = valid.next().ok_or(FormatError::NoDataRows)?;
    let last = valid.last().unwrap_or(first);
    Ok(humidity_of(doc, first)? - humidity_of(doc, last)?)
}

fn collect_candidates(root: &Utf8Path, params: &HumidityParams) -> Vec<Utf8PathBuf> {
    let mut candidates = Vec::new();
    for year in params.years.0..=params.years.1 {
        let dir = root.join(year.to_string()).join(&params.point);
        let entries = match dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(_) => {
                warn!(dir = %dir, "missing point directory");
                continue;
            }
        };
        let mut files: Vec<Utf8PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.into_path())
            .filter(|p| p.is_file())
            .filter(|p| p.file_stem().is_some_and(|s| params.accepts_stem(s)))
            .collect();
        files.sort();
        candidates.extend(files);
    }
    candidates
}

fn check_file(path: &Utf8Path) -> Result<FileOutcome, TrajclustError> {
    let doc = TdumpDocument::from_file(path)?;
    let dq = delta_q(&doc)?;
    if dq > 0.0 {
        let absolute = path.canonicalize_utf8()?;
        Ok(FileOutcome::Processed(vec![absolute]))
    } else {
        Ok(FileOutcome::Skipped(format!("dq = {dq:.3} <= 0")))
    }
}

/// Select the `Δq > 0` trajectories of one point and write them to `infile`.
///
/// Arguments
/// -----------------
/// * `root` – Root of the `root/<year>/<point>` tree.
/// * `infile` – Destination of the INFILE (ASCII, one absolute path per line).
/// * `params` – Year range, months, point and keep-hours.
///
/// Return
/// ----------
/// * The [`BatchReport`] of the run; retained files are `Processed` with their absolute
///   path as output, in INFILE order.
/// * [`TrajclustError::EmptyBatch`] when nothing is retained.
pub fn filter_humidity(
    root: &Utf8Path,
    infile: &Utf8Path,
    params: &HumidityParams,
) -> Result<BatchReport, TrajclustError> {
    let candidates = collect_candidates(root, params);
    info!(root = %root, candidates = candidates.len(), %params, "humidity-delta selection");

    let mut report = BatchReport::new("humidity");
    let mut progress = SweepProgress::new(candidates.len(), "humidity");
    for path in candidates {
        let outcome = check_file(&path).unwrap_or_else(FileOutcome::from);
        report.record(path, outcome);
        progress.tick();
    }
    progress.finish();

    let kept: Vec<Utf8PathBuf> = report.outputs().map(Utf8Path::to_path_buf).collect();
    write_infile(infile, &kept)?;
    info!(infile = %infile, kept = kept.len(), total = report.len(), "INFILE written");
    Ok(report)
}

#[cfg(test)]
mod humidity_test {
    use super::*;

    fn doc(marker: &str, q_first: f64, q_last: f64) -> TdumpDocument {
        let text = format!(
            "     1     1
    GDAS    95     1    15     0     0
     1 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
{marker}
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0{q_first:9.1}    300.0
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0{q_last:9.1}    310.0
"
        );
        TdumpDocument::parse(&text).unwrap()
    }

    #[test]
    fn test_release_stamp() {
        assert_eq!(release_stamp("tdump_19011506"), Some((1, 6)));
        assert_eq!(release_stamp("tdump_190115"), None);
        assert_eq!(release_stamp("x19011518_tmp"), None);
    }

    #[test]
    fn test_stem_selection() {
        let params = HumidityParams::builder().months([1]).build().unwrap();
        assert!(params.accepts_stem("tdump_19011506"));
        assert!(params.accepts_stem("tdump_19011518"));
        assert!(!params.accepts_stem("tdump_19011512"));
        assert!(!params.accepts_stem("tdump_19021506"));
    }

    #[test]
    fn test_named_humidity_column() {
        // SPCHUMID is the second diagnostic, MIXDEPTH the last token
        let d = doc("     3 PRESSURE SPCHUMID MIXDEPTH", 8.0, 5.0);
        assert_eq!(delta_q(&d).unwrap(), 3.0);
        let d = doc("     3 PRESSURE SPCHUMID MIXDEPTH", 5.0, 8.0);
        assert_eq!(delta_q(&d).unwrap(), -3.0);
    }

    #[test]
    fn test_last_token_fallback() {
        // no humidity name: last token (300 vs 310) decides
        let d = doc("     3 PRESSURE THETA MIXDEPTH", 8.0, 5.0);
        assert_eq!(delta_q(&d).unwrap(), -10.0);
    }

    #[test]
    fn test_builder_validation() {
        assert!(HumidityParams::builder().years(2020, 2019).build().is_err());
        assert!(HumidityParams::builder().months([13]).build().is_err());
        assert!(HumidityParams::builder().keep_hours([]).build().is_err());
        assert!(HumidityParams::builder().keep_hours([24]).build().is_err());
    }
}
