//! # Splitting multi-origin tdump files
//!
//! The trajectory model writes one file per release time holding up to ten origins
//! (release points). Everything downstream works per release point, so each file is cut
//! into single-trajectory documents and filed under `output_root/<year>/P<i>/<name>`, `i`
//! being the origin's 1-based position.
//!
//! ## Overview
//! -----------------
//! * [`split_document`] – Pure, in-memory split of one parsed document.
//! * [`split_tree`] – Sorted sweep over a file or directory tree with year attribution,
//!   optional year-range filtering and resumption through a [`ProcessedManifest`].
//! * [`attribute_year`], [`year_from_ancestors`], [`year_from_filename`] – Year
//!   attribution rules.
//!
//! ## Single-trajectory documents
//! -----------------
//! Each output keeps the source's header and marker lines verbatim. The direction line
//! count is rewritten to `1`, the origin's explicit id (if any) to `1`, and only the data
//! rows of the matching trajectory are kept, with their id token rewritten to `1`.
//! Rewritten numbers are right-justified in the width of the value they replace.
//!
//! ## Example
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use trajclust::manifest::ProcessedManifest;
//! use trajclust::split::{split_tree, SplitParams};
//!
//! let params = SplitParams::builder().year_range(2019, 2020).build().unwrap();
//! let mut manifest = ProcessedManifest::load(Utf8Path::new("split.done")).unwrap();
//! let report = split_tree(
//!     Utf8Path::new("/data/raw"),
//!     Utf8Path::new("/data/split"),
//!     &params,
//!     &mut manifest,
//! )
//! .unwrap();
//! println!("{report}");
//! manifest.persist(Utf8Path::new("split.done")).unwrap();
//! ```
use std::fmt;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use tracing::{debug, info};

use crate::batch::{collect_files, BatchReport, FileOutcome};
use crate::manifest::ProcessedManifest;
use crate::progress::SweepProgress;
use crate::tdump::writer::{renumber_leading, replace_token};
use crate::tdump::{
    expand_two_digit_year, DataRow, DirectionLine, OriginRecord, RowFields, TdumpDocument,
    Trajectory,
};
use crate::trajclust_errors::TrajclustError;

static YEAR_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").expect("year directory regex"));

static STAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10}|\d{8}|\d{6,7}").expect("timestamp regex"));

static FOUR_DIGIT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(19|20)\d{2}").expect("year regex"));

static TWO_DIGIT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{2})(?:\D|$)").expect("two-digit year regex"));

/// Configuration of [`split_tree`].
///
/// Fields
/// -----------------
/// * `year_range` – Inclusive `(first, last)` year filter; `None` keeps every year.
/// * `year_from_release_time` – When neither the directories nor the file name carry a
///   year, fall back to the release year of the first origin record (requires parsing the
///   file before filtering).
/// * `skip_processed` – Skip sources already recorded in the manifest.
///
/// Defaults: no range, no release-time fallback, `skip_processed = true`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitParams {
    pub year_range: Option<(i32, i32)>,
    pub year_from_release_time: bool,
    pub skip_processed: bool,
}

impl SplitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SplitParamsBuilder {
        SplitParamsBuilder::new()
    }

    pub fn accepts_year(&self, year: i32) -> bool {
        self.year_range
            .map_or(true, |(first, last)| (first..=last).contains(&year))
    }
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            year_range: None,
            year_from_release_time: false,
            skip_processed: true,
        }
    }
}

impl fmt::Display for SplitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = match self.year_range {
            Some((a, b)) => format!("{a}-{b}"),
            None => "all".to_string(),
        };
        if f.alternate() {
            writeln!(f, "Split parameters")?;
            writeln!(f, "----------------")?;
            writeln!(f, "  year_range             = {range}")?;
            writeln!(
                f,
                "  year_from_release_time = {}",
                self.year_from_release_time
            )?;
            write!(f, "  skip_processed         = {}", self.skip_processed)
        } else {
            write!(
                f,
                "SplitParams(years={range}, release_time_fallback={}, skip_processed={})",
                self.year_from_release_time, self.skip_processed
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitParamsBuilder {
    params: SplitParams,
}

impl SplitParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: SplitParams::default(),
        }
    }

    pub fn year_range(mut self, first: i32, last: i32) -> Self {
        self.params.year_range = Some((first, last));
        self
    }

    pub fn year_from_release_time(mut self, v: bool) -> Self {
        self.params.year_from_release_time = v;
        self
    }

    pub fn skip_processed(mut self, v: bool) -> Self {
        self.params.skip_processed = v;
        self
    }

    pub fn build(self) -> Result<SplitParams, TrajclustError> {
        if let Some((first, last)) = self.params.year_range {
            if first > last {
                return Err(TrajclustError::InvalidParameter(format!(
                    "year_range must be ordered, got {first}-{last}"
                )));
            }
        }
        Ok(self.params)
    }
}

/// Split a document into one single-origin document per origin record.
///
/// Return
/// ----------
/// * `N` documents in origin order; document `i` holds the rows of trajectory `i + 1`,
///   renumbered to trajectory `1`.
pub fn split_document(doc: &TdumpDocument) -> Vec<TdumpDocument> {
    let id_col = doc.layout.id_column();
    let direction = DirectionLine {
        raw: renumber_leading(&doc.direction.raw, 1).unwrap_or_else(|| doc.direction.raw.clone()),
        count: 1,
        ..doc.direction.clone()
    };

    doc.origins
        .iter()
        .enumerate()
        .map(|(i, origin)| {
            let tid = i + 1;
            let raw = if origin.explicit_id {
                renumber_leading(&origin.raw, 1).unwrap_or_else(|| origin.raw.clone())
            } else {
                origin.raw.clone()
            };
            let origin = OriginRecord {
                raw,
                id: 1,
                ..origin.clone()
            };

            // header, direction, origin, marker
            let first_row_line = doc.header.len() + 4;
            let rows: Vec<DataRow> = doc
                .rows
                .iter()
                .filter_map(|row| row.fields.as_ref().map(|f| (row, f)))
                .filter(|(_, f)| f.trajectory_id == tid)
                .enumerate()
                .map(|(k, (row, fields))| DataRow {
                    raw: replace_token(&row.raw, id_col, "1").unwrap_or_else(|| row.raw.clone()),
                    line_number: first_row_line + k,
                    fields: Some(RowFields {
                        trajectory_id: 1,
                        ..fields.clone()
                    }),
                })
                .collect();

            let mut trajectory = Trajectory::new(
                1,
                rows.iter()
                    .filter_map(|r| r.fields.as_ref().map(|f| f.point.clone()))
                    .collect(),
            );
            if let Some(src) = doc.trajectories[i].source() {
                trajectory = trajectory.with_source(src);
            }

            TdumpDocument {
                header: doc.header.clone(),
                direction: direction.clone(),
                origins: vec![origin],
                marker: doc.marker.clone(),
                rows,
                layout: doc.layout.clone(),
                trajectories: vec![trajectory],
                trailing_newline: true,
                source: None,
            }
        })
        .collect()
}

/// Year of the nearest ancestor directory named `19xx` or `20xx`.
pub fn year_from_ancestors(path: &Utf8Path) -> Option<i32> {
    path.ancestors()
        .skip(1)
        .filter_map(Utf8Path::file_name)
        .find(|name| YEAR_DIR_RE.is_match(name))
        .and_then(|name| name.parse().ok())
}

/// Year encoded in a file name.
///
/// The first run of 6 to 10 digits is read as `YYYYMMDDHH` (10 digits starting with
/// `19`/`20`), `YYYYMMDD` (8 digits starting with `19`/`20` with a valid month and day),
/// or otherwise as a leading two-digit year. Names without such a run fall back to any
/// embedded `19xx`/`20xx`, then to an isolated two-digit group.
pub fn year_from_filename(name: &str) -> Option<i32> {
    if let Some(m) = STAMP_RE.find(name) {
        let d = m.as_str();
        let century = d.starts_with("19") || d.starts_with("20");
        if d.len() == 10 && century {
            return d[..4].parse().ok();
        }
        if d.len() == 8 && century {
            let month: u32 = d[4..6].parse().ok()?;
            let day: u32 = d[6..8].parse().ok()?;
            if (1..=12).contains(&month) && (1..=31).contains(&day) {
                return d[..4].parse().ok();
            }
        }
        return d[..2].parse().ok().map(expand_two_digit_year);
    }
    if let Some(m) = FOUR_DIGIT_YEAR_RE.find(name) {
        return m.as_str().parse().ok();
    }
    TWO_DIGIT_YEAR_RE
        .captures(name)
        .and_then(|c| c[1].parse().ok())
        .map(expand_two_digit_year)
}

/// Attribute a year to a source file: ancestor directory first, then file name.
pub fn attribute_year(path: &Utf8Path) -> Result<i32, TrajclustError> {
    year_from_ancestors(path)
        .or_else(|| path.file_name().and_then(year_from_filename))
        .ok_or_else(|| TrajclustError::UnattributedYear(path.to_string()))
}

fn split_file(
    path: &Utf8Path,
    output_root: &Utf8Path,
    params: &SplitParams,
) -> Result<FileOutcome, TrajclustError> {
    let mut parsed = None;
    let year = match attribute_year(path) {
        Ok(year) => year,
        Err(e) if params.year_from_release_time => {
            let doc = TdumpDocument::from_file(path)?;
            let year = doc
                .origins()
                .first()
                .map(OriginRecord::release_year)
                .ok_or(e)?;
            parsed = Some(doc);
            year
        }
        Err(e) => return Ok(FileOutcome::Skipped(e.to_string())),
    };
    if !params.accepts_year(year) {
        return Ok(FileOutcome::Skipped(format!("year {year} outside range")));
    }

    let doc = match parsed {
        Some(doc) => doc,
        None => TdumpDocument::from_file(path)?,
    };
    let name = path
        .file_name()
        .ok_or_else(|| TrajclustError::InvalidParameter(format!("{path} has no file name")))?;

    let mut outputs = Vec::with_capacity(doc.origin_count());
    for (i, single) in split_document(&doc).iter().enumerate() {
        let out = output_root
            .join(year.to_string())
            .join(format!("P{}", i + 1))
            .join(name);
        single.write_to(&out)?;
        outputs.push(out);
    }
    Ok(FileOutcome::Processed(outputs))
}

/// Split every tdump file under `input` into `output_root/<year>/P<i>/<name>`.
///
/// Arguments
/// -----------------
/// * `input` – A file or a directory walked recursively in sorted order.
/// * `output_root` – Root of the per-year, per-point tree.
/// * `params` – Year range, release-time fallback, manifest skipping.
/// * `manifest` – Ledger of handled sources; updated with every split source
///   (`source | output_root/<year>`).
///
/// Return
/// ----------
/// * A [`BatchReport`] with one outcome per visited file. Unattributable or out-of-range
///   files are skipped, unreadable or malformed ones are recorded as failures.
/// * An error only when `input` itself cannot be walked.
pub fn split_tree(
    input: &Utf8Path,
    output_root: &Utf8Path,
    params: &SplitParams,
    manifest: &mut ProcessedManifest,
) -> Result<BatchReport, TrajclustError> {
    let files = collect_files(input)?;
    info!(input = %input, output = %output_root, files = files.len(), %params, "splitting trajectory files");

    let mut report = BatchReport::new("split");
    let mut progress = SweepProgress::new(files.len(), "split");
    for path in files {
        if params.skip_processed && manifest.contains(path.as_str()) {
            report.record(path, FileOutcome::Skipped("already processed".into()));
            progress.tick();
            continue;
        }

        let outcome = split_file(&path, output_root, params).unwrap_or_else(FileOutcome::from);
        if let FileOutcome::Processed(outputs) = &outcome {
            if let Some(year_dir) = outputs
                .first()
                .and_then(|o| o.parent())
                .and_then(Utf8Path::parent)
            {
                manifest.record(path.as_str(), year_dir.as_str());
            }
        }
        report.record(path, outcome);
        let timing = progress.tick();
        debug!(%timing, "split step");
    }
    progress.finish();

    info!("{report}");
    Ok(report)
}

#[cfg(test)]
mod split_test {
    use super::*;

    const THREE: &str = "     1     1
    GDAS    95     1    15     0     0
     3 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
    95     1    15    18   41.000  -91.000    500.0
    95     1    15    18   42.000  -92.000    500.0
     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
     2     1    95     1    15    18     0     0     0.0   41.000  -91.000    500.0    948.0
     3     1    95     1    15    18     0     0     0.0   42.000  -92.000    500.0    947.0
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0
     2     1    95     1    15    17     0     0    -1.0   41.100  -91.200    505.0    949.0
     3     1    95     1    15    17     0     0    -1.0   42.100  -92.200    502.0    946.0
";

    #[test]
    fn test_split_document() {
        let doc = TdumpDocument::parse(THREE).unwrap();
        let parts = split_document(&doc);
        assert_eq!(parts.len(), 3);

        let third = &parts[2];
        assert_eq!(third.origin_count(), 1);
        assert_eq!(third.direction().count(), 1);
        assert_eq!(third.direction().raw(), "     1 BACKWARD OMEGA");
        assert_eq!(third.origins()[0].latitude(), 42.0);
        assert_eq!(third.rows().len(), 2);
        assert!(third
            .rows()
            .iter()
            .all(|r| r.raw().starts_with("     1     1    95")));
        assert_eq!(third.trajectory(1).unwrap().points()[1].latitude, 42.1);

        // the serialized split output parses back to the same content
        let reparsed = TdumpDocument::parse(&third.serialize()).unwrap();
        assert_eq!(reparsed.trajectories(), third.trajectories());
        assert_eq!(reparsed.rows(), third.rows());
    }

    #[test]
    fn test_split_second_id_column() {
        let text = "     1     1
    GDAS    95     1    15     0     0
     2 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
    95     1    15    18   41.000  -91.000    500.0
     1 PRESSURE
    11     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0
    12     2     1    95     1    15    18     0     0     0.0   41.000  -91.000    500.0
";
        let doc = TdumpDocument::parse(text).unwrap();
        let parts = split_document(&doc);
        assert_eq!(
            parts[1].rows()[0].raw(),
            "    12     1     1    95     1    15    18     0     0     0.0   41.000  -91.000    500.0"
        );
    }

    #[test]
    fn test_year_from_filename() {
        assert_eq!(year_from_filename("tdump_2019011518"), Some(2019));
        assert_eq!(year_from_filename("traj20190115"), Some(2019));
        assert_eq!(year_from_filename("tdump_95011518"), Some(1995));
        assert_eq!(year_from_filename("tdump_050115"), Some(2005));
        assert_eq!(year_from_filename("run_2003_a"), Some(2003));
        assert_eq!(year_from_filename("jan_97_b"), Some(1997));
        assert_eq!(year_from_filename("tdump"), None);
    }

    #[test]
    fn test_year_from_ancestors() {
        assert_eq!(
            year_from_ancestors(Utf8Path::new("/data/2019/jan/tdump_95011518")),
            Some(2019)
        );
        assert_eq!(year_from_ancestors(Utf8Path::new("/data/x/2019")), None);
        assert_eq!(
            attribute_year(Utf8Path::new("/data/raw/tdump_95011518")),
            Ok(1995)
        );
        assert!(matches!(
            attribute_year(Utf8Path::new("/data/raw/tdump")),
            Err(TrajclustError::UnattributedYear(_))
        ));
    }

    #[test]
    fn test_params_validation() {
        assert!(SplitParams::builder().year_range(2020, 2019).build().is_err());
        let p = SplitParams::builder().year_range(2019, 2020).build().unwrap();
        assert!(p.accepts_year(2019));
        assert!(!p.accepts_year(2021));
        assert!(SplitParams::default().accepts_year(1950));
    }
}
