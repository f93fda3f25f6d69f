//! # tdump: trajectory text format model
//!
//! In-memory model of the trajectory model's standard text output ("tdump") and the
//! parser/serializer pair built around it. Every other component of the crate reads and
//! writes trajectories exclusively through [`TdumpDocument`].
//!
//! Modules
//! -----------------
//! * [`reader`](crate::tdump::reader) – Marker detection, origin decoding and data-row parsing.
//! * [`layout`](crate::tdump::layout) – Per-file column layout (trajectory-id column sniffing,
//!   diagnostic-variable offsets, humidity column resolution).
//! * [`writer`](crate::tdump::writer) – Byte-faithful serialization, fixed-width value
//!   replacement and canonical row formatting for synthesized trajectories.
//!
//! Format
//! -----------------
//! ```text
//!      1     1                                        <- grid count, format version
//!     GDAS    95     1    15     0     0              <- one line per meteorological grid
//!      2 BACKWARD OMEGA                               <- origin count, direction, vertical method
//!     95     1    15    18   40.000  -90.000   500.0  <- one origin line per trajectory
//!     95     1    15    18   41.000  -91.000   500.0
//!      1 PRESSURE                                     <- diagnostic-variable marker
//!      1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
//!      2     1    95     1    15    18     0     0     0.0   41.000  -91.000    500.0    948.0
//!      ...
//! ```
//!
//! Data rows hold, from the trajectory-id column on: id, grid, year, month, day, hour,
//! minute, forecast hour, lag hour, latitude, longitude, pressure/height and the
//! diagnostic variables named on the marker line. Which token holds the id differs
//! between dataset generations and is resolved once per file (see [`ColumnLayout`]).
//!
//! Lifecycle
//! -----------------
//! A [`TdumpDocument`] is immutable once parsed. Split outputs, converted files and mean
//! trajectories are new documents; nothing is mutated in place.
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;

use crate::constants::{LagHour, CENTURY_CUTOVER};
use crate::trajclust_errors::{FormatError, TrajclustError};

pub mod layout;
pub mod reader;
pub mod writer;

pub use layout::ColumnLayout;

/// One hourly sample of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub lag_hour: LagHour,
    pub latitude: f64,
    pub longitude: f64,
    pub pressure_or_height: f64,
    /// Diagnostic variables in marker order (PRESSURE, MIXDEPTH, SPCHUMID, ...).
    pub extra_fields: Vec<f64>,
}

impl TrajectoryPoint {
    pub fn new(lag_hour: LagHour, latitude: f64, longitude: f64, pressure_or_height: f64) -> Self {
        Self {
            lag_hour,
            latitude,
            longitude,
            pressure_or_height,
            extra_fields: Vec::new(),
        }
    }

    pub fn with_extras(mut self, extra_fields: Vec<f64>) -> Self {
        self.extra_fields = extra_fields;
        self
    }
}

/// An ordered sequence of samples released from one origin.
///
/// Samples are kept in file order, which for back-trajectories is 0, −1, −2, … .
/// A trajectory is identified by its origin id and, when it was read from disk, its
/// source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    origin_id: usize,
    source: Option<Utf8PathBuf>,
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn new(origin_id: usize, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            origin_id,
            source: None,
            points,
        }
    }

    pub fn with_source(mut self, source: impl Into<Utf8PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn origin_id(&self) -> usize {
        self.origin_id
    }

    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn lags(&self) -> impl Iterator<Item = LagHour> + '_ {
        self.points.iter().map(|p| p.lag_hour)
    }

    pub fn point_at(&self, lag: LagHour) -> Option<&TrajectoryPoint> {
        self.points.iter().find(|p| p.lag_hour == lag)
    }

    /// A trajectory is complete when it spans the whole modeled window:
    /// `duration + 1` samples, the last one at `|lag| == duration`.
    pub fn is_complete(&self, duration: LagHour) -> bool {
        self.points.len() == duration.unsigned_abs() as usize + 1
            && self
                .points
                .last()
                .is_some_and(|p| p.lag_hour.abs() == duration.abs())
    }

    /// Mean latitude, mean longitude and, if requested, mean pressure/height over all samples.
    ///
    /// Return
    /// ----------
    /// * `None` for an empty trajectory.
    pub fn centroid_feature(&self, include_pressure: bool) -> Option<Vec<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (lat, lon, prs) = self.points.iter().fold((0.0, 0.0, 0.0), |acc, p| {
            (
                acc.0 + p.latitude,
                acc.1 + p.longitude,
                acc.2 + p.pressure_or_height,
            )
        });
        let mut feature = vec![lat / n, lon / n];
        if include_pressure {
            feature.push(prs / n);
        }
        Some(feature)
    }
}

/// Trajectory direction declared on the direction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backward => write!(f, "BACKWARD"),
            Direction::Forward => write!(f, "FORWARD"),
        }
    }
}

/// The `<count> BACKWARD|FORWARD <vertical method>` line.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionLine {
    pub(crate) raw: String,
    pub(crate) count: usize,
    pub(crate) direction: Direction,
    pub(crate) vertical_method: String,
}

impl DirectionLine {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn vertical_method(&self) -> &str {
        &self.vertical_method
    }
}

/// Release-point metadata of one trajectory.
///
/// Origin lines only carry an explicit leading id in some dataset generations; when it
/// is absent the id is the 1-based position of the line in the origin block.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginRecord {
    pub(crate) raw: String,
    pub(crate) id: usize,
    pub(crate) explicit_id: bool,
    pub(crate) year: u32,
    pub(crate) month: u8,
    pub(crate) day: u8,
    pub(crate) hour: u8,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) height: f64,
}

impl OriginRecord {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn has_explicit_id(&self) -> bool {
        self.explicit_id
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Four-digit release year; two-digit years go through the century cutover.
    pub fn release_year(&self) -> i32 {
        expand_two_digit_year(self.year)
    }

    /// Release time as a UTC epoch.
    pub fn release_epoch(&self) -> Result<Epoch, FormatError> {
        Epoch::maybe_from_gregorian_utc(
            self.release_year(),
            self.month,
            self.day,
            self.hour,
            0,
            0,
            0,
        )
        .map_err(|e| FormatError::MalformedOrigin {
            line: 0,
            reason: format!("invalid release time in '{}': {e}", self.raw.trim()),
        })
    }
}

/// Map a two-digit year onto a century (`>= 50` → 1900s, otherwise 2000s).
/// Years already written with four digits are returned unchanged.
pub fn expand_two_digit_year(year: u32) -> i32 {
    match year {
        y if y >= 100 => y as i32,
        y if y >= CENTURY_CUTOVER => 1900 + y as i32,
        y => 2000 + y as i32,
    }
}

/// The `<count> PRESSURE [names...]` marker opening the data block.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMarker {
    pub(crate) raw: String,
    pub(crate) count: usize,
    pub(crate) names: Vec<String>,
}

impl VariableMarker {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Decoded fields of a data row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFields {
    pub trajectory_id: usize,
    pub grid: i64,
    /// Year, month, day, hour, minute as written in the row.
    pub calendar: [i64; 5],
    pub forecast_hour: i64,
    pub point: TrajectoryPoint,
}

/// One line of the data block, kept verbatim for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub(crate) raw: String,
    pub(crate) line_number: usize,
    /// `None` for blank lines inside the data block.
    pub(crate) fields: Option<RowFields>,
}

impl DataRow {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn fields(&self) -> Option<&RowFields> {
        self.fields.as_ref()
    }

    pub fn trajectory_id(&self) -> Option<usize> {
        self.fields.as_ref().map(|f| f.trajectory_id)
    }
}

/// A parsed tdump file.
///
/// Invariants
/// -----------------
/// * `origins.len() == direction.count()`.
/// * The id column of [`ColumnLayout`] holds exactly the ids `1..=origins.len()`.
/// * `trajectories[i].origin_id() == i + 1`; trajectories are index-aligned to
///   origins by id, not by row position.
#[derive(Debug, Clone, PartialEq)]
pub struct TdumpDocument {
    pub(crate) header: Vec<String>,
    pub(crate) direction: DirectionLine,
    pub(crate) origins: Vec<OriginRecord>,
    pub(crate) marker: VariableMarker,
    pub(crate) rows: Vec<DataRow>,
    pub(crate) layout: ColumnLayout,
    pub(crate) trajectories: Vec<Trajectory>,
    pub(crate) trailing_newline: bool,
    pub(crate) source: Option<Utf8PathBuf>,
}

impl TdumpDocument {
    /// Parse a tdump text. See [`reader::parse`].
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        reader::parse(text)
    }

    /// Read and parse a file, remembering its path as the trajectories' source.
    pub fn from_file(path: &Utf8Path) -> Result<Self, TrajclustError> {
        let text = std::fs::read_to_string(path)?;
        let doc = reader::parse(&text)?;
        Ok(doc.with_source(path))
    }

    pub(crate) fn with_source(mut self, path: &Utf8Path) -> Self {
        self.trajectories = self
            .trajectories
            .into_iter()
            .map(|t| t.with_source(path))
            .collect();
        self.source = Some(path.to_path_buf());
        self
    }

    /// Serialize back to text. See [`writer::serialize`].
    pub fn serialize(&self) -> String {
        writer::serialize(self)
    }

    pub fn write_to(&self, path: &Utf8Path) -> Result<(), TrajclustError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.serialize())?;
        Ok(())
    }

    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    pub fn header_lines(&self) -> &[String] {
        &self.header
    }

    /// `(grid count, format version)` from the first header line, when present.
    pub fn format_version(&self) -> Option<(u32, u32)> {
        let first = self.header.first()?;
        let mut tokens = first.split_whitespace();
        let grids = tokens.next()?.parse().ok()?;
        let version = tokens.next()?.parse().ok()?;
        Some((grids, version))
    }

    /// Meteorological grid identifiers (first token of each grid line).
    pub fn grid_ids(&self) -> Vec<&str> {
        self.header
            .iter()
            .skip(1)
            .filter_map(|l| l.split_whitespace().next())
            .collect()
    }

    pub fn direction(&self) -> &DirectionLine {
        &self.direction
    }

    pub fn origins(&self) -> &[OriginRecord] {
        &self.origins
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    pub fn marker(&self) -> &VariableMarker {
        &self.marker
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn into_trajectories(self) -> Vec<Trajectory> {
        self.trajectories
    }

    pub fn trajectory(&self, id: usize) -> Option<&Trajectory> {
        id.checked_sub(1).and_then(|i| self.trajectories.get(i))
    }

    pub fn has_trailing_newline(&self) -> bool {
        self.trailing_newline
    }
}

impl fmt::Display for TdumpDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
