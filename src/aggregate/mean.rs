//! # Lag-aligned mean trajectory
//!
//! Averages a set of member trajectories lag by lag into one synthetic document.
//!
//! ## Averaging
//! -----------------
//! * For every lag hour present in at least one member, latitude, longitude and
//!   pressure/height are averaged over the members that have that lag. A member missing
//!   a lag, including a short one, only drops out of that lag's mean.
//! * Members with fewer than `min_member_samples` samples are treated as malformed and
//!   left out entirely; the default of 1 only drops empty members.
//! * Rows are ordered by increasing `|lag|` (`0, −1, …, −n` for backward runs).
//!
//! ## Framing
//! -----------------
//! The header and direction line come from the first retained member (direction count
//! set to 1); its origin line is reused with latitude and longitude replaced by the
//! lag-0 mean. The variable marker is the plain `1 PRESSURE` layout, and every row is
//! written in the canonical fixed-width format with forecast hour `-88`; the calendar
//! fields of a row are those of the first member that has the lag.
use itertools::Itertools;
use tracing::debug;

use crate::constants::{FastMap, LagHour, SYNTHETIC_FORECAST_HOUR};
use crate::tdump::reader::parse_with;
use crate::tdump::writer::{
    assemble, format_data_row, format_like, renumber_leading, replace_token,
};
use crate::tdump::{RowFields, TdumpDocument, Trajectory, TrajectoryPoint};
use crate::trajclust_errors::{DataError, TrajclustError};

/// Marker line of synthesized documents.
pub const PLAIN_MARKER: &str = "     1 PRESSURE";

#[derive(Debug, Clone)]
struct LagSum {
    n: usize,
    latitude: f64,
    longitude: f64,
    pressure: f64,
    extra: f64,
    extra_n: usize,
    grid: i64,
    calendar: [i64; 5],
}

impl LagSum {
    fn new(grid: i64, calendar: [i64; 5]) -> Self {
        Self {
            n: 0,
            latitude: 0.0,
            longitude: 0.0,
            pressure: 0.0,
            extra: 0.0,
            extra_n: 0,
            grid,
            calendar,
        }
    }

    fn add(&mut self, p: &TrajectoryPoint) {
        self.n += 1;
        self.latitude += p.latitude;
        self.longitude += p.longitude;
        self.pressure += p.pressure_or_height;
        if let Some(v) = p.extra_fields.first() {
            self.extra += v;
            self.extra_n += 1;
        }
    }

    fn mean(&self, lag: LagHour) -> RowFields {
        let n = self.n as f64;
        let extra = if self.extra_n > 0 {
            self.extra / self.extra_n as f64
        } else {
            0.0
        };
        RowFields {
            trajectory_id: 1,
            grid: self.grid,
            calendar: self.calendar,
            forecast_hour: SYNTHETIC_FORECAST_HOUR,
            point: TrajectoryPoint::new(lag, self.latitude / n, self.longitude / n, self.pressure / n)
                .with_extras(vec![extra]),
        }
    }
}

/// One member of an average: a trajectory and the document that frames it.
#[derive(Debug, Clone, Copy)]
pub struct MeanInput<'a> {
    pub document: &'a TdumpDocument,
    pub trajectory: &'a Trajectory,
}

impl<'a> MeanInput<'a> {
    /// Every trajectory of every document, in order.
    pub fn all_of(documents: &'a [TdumpDocument]) -> Vec<MeanInput<'a>> {
        documents
            .iter()
            .flat_map(|document| {
                document
                    .trajectories()
                    .iter()
                    .map(move |trajectory| MeanInput {
                        document,
                        trajectory,
                    })
            })
            .collect()
    }
}

/// Average member trajectories lag by lag.
///
/// Arguments
/// -----------------
/// * `members` – Candidate members, each with its framing document.
/// * `min_member_samples` – Members with fewer samples are treated as malformed and excluded.
///
/// Return
/// ----------
/// * A single-trajectory document in the plain `1 PRESSURE` layout.
/// * [`DataError::NoUsableMembers`] when no member has enough samples.
///
/// See also
/// ------------
/// * [`synthesize_mean_of`] – Same over whole documents.
pub fn synthesize_mean(
    members: &[MeanInput<'_>],
    min_member_samples: usize,
) -> Result<TdumpDocument, TrajclustError> {
    let retained: Vec<&MeanInput<'_>> = members
        .iter()
        .filter(|m| m.trajectory.len() >= min_member_samples)
        .collect();
    let Some(first) = retained.first() else {
        return Err(DataError::NoUsableMembers.into());
    };
    debug!(
        members = members.len(),
        retained = retained.len(),
        "synthesizing mean trajectory"
    );

    let mut sums: FastMap<LagHour, LagSum> = FastMap::default();
    for member in &retained {
        let rows = member
            .document
            .rows()
            .iter()
            .filter_map(|r| r.fields())
            .filter(|f| f.trajectory_id == member.trajectory.origin_id());
        for fields in rows {
            sums.entry(fields.point.lag_hour)
                .or_insert_with(|| LagSum::new(fields.grid, fields.calendar))
                .add(&fields.point);
        }
    }

    let rows: Vec<RowFields> = sums
        .iter()
        .sorted_by_key(|(lag, _)| (lag.unsigned_abs(), **lag))
        .map(|(lag, sum)| sum.mean(*lag))
        .collect();

    let frame = first.document;
    let origin = frame
        .origins()
        .get(first.trajectory.origin_id() - 1)
        .or_else(|| frame.origins().first())
        .ok_or(DataError::NoUsableMembers)?;
    let origin_line = match rows.first().filter(|r| r.point.lag_hour == 0) {
        Some(r) => origin_at(origin.raw(), origin.has_explicit_id(), r.point.latitude, r.point.longitude),
        None => origin_at(origin.raw(), origin.has_explicit_id(), origin.latitude(), origin.longitude()),
    };

    let direction = renumber_leading(frame.direction().raw(), 1)
        .unwrap_or_else(|| frame.direction().raw().to_string());
    let data: Vec<String> = rows.iter().map(format_data_row).collect();

    let lines = frame
        .header_lines()
        .iter()
        .map(String::as_str)
        .chain([direction.as_str(), origin_line.as_str(), PLAIN_MARKER])
        .chain(data.iter().map(String::as_str));
    let text = assemble(lines, true);
    Ok(parse_with(&text, Some(0))?)
}

/// Mean of every trajectory of `documents`.
pub fn synthesize_mean_of(
    documents: &[TdumpDocument],
    min_member_samples: usize,
) -> Result<TdumpDocument, TrajclustError> {
    synthesize_mean(&MeanInput::all_of(documents), min_member_samples)
}

/// Origin line with new coordinates, keeping the width and decimals of the old ones.
fn origin_at(raw: &str, explicit_id: bool, latitude: f64, longitude: f64) -> String {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let n = tokens.len();
    let mut line = if explicit_id {
        renumber_leading(raw, 1).unwrap_or_else(|| raw.to_string())
    } else {
        raw.to_string()
    };
    if n >= 3 {
        let lat = format_like(tokens[n - 3], latitude);
        let lon = format_like(tokens[n - 2], longitude);
        line = replace_token(&line, n - 3, &lat).unwrap_or(line);
        line = replace_token(&line, n - 2, &lon).unwrap_or(line);
    }
    line
}
