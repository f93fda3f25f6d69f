//! # tdump reader
//!
//! Turns tdump text into a [`TdumpDocument`].
//!
//! ## Parsing steps
//! -----------------
//! 1. Locate the direction line (`<int> BACKWARD|FORWARD ...`); everything before it is
//!    kept verbatim as header (grid metadata).
//! 2. Locate the variable marker (`<int> PRESSURE [names...]`) after it.
//! 3. The lines in between are origin records; their number must equal the count
//!    declared on the direction line.
//! 4. Resolve the trajectory-id column from the data rows
//!    (see [`resolve_id_column`](crate::tdump::layout::resolve_id_column)).
//! 5. Decode every data row with the resolved [`ColumnLayout`] and group the samples
//!    by trajectory id.
//!
//! Every raw line is retained so that [`serialize`](crate::tdump::writer::serialize)
//! reproduces the input byte for byte, including CRLF endings and the presence or
//! absence of a final newline.
use std::sync::LazyLock;

use regex::Regex;

use super::layout::{confirm_id_column, resolve_id_column, ColumnLayout};
use super::{
    DataRow, Direction, DirectionLine, OriginRecord, RowFields, TdumpDocument, Trajectory,
    TrajectoryPoint, VariableMarker,
};
use crate::constants::{
    FORECAST_HOUR_OFFSET, GRID_OFFSET, LAG_OFFSET, LAT_OFFSET, LON_OFFSET, PRESSURE_OFFSET,
    YEAR_OFFSET,
};
use crate::trajclust_errors::FormatError;

pub(crate) static DIRECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+(BACKWARD|FORWARD)\b(.*)$").expect("direction regex")
});

pub(crate) static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+PRESSURE\b(.*)$").expect("marker regex"));

/// Parse a tdump text, sniffing the id column from the data.
///
/// Errors
/// -----------------
/// * [`FormatError::MissingDirectionLine`], [`FormatError::MissingVariableMarker`] – framing
///   lines not found.
/// * [`FormatError::OriginCountMismatch`] – origin block length differs from the declared count.
/// * [`FormatError::NoDataRows`] – marker not followed by any data.
/// * [`FormatError::UnresolvedIdColumn`] – no candidate column holds exactly `1..=N`.
/// * [`FormatError::MalformedRow`], [`FormatError::UnknownTrajectoryId`],
///   [`FormatError::MalformedOrigin`] – undecodable lines, with their 1-based line number.
pub fn parse(text: &str) -> Result<TdumpDocument, FormatError> {
    parse_with(text, None)
}

/// Parse with an id column already known to the caller (derived documents); the column
/// is still checked against the `1..=N` invariant.
pub(crate) fn parse_with(
    text: &str,
    id_column: Option<usize>,
) -> Result<TdumpDocument, FormatError> {
    let (lines, trailing_newline) = split_lines(text);

    let dir_idx = lines
        .iter()
        .position(|l| DIRECTION_RE.is_match(l))
        .ok_or(FormatError::MissingDirectionLine)?;
    let direction = parse_direction(lines[dir_idx])?;

    let marker_idx = lines[dir_idx + 1..]
        .iter()
        .position(|l| MARKER_RE.is_match(l))
        .map(|i| i + dir_idx + 1)
        .ok_or(FormatError::MissingVariableMarker)?;

    let origin_lines = &lines[dir_idx + 1..marker_idx];
    if origin_lines.len() != direction.count {
        return Err(FormatError::OriginCountMismatch {
            declared: direction.count,
            found: origin_lines.len(),
        });
    }

    let origins = origin_lines
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_origin(raw, i + 1, dir_idx + i + 2))
        .collect::<Result<Vec<_>, _>>()?;

    let marker = parse_marker(lines[marker_idx])?;

    let data_lines = &lines[marker_idx + 1..];
    if data_lines.iter().all(|l| l.trim().is_empty()) {
        return Err(FormatError::NoDataRows);
    }

    let n = origins.len();
    let id_col = match id_column {
        Some(col) => confirm_id_column(data_lines.iter().copied(), n, col)?,
        None => resolve_id_column(data_lines.iter().copied(), n)?,
    };
    let layout = ColumnLayout::new(id_col, marker.names.clone());

    let mut rows = Vec::with_capacity(data_lines.len());
    let mut samples: Vec<Vec<TrajectoryPoint>> = vec![Vec::new(); n];
    for (k, raw) in data_lines.iter().enumerate() {
        let line_number = marker_idx + k + 2;
        if raw.trim().is_empty() {
            rows.push(DataRow {
                raw: raw.to_string(),
                line_number,
                fields: None,
            });
            continue;
        }
        let fields = parse_row(raw, &layout, line_number, n)?;
        samples[fields.trajectory_id - 1].push(fields.point.clone());
        rows.push(DataRow {
            raw: raw.to_string(),
            line_number,
            fields: Some(fields),
        });
    }

    let trajectories = samples
        .into_iter()
        .enumerate()
        .map(|(i, points)| Trajectory::new(i + 1, points))
        .collect();

    Ok(TdumpDocument {
        header: lines[..dir_idx].iter().map(|l| l.to_string()).collect(),
        direction,
        origins,
        marker,
        rows,
        layout,
        trajectories,
        trailing_newline,
        source: None,
    })
}

/// Split on `\n` only, keeping any `\r` inside the line so that CRLF files round-trip.
pub(crate) fn split_lines(text: &str) -> (Vec<&str>, bool) {
    let trailing = text.ends_with('\n');
    let body = if trailing {
        &text[..text.len() - 1]
    } else {
        text
    };
    (body.split('\n').collect(), trailing)
}

fn parse_direction(raw: &str) -> Result<DirectionLine, FormatError> {
    let caps = DIRECTION_RE
        .captures(raw)
        .ok_or(FormatError::MissingDirectionLine)?;
    let count = caps[1]
        .parse::<usize>()
        .map_err(|_| FormatError::MissingDirectionLine)?;
    let direction = match &caps[2] {
        "FORWARD" => Direction::Forward,
        _ => Direction::Backward,
    };
    Ok(DirectionLine {
        raw: raw.to_string(),
        count,
        direction,
        vertical_method: caps[3].trim().to_string(),
    })
}

fn parse_marker(raw: &str) -> Result<VariableMarker, FormatError> {
    let caps = MARKER_RE
        .captures(raw)
        .ok_or(FormatError::MissingVariableMarker)?;
    let count = caps[1]
        .parse::<usize>()
        .map_err(|_| FormatError::MissingVariableMarker)?;
    let names = std::iter::once("PRESSURE".to_string())
        .chain(caps[2].split_whitespace().map(str::to_string))
        .collect();
    Ok(VariableMarker {
        raw: raw.to_string(),
        count,
        names,
    })
}

/// Origin lines are `[id] yr mo dy hr lat lon height`.
fn parse_origin(raw: &str, position: usize, line: usize) -> Result<OriginRecord, FormatError> {
    let malformed = |reason: String| FormatError::MalformedOrigin { line, reason };

    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < 7 {
        return Err(malformed(format!(
            "expected at least 7 fields, found {}",
            tokens.len()
        )));
    }
    let (prefix, coords) = tokens.split_at(tokens.len() - 3);
    let (id, explicit_id, time) = match prefix.len() {
        4 => (position, false, prefix),
        5 => {
            let id = prefix[0]
                .parse::<usize>()
                .map_err(|_| malformed(format!("invalid origin id '{}'", prefix[0])))?;
            (id, true, &prefix[1..])
        }
        n => return Err(malformed(format!("unexpected {n} time fields"))),
    };

    let int = |s: &str| -> Result<i64, FormatError> {
        parse_int(s).ok_or_else(|| malformed(format!("invalid integer '{s}'")))
    };
    let float = |s: &str| -> Result<f64, FormatError> {
        s.parse::<f64>()
            .map_err(|_| malformed(format!("invalid number '{s}'")))
    };

    let narrow = |v: i64, what: &str| -> Result<u8, FormatError> {
        u8::try_from(v).map_err(|_| malformed(format!("{what} out of range: {v}")))
    };

    Ok(OriginRecord {
        raw: raw.to_string(),
        id,
        explicit_id,
        year: u32::try_from(int(time[0])?)
            .map_err(|_| malformed(format!("invalid year '{}'", time[0])))?,
        month: narrow(int(time[1])?, "month")?,
        day: narrow(int(time[2])?, "day")?,
        hour: narrow(int(time[3])?, "hour")?,
        latitude: float(coords[0])?,
        longitude: float(coords[1])?,
        height: float(coords[2])?,
    })
}

fn parse_row(
    raw: &str,
    layout: &ColumnLayout,
    line: usize,
    origins: usize,
) -> Result<RowFields, FormatError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < layout.min_tokens() {
        return Err(FormatError::MalformedRow {
            line,
            reason: format!(
                "expected at least {} fields, found {}",
                layout.min_tokens(),
                tokens.len()
            ),
        });
    }

    let c = layout.id_column();
    let bad = |idx: usize| FormatError::MalformedRow {
        line,
        reason: format!("invalid numeric field #{} '{}'", idx + 1, tokens[idx]),
    };
    let int = |idx: usize| parse_int(tokens[idx]).ok_or_else(|| bad(idx));
    let float = |idx: usize| tokens[idx].parse::<f64>().map_err(|_| bad(idx));

    let id = tokens[c].parse::<usize>().map_err(|_| bad(c))?;
    if id == 0 || id > origins {
        return Err(FormatError::UnknownTrajectoryId { line, id, origins });
    }

    let calendar = [
        int(c + YEAR_OFFSET)?,
        int(c + YEAR_OFFSET + 1)?,
        int(c + YEAR_OFFSET + 2)?,
        int(c + YEAR_OFFSET + 3)?,
        int(c + YEAR_OFFSET + 4)?,
    ];

    let extra_fields = (layout.extra_column(0)..tokens.len())
        .map(|i| float(i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RowFields {
        trajectory_id: id,
        grid: int(c + GRID_OFFSET)?,
        calendar,
        forecast_hour: int(c + FORECAST_HOUR_OFFSET)?,
        point: TrajectoryPoint {
            lag_hour: float(c + LAG_OFFSET)?.round() as i32,
            latitude: float(c + LAT_OFFSET)?,
            longitude: float(c + LON_OFFSET)?,
            pressure_or_height: float(c + PRESSURE_OFFSET)?,
            extra_fields,
        },
    })
}

/// Integer fields are usually written as `I6` but some generations print `0.0`.
pub(crate) fn parse_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

#[cfg(test)]
mod reader_test {
    use super::*;
    use crate::tdump::Direction;

    const TWO_ORIGINS: &str = "     1     1
    GDAS    95     1    15     0     0
     2 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
    95     1    15    18   41.000  -91.000    500.0
     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
     2     1    95     1    15    18     0     0     0.0   41.000  -91.000    500.0    948.0
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0
     2     1    95     1    15    17     0     0    -1.0   41.100  -91.200    505.0    949.0
";

    #[test]
    fn test_parse_structure() {
        let doc = parse(TWO_ORIGINS).unwrap();
        assert_eq!(doc.origin_count(), 2);
        assert_eq!(doc.direction().direction(), Direction::Backward);
        assert_eq!(doc.direction().vertical_method(), "OMEGA");
        assert_eq!(doc.marker().names(), &["PRESSURE".to_string()]);
        assert_eq!(doc.layout().id_column(), 0);
        assert_eq!(doc.format_version(), Some((1, 1)));
        assert_eq!(doc.grid_ids(), vec!["GDAS"]);

        let t2 = doc.trajectory(2).unwrap();
        assert_eq!(t2.len(), 2);
        assert_eq!(t2.points()[1].lag_hour, -1);
        assert_eq!(t2.points()[1].latitude, 41.1);
        assert_eq!(t2.points()[1].extra_fields, vec![949.0]);

        let origin = &doc.origins()[1];
        assert!(!origin.has_explicit_id());
        assert_eq!(origin.id(), 2);
        assert_eq!(origin.release_year(), 1995);
        assert_eq!(origin.latitude(), 41.0);
    }

    #[test]
    fn test_missing_direction_line() {
        let text = TWO_ORIGINS.replace("BACKWARD", "SIDEWAYS");
        assert_eq!(parse(&text), Err(FormatError::MissingDirectionLine));
    }

    #[test]
    fn test_missing_marker() {
        let text = TWO_ORIGINS.replace("PRESSURE", "TEMPERATURE");
        assert_eq!(parse(&text), Err(FormatError::MissingVariableMarker));
    }

    #[test]
    fn test_origin_count_mismatch() {
        let text = TWO_ORIGINS.replace("     2 BACKWARD", "     3 BACKWARD");
        assert_eq!(
            parse(&text),
            Err(FormatError::OriginCountMismatch {
                declared: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let text = TWO_ORIGINS.replace("41.100", "4x.100");
        assert!(matches!(
            parse(&text),
            Err(FormatError::MalformedRow { line: 10, .. })
        ));
    }

    #[test]
    fn test_explicit_origin_id() {
        let text = "     1     1
     1 FORWARD  OMEGA
     1    95     1    15    18   40.000  -90.000    500.0
     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
";
        let doc = parse(text).unwrap();
        assert!(doc.origins()[0].has_explicit_id());
        assert_eq!(doc.direction().direction(), Direction::Forward);
    }

    #[test]
    fn test_parse_int_accepts_float_integers() {
        assert_eq!(parse_int("18"), Some(18));
        assert_eq!(parse_int("0.0"), Some(0));
        assert_eq!(parse_int("0.5"), None);
        assert_eq!(parse_int("x"), None);
    }
}
