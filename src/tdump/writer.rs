//! # tdump writer
//!
//! Byte-faithful serialization of parsed documents and the fixed-width helpers used to
//! derive new documents from existing lines.
//!
//! Derived documents (split outputs, converted files, mean trajectories) are never built
//! by re-printing every field: the original lines are copied and only the tokens that
//! change are replaced, right-justified in the width they already occupied. Lines the
//! crate has to invent from scratch (synthesized mean rows) use the canonical layout of
//! [`format_data_row`].
use itertools::Itertools;

use super::{RowFields, TdumpDocument};

/// Serialize a document: every retained line in order, joined by `\n`, with a final
/// newline only when the parsed input had one.
///
/// Any carriage returns were kept inside the raw lines, so a parsed document serializes
/// to exactly its input text.
pub fn serialize(doc: &TdumpDocument) -> String {
    let lines = doc
        .header
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(doc.direction.raw.as_str()))
        .chain(doc.origins.iter().map(|o| o.raw.as_str()))
        .chain(std::iter::once(doc.marker.raw.as_str()))
        .chain(doc.rows.iter().map(|r| r.raw.as_str()));
    assemble(lines, doc.trailing_newline)
}

/// Join lines with `\n`, optionally terminating the text with a newline.
pub(crate) fn assemble<'a, I>(lines: I, trailing_newline: bool) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut text = lines.into_iter().join("\n");
    if trailing_newline {
        text.push('\n');
    }
    text
}

/// Byte spans `(start, end)` of the whitespace-separated tokens of `line`.
fn token_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

/// Replace the `index`-th whitespace token of `line` with `new_text`, right-justified in
/// the width the old token occupied together with its leading whitespace.
///
/// At least one blank is kept between a replaced token and its predecessor; when
/// `new_text` is too wide for the field the line grows instead of fusing two tokens.
/// The first token may consume all of its leading whitespace.
///
/// Return
/// ----------
/// * The rewritten line, or `None` when `line` has fewer than `index + 1` tokens.
pub fn replace_token(line: &str, index: usize, new_text: &str) -> Option<String> {
    let spans = token_spans(line);
    let &(_, end) = spans.get(index)?;
    let field_start = if index == 0 { 0 } else { spans[index - 1].1 };
    let width = end - field_start;
    let min_gap = usize::from(index > 0);

    let field = if new_text.len() + min_gap <= width {
        format!("{new_text:>width$}")
    } else {
        format!("{}{new_text}", " ".repeat(min_gap))
    };

    Some(format!("{}{}{}", &line[..field_start], field, &line[end..]))
}

/// Keep only the first `keep` tokens of `line`, with their original spacing.
///
/// A trailing carriage return is preserved.
pub fn truncate_tokens(line: &str, keep: usize) -> String {
    let cr = if line.ends_with('\r') { "\r" } else { "" };
    if keep == 0 {
        return cr.to_string();
    }
    match token_spans(line).get(keep - 1) {
        Some(&(_, end)) => format!("{}{cr}", &line[..end]),
        None => line.to_string(),
    }
}

/// Rewrite the leading integer of a line (origin count, direction count, marker count).
pub fn renumber_leading(line: &str, value: usize) -> Option<String> {
    replace_token(line, 0, &value.to_string())
}

/// Format `value` with as many decimals as `template` shows.
///
/// ```
/// use trajclust::tdump::writer::format_like;
/// assert_eq!(format_like("40.000", 12.34567), "12.346");
/// assert_eq!(format_like("500.0", 12.0), "12.0");
/// assert_eq!(format_like("18", 6.2), "6");
/// ```
pub fn format_like(template: &str, value: f64) -> String {
    match template.split_once('.') {
        Some((_, decimals)) => format!("{value:.*}", decimals.len()),
        None => format!("{}", value.round() as i64),
    }
}

/// Canonical data row: eight `I6` integers, lag `F8.1`, latitude and longitude `F9.3`,
/// pressure/height and every diagnostic variable `F9.1`.
pub fn format_data_row(fields: &RowFields) -> String {
    let mut row = String::with_capacity(128);
    let ints = std::iter::once(fields.trajectory_id as i64)
        .chain(std::iter::once(fields.grid))
        .chain(fields.calendar.iter().copied())
        .chain(std::iter::once(fields.forecast_hour));
    for v in ints {
        row.push_str(&format!("{v:6}"));
    }
    let p = &fields.point;
    row.push_str(&format!(
        "{:8.1}{:9.3}{:9.3}{:9.1}",
        p.lag_hour as f64, p.latitude, p.longitude, p.pressure_or_height
    ));
    for v in &p.extra_fields {
        row.push_str(&format!("{v:9.1}"));
    }
    row
}

#[cfg(test)]
mod writer_test {
    use super::*;
    use crate::tdump::{reader::parse, TrajectoryPoint};

    const DOC: &str = "     1     1
    GDAS    95     1    15     0     0
     1 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0";

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let doc = parse(DOC).unwrap();
        assert!(!doc.has_trailing_newline());
        assert_eq!(doc.serialize(), DOC);
    }

    #[test]
    fn test_round_trip_crlf() {
        let text = format!("{}\r\n", DOC.replace('\n', "\r\n"));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.serialize(), text);
        assert_eq!(doc.trajectory(1).unwrap().len(), 2);
    }

    #[test]
    fn test_replace_token_keeps_width() {
        let line = "     2     1    95";
        assert_eq!(replace_token(line, 0, "1").unwrap(), "     1     1    95");
        assert_eq!(replace_token(line, 2, "2019").unwrap(), "     2     1  2019");
        assert_eq!(replace_token(line, 1, "1234567").unwrap(), "     2 1234567    95");
        assert_eq!(replace_token(line, 3, "x"), None);
    }

    #[test]
    fn test_replace_token_keeps_separator() {
        assert_eq!(replace_token("1 2", 1, "33").unwrap(), "1 33");
        assert_eq!(replace_token("12 3", 0, "456").unwrap(), "456 3");
    }

    #[test]
    fn test_truncate_tokens() {
        assert_eq!(truncate_tokens("  1  2   3  4", 2), "  1  2");
        assert_eq!(truncate_tokens("  1  2   3  4\r", 3), "  1  2   3\r");
        assert_eq!(truncate_tokens("1 2", 5), "1 2");
        assert_eq!(truncate_tokens("1 2", 0), "");
    }

    #[test]
    fn test_format_data_row() {
        let fields = RowFields {
            trajectory_id: 1,
            grid: 1,
            calendar: [95, 1, 15, 18, 0],
            forecast_hour: -88,
            point: TrajectoryPoint::new(-3, 40.1234, -90.5, 850.04).with_extras(vec![0.0]),
        };
        assert_eq!(
            format_data_row(&fields),
            "     1     1    95     1    15    18     0   -88    -3.0   40.123  -90.500    850.0      0.0"
        );
    }
}
