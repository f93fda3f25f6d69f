//! Per-file column layout.
//!
//! Dataset generations disagree on where the trajectory id sits in a data row: most
//! files put it in the first token, some prepend a running column and push it to the
//! second. Rather than hard-coding an offset, the layout is sniffed from the data itself:
//! a candidate column is accepted only when its values form exactly `{1, …, N}` over a
//! sample of rows, `N` being the number of origin records.
use std::collections::BTreeSet;

use crate::constants::{
    EXTRA_OFFSET, HUMIDITY_NAMES, ID_PROBE_ROWS, LAG_OFFSET, LAT_OFFSET, LON_OFFSET,
    PRESSURE_OFFSET,
};
use crate::trajclust_errors::FormatError;

/// Where each field lives in a data row of one particular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    id_column: usize,
    variables: Vec<String>,
}

impl ColumnLayout {
    pub fn new(id_column: usize, variables: Vec<String>) -> Self {
        Self {
            id_column,
            variables,
        }
    }

    pub fn id_column(&self) -> usize {
        self.id_column
    }

    /// Diagnostic variable names, in marker order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn lag_column(&self) -> usize {
        self.id_column + LAG_OFFSET
    }

    pub fn lat_column(&self) -> usize {
        self.id_column + LAT_OFFSET
    }

    pub fn lon_column(&self) -> usize {
        self.id_column + LON_OFFSET
    }

    pub fn pressure_column(&self) -> usize {
        self.id_column + PRESSURE_OFFSET
    }

    pub fn extra_column(&self, index: usize) -> usize {
        self.id_column + EXTRA_OFFSET + index
    }

    /// Minimal token count of a well-formed data row.
    pub fn min_tokens(&self) -> usize {
        self.pressure_column() + 1
    }

    /// Position of the specific-humidity variable among the extra fields, when the marker
    /// line names one.
    pub fn humidity_extra_index(&self) -> Option<usize> {
        self.variables
            .iter()
            .position(|name| HUMIDITY_NAMES.iter().any(|h| name.eq_ignore_ascii_case(h)))
    }

    /// Token index of specific humidity in a row of `token_count` tokens.
    ///
    /// The header-named position wins; without one the last token is used.
    pub fn humidity_column(&self, token_count: usize) -> usize {
        match self.humidity_extra_index() {
            Some(i) => self.extra_column(i),
            None => token_count.saturating_sub(1),
        }
    }
}

/// Probe the first two columns of the data rows for the trajectory id.
///
/// Arguments
/// -----------------
/// * `rows` – Data lines following the marker (blank lines are ignored).
/// * `origins` – Number of origin records `N` declared by the document.
///
/// Return
/// ----------
/// * The index of the first column (0, then 1) whose values over the first
///   [`ID_PROBE_ROWS`] rows are exactly `{1..=N}`.
/// * [`FormatError::UnresolvedIdColumn`] when neither qualifies.
pub fn resolve_id_column<'a, I>(rows: I, origins: usize) -> Result<usize, FormatError>
where
    I: IntoIterator<Item = &'a str>,
{
    let sample: Vec<Vec<&str>> = rows
        .into_iter()
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .filter(|t| !t.is_empty())
        .take(ID_PROBE_ROWS)
        .collect();

    let expected: BTreeSet<usize> = (1..=origins).collect();

    (0..2)
        .find(|&col| column_ids(&sample, col).is_some_and(|ids| ids == expected))
        .ok_or(FormatError::UnresolvedIdColumn { origins })
}

/// Check that `col` holds exactly `{1..=N}` over the sample; used when the caller already
/// knows the layout (derived documents).
pub(crate) fn confirm_id_column<'a, I>(
    rows: I,
    origins: usize,
    col: usize,
) -> Result<usize, FormatError>
where
    I: IntoIterator<Item = &'a str>,
{
    let sample: Vec<Vec<&str>> = rows
        .into_iter()
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .filter(|t| !t.is_empty())
        .take(ID_PROBE_ROWS)
        .collect();
    let expected: BTreeSet<usize> = (1..=origins).collect();
    match column_ids(&sample, col) {
        Some(ids) if ids == expected => Ok(col),
        _ => Err(FormatError::UnresolvedIdColumn { origins }),
    }
}

fn column_ids(sample: &[Vec<&str>], col: usize) -> Option<BTreeSet<usize>> {
    if sample.is_empty() {
        return None;
    }
    sample
        .iter()
        .map(|tokens| tokens.get(col).and_then(|t| t.parse::<usize>().ok()))
        .collect()
}

#[cfg(test)]
mod layout_test {
    use super::*;

    #[test]
    fn test_id_in_first_column() {
        let rows = [
            "     1     1    95     1    15    18     0     0     0.0",
            "     2     1    95     1    15    18     0     0     0.0",
            "     1     1    95     1    15    17     0     0    -1.0",
            "     2     1    95     1    15    17     0     0    -1.0",
        ];
        assert_eq!(resolve_id_column(rows, 2), Ok(0));
    }

    #[test]
    fn test_id_in_second_column() {
        let rows = [
            "   101     1     1    95     1    15    18     0     0     0.0",
            "   102     2     1    95     1    15    18     0     0     0.0",
            "   103     3     1    95     1    15    18     0     0     0.0",
        ];
        assert_eq!(resolve_id_column(rows, 3), Ok(1));
    }

    #[test]
    fn test_partial_id_set_is_rejected() {
        // only ids 1 and 2 appear while three origins are declared
        let rows = [
            "     1     1    95     1    15    18     0     0     0.0",
            "     2     1    95     1    15    18     0     0     0.0",
        ];
        assert_eq!(
            resolve_id_column(rows, 3),
            Err(FormatError::UnresolvedIdColumn { origins: 3 })
        );
    }

    #[test]
    fn test_humidity_column_resolution() {
        let named = ColumnLayout::new(
            0,
            vec!["PRESSURE".into(), "SPCHUMID".into(), "MIXDEPTH".into()],
        );
        assert_eq!(named.humidity_extra_index(), Some(1));
        assert_eq!(named.humidity_column(15), 13);

        let plain = ColumnLayout::new(1, vec!["PRESSURE".into()]);
        assert_eq!(plain.humidity_extra_index(), None);
        assert_eq!(plain.humidity_column(14), 13);
        assert_eq!(plain.lag_column(), 9);
    }
}
