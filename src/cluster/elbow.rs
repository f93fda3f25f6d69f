//! Elbow selection of `K` from the external cluster tool's diagnostic table.
//!
//! The table lists, for decreasing cluster counts, the percent change in total spatial
//! variance caused by merging down to that count:
//!
//! ```text
//!   1   4   20.0
//!   2   3   60.0
//!   3   2   95.0
//!   4   1   98.0
//! ```
//!
//! The selected `K` is that of the first row (after the first) whose percent change is
//! at least `abs_pct` and exceeds the previous row's by at least `jump_pct`; without such
//! a row, the row of largest percent change wins. The result is never below `min_k`.
use crate::trajclust_errors::DataError;

/// One `(index, K, percent change)` row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticRow {
    pub index: usize,
    pub k: usize,
    pub pct: f64,
}

fn integer(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().or_else(|| {
        token
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as usize)
    })
}

/// Parse the whitespace-separated three-column table; blank and `#` lines are ignored,
/// columns past the third are ignored.
pub fn parse_diagnostic_table(text: &str) -> Result<Vec<DiagnosticRow>, DataError> {
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let bad = |what: &str| {
            DataError::InvalidDiagnosticTable(format!("line {}: {what} in '{line}'", n + 1))
        };
        if tokens.len() < 3 {
            return Err(bad("expected 3 columns"));
        }
        rows.push(DiagnosticRow {
            index: integer(tokens[0]).ok_or_else(|| bad("invalid index"))?,
            k: integer(tokens[1]).ok_or_else(|| bad("invalid cluster count"))?,
            pct: tokens[2]
                .parse()
                .map_err(|_| bad("invalid percent change"))?,
        });
    }
    if rows.is_empty() {
        return Err(DataError::InvalidDiagnosticTable("no rows".into()));
    }
    Ok(rows)
}

/// Pick `K` from diagnostic rows.
pub fn select_elbow_k(
    rows: &[DiagnosticRow],
    abs_pct: f64,
    jump_pct: f64,
    min_k: usize,
) -> Result<usize, DataError> {
    let first = rows
        .first()
        .ok_or_else(|| DataError::InvalidDiagnosticTable("no rows".into()))?;

    let elbow = rows
        .windows(2)
        .find(|w| w[1].pct >= abs_pct && w[1].pct - w[0].pct >= jump_pct)
        .map(|w| w[1].k);

    let k = elbow.unwrap_or_else(|| {
        rows.iter()
            .fold(first, |best, r| if r.pct > best.pct { r } else { best })
            .k
    });
    Ok(k.max(min_k))
}
