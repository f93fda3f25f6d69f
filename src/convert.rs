//! # Diagnostic stripping
//!
//! The legacy cluster tool only reads the plain layout whose marker line is
//! `     1 PRESSURE`. Trajectory runs that also dumped diagnostic variables (for example
//! `3 PRESSURE MIXDEPTH SPCHUMID`) are converted before being handed over:
//!
//! * the marker becomes `     1 PRESSURE`;
//! * every origin height is set to the height of the first data row;
//! * every data row loses the variables after `PRESSURE`.
//!
//! Converted copies are written next to the source as `<name>_tmp`, and the
//! `TRAJ.INP.C*` member lists of a cluster run are rewritten to point at them
//! ([`rewrite_member_lists`]).
use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::batch::{BatchReport, FileOutcome};
use crate::manifest::ProcessedManifest;
use crate::tdump::reader::{parse_with, split_lines};
use crate::tdump::writer::{assemble, replace_token, truncate_tokens};
use crate::tdump::TdumpDocument;
use crate::trajclust_errors::{FormatError, TrajclustError};

/// Suffix of converted copies.
pub const CONVERTED_SUFFIX: &str = "_tmp";

/// Prefix of the member lists of a cluster run.
pub const MEMBER_LIST_PREFIX: &str = "TRAJ.INP.C";

fn keep_cr(original: &str, line: String) -> String {
    if original.ends_with('\r') {
        line + "\r"
    } else {
        line
    }
}

/// Rewrite a document into the plain `1 PRESSURE` layout.
///
/// Return
/// ----------
/// * The converted document; a document already in the plain layout only has its
///   origin heights aligned on the first data row.
/// * [`FormatError::NoDataRows`] when the document has no decodable row.
pub fn strip_diagnostics(doc: &TdumpDocument) -> Result<TdumpDocument, TrajclustError> {
    let layout = doc.layout();
    let first_row = doc
        .rows()
        .iter()
        .find(|r| r.fields().is_some())
        .ok_or(FormatError::NoDataRows)?;
    let start_height = first_row
        .raw()
        .split_whitespace()
        .nth(layout.pressure_column())
        .ok_or(FormatError::NoDataRows)?
        .to_string();

    let marker = keep_cr(doc.marker().raw(), format!("{:6} PRESSURE", 1));
    let origins: Vec<String> = doc
        .origins()
        .iter()
        .map(|o| {
            let last = o.raw().split_whitespace().count().saturating_sub(1);
            replace_token(o.raw(), last, &start_height).unwrap_or_else(|| o.raw().to_string())
        })
        .collect();
    let keep = layout.extra_column(0) + 1;
    let rows: Vec<String> = doc
        .rows()
        .iter()
        .map(|r| match r.fields() {
            Some(_) => truncate_tokens(r.raw(), keep),
            None => r.raw().to_string(),
        })
        .collect();

    let lines = doc
        .header_lines()
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(doc.direction().raw()))
        .chain(origins.iter().map(String::as_str))
        .chain(std::iter::once(marker.as_str()))
        .chain(rows.iter().map(String::as_str));
    let text = assemble(lines, doc.has_trailing_newline());
    Ok(parse_with(&text, Some(layout.id_column()))?)
}

/// Convert one file, writing `<name>_tmp` next to it.
pub fn convert_file(path: &Utf8Path) -> Result<Utf8PathBuf, TrajclustError> {
    let doc = TdumpDocument::from_file(path)?;
    let converted = strip_diagnostics(&doc)?;
    let name = path
        .file_name()
        .ok_or_else(|| TrajclustError::Utf8PathError(format!("{path} has no file name")))?;
    let out = path.with_file_name(format!("{name}{CONVERTED_SUFFIX}"));
    converted.write_to(&out)?;
    Ok(out)
}

/// Rewrite every `TRAJ.INP.C*` list of `dir` to point at converted copies.
///
/// Each distinct entry is converted once; the manifest maps list entries to their
/// replacement and is consulted before converting, so entries converted by an earlier
/// run are replaced without touching the trajectory again. Relative entries are resolved
/// against `dir` and stay relative in the rewritten list. Entries that fail to convert
/// are logged and kept unchanged, blank lines are kept as they are.
///
/// Return
/// ----------
/// * One outcome per list file: processed when at least one entry was replaced.
/// * [`TrajclustError::EmptyBatch`] when `dir` holds no member list.
pub fn rewrite_member_lists(
    dir: &Utf8Path,
    manifest: &mut ProcessedManifest,
) -> Result<BatchReport, TrajclustError> {
    let mut lists: Vec<Utf8PathBuf> = dir
        .read_dir_utf8()?
        .filter_map(Result::ok)
        .filter(|e| e.file_name().starts_with(MEMBER_LIST_PREFIX))
        .map(|e| e.path().to_path_buf())
        .collect();
    lists.sort();
    if lists.is_empty() {
        return Err(TrajclustError::EmptyBatch(format!(
            "no {MEMBER_LIST_PREFIX}* list in {dir}"
        )));
    }

    let mut failed: BTreeSet<String> = BTreeSet::new();
    let mut report = BatchReport::new("convert");
    for list in lists {
        let text = match std::fs::read_to_string(&list) {
            Ok(t) => t,
            Err(e) => {
                report.record(list, FileOutcome::IoFailure(e.to_string()));
                continue;
            }
        };
        let (lines, trailing_newline) = split_lines(&text);

        let mut replaced = 0usize;
        let mut rewritten = Vec::with_capacity(lines.len());
        for line in lines {
            let entry = line.trim();
            if entry.is_empty() || entry.ends_with(CONVERTED_SUFFIX) || failed.contains(entry) {
                rewritten.push(line.to_string());
                continue;
            }
            if let Some(new_entry) = manifest.get(entry) {
                rewritten.push(keep_cr(line, new_entry.to_string()));
                replaced += 1;
                continue;
            }

            let source = Utf8Path::new(entry);
            let resolved = if source.is_absolute() {
                source.to_path_buf()
            } else {
                dir.join(source)
            };
            match convert_file(&resolved) {
                Ok(out) => {
                    let new_entry = if source.is_absolute() {
                        out.to_string()
                    } else {
                        format!("{entry}{CONVERTED_SUFFIX}")
                    };
                    manifest.record(entry, new_entry.clone());
                    rewritten.push(keep_cr(line, new_entry));
                    replaced += 1;
                }
                Err(error) => {
                    warn!(list = %list, entry, %error, "member not converted");
                    failed.insert(entry.to_string());
                    rewritten.push(line.to_string());
                }
            }
        }

        if replaced == 0 {
            report.record(list, FileOutcome::Skipped("no entry converted".into()));
            continue;
        }
        let body = assemble(rewritten.iter().map(String::as_str), trailing_newline);
        match std::fs::write(&list, body) {
            Ok(()) => {
                let outputs = vec![list.clone()];
                report.record(list, FileOutcome::Processed(outputs));
            }
            Err(e) => report.record(list, FileOutcome::IoFailure(e.to_string())),
        }
    }
    info!("{report}");
    Ok(report)
}

#[cfg(test)]
mod convert_test {
    use super::*;

    const EXTENDED: &str = "     1     1
    GDAS    95     1    15     0     0
     1 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000   1000.0
     3 PRESSURE MIXDEPTH SPCHUMID
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0   1200.0      8.1
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0   1180.0      8.0
";

    #[test]
    fn test_strip_diagnostics() {
        let doc = TdumpDocument::parse(EXTENDED).unwrap();
        let plain = strip_diagnostics(&doc).unwrap();
        assert_eq!(plain.marker().raw(), "     1 PRESSURE");
        assert_eq!(
            plain.origins()[0].raw(),
            "    95     1    15    18   40.000  -90.000    500.0"
        );
        assert_eq!(
            plain.rows()[1].raw(),
            "     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0"
        );
        assert_eq!(plain.trajectories()[0].points()[0].extra_fields, vec![950.0]);
        assert!(plain.has_trailing_newline());
    }

    #[test]
    fn test_rewrite_member_lists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::write(dir.join("a.tdump"), EXTENDED).unwrap();
        std::fs::write(dir.join("b.tdump"), "garbage\n").unwrap();
        std::fs::write(dir.join("TRAJ.INP.C1"), "a.tdump\n\nb.tdump\n").unwrap();
        std::fs::write(dir.join("TRAJ.INP.C2"), "a.tdump\n").unwrap();

        let mut manifest = ProcessedManifest::new();
        let report = rewrite_member_lists(dir, &mut manifest).unwrap();
        assert_eq!(report.processed_count(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.join("TRAJ.INP.C1")).unwrap(),
            "a.tdump_tmp\n\nb.tdump\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("TRAJ.INP.C2")).unwrap(),
            "a.tdump_tmp\n"
        );
        assert!(dir.join("a.tdump_tmp").is_file());
        assert!(!dir.join("b.tdump_tmp").exists());
        assert_eq!(manifest.get("a.tdump"), Some("a.tdump_tmp"));

        // a second run finds nothing left to convert
        let again = rewrite_member_lists(dir, &mut manifest).unwrap();
        assert_eq!(again.processed_count(), 0);
    }

    #[test]
    fn test_no_member_list() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        assert!(matches!(
            rewrite_member_lists(dir, &mut ProcessedManifest::new()),
            Err(TrajclustError::EmptyBatch(_))
        ));
    }
}
