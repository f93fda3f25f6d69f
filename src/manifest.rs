//! # Processed manifest and INFILE
//!
//! Two small line-oriented ledgers exchanged with the outside world.
//!
//! ## Processed manifest
//! -----------------
//! A [`ProcessedManifest`] records which sources a sweep has already handled, so that an
//! interrupted run can be resumed without repeating work. It is an explicit value passed
//! to the sweeps (`&mut ProcessedManifest`), loaded from and persisted to disk by the
//! caller.
//!
//! On disk, one entry per line:
//!
//! ```text
//! /data/raw/2019/tdump_19011518 | /data/split/2019
//! /data/P3/TRAJ.INP.C1 | /data/P3/TRAJ.INP.C1
//! ```
//!
//! A line without a ` | ` separator is a key with an empty value. Merging two manifests
//! is a union in which entries of the later one win.
//!
//! ## INFILE
//! -----------------
//! The input list of the external cluster tool: ASCII, one absolute path per line, no
//! header. See [`write_infile`].
use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::trajclust_errors::TrajclustError;

const SEPARATOR: &str = " | ";

/// Ledger of already-processed sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedManifest {
    entries: BTreeMap<String, String>,
}

impl ProcessedManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `key | value` text form.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| match l.split_once(SEPARATOR) {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (l.to_string(), String::new()),
            })
            .collect();
        Self { entries }
    }

    /// Load a manifest from disk; a missing file yields an empty manifest.
    pub fn load(path: &Utf8Path) -> Result<Self, TrajclustError> {
        if !path.exists() {
            debug!(path = %path, "no processed manifest yet");
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Write the manifest through a sibling temporary file renamed into place, so that
    /// an interrupted write never leaves a truncated ledger behind.
    pub fn persist(&self, path: &Utf8Path) -> Result<(), TrajclustError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = Utf8PathBuf::from(format!("{path}.partial"));
        std::fs::write(&tmp, self.to_string())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Record `key`, replacing any previous value.
    pub fn record(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Union with `other`; on conflicting keys the value from `other` is kept.
    pub fn merge(&mut self, other: ProcessedManifest) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ProcessedManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            if v.is_empty() {
                writeln!(f, "{k}")?;
            } else {
                writeln!(f, "{k}{SEPARATOR}{v}")?;
            }
        }
        Ok(())
    }
}

/// Write the INFILE consumed by the external cluster tool.
///
/// Arguments
/// -----------------
/// * `path` – Destination file; parent directories are created.
/// * `entries` – Trajectory files, written in the given order.
///
/// Return
/// ----------
/// * [`TrajclustError::InvalidParameter`] if a path is not ASCII (the consumer cannot read it).
/// * [`TrajclustError::EmptyBatch`] if `entries` is empty; no file is written then.
pub fn write_infile(path: &Utf8Path, entries: &[Utf8PathBuf]) -> Result<(), TrajclustError> {
    if entries.is_empty() {
        return Err(TrajclustError::EmptyBatch(format!(
            "no trajectory retained for {path}"
        )));
    }
    if let Some(bad) = entries.iter().find(|p| !p.as_str().is_ascii()) {
        return Err(TrajclustError::InvalidParameter(format!(
            "INFILE entries must be ASCII: {bad}"
        )));
    }

    let mut text = String::with_capacity(entries.len() * 64);
    for entry in entries {
        text.push_str(entry.as_str());
        text.push('\n');
    }
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod manifest_test {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let m = ProcessedManifest::parse("a | 1\n\n  b | 2  \nc\n");
        assert_eq!(m.len(), 3);
        assert_eq!(m.get("b"), Some("2"));
        assert_eq!(m.get("c"), Some(""));
        assert_eq!(m.to_string(), "a | 1\nb | 2\nc\n");
    }

    #[test]
    fn test_merge_later_wins() {
        let mut first = ProcessedManifest::parse("a | old\nb | keep\n");
        let second = ProcessedManifest::parse("a | new\nc | added\n");
        first.merge(second);
        assert_eq!(first.get("a"), Some("new"));
        assert_eq!(first.get("b"), Some("keep"));
        assert!(first.contains("c"));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("state/processed.txt")).unwrap();

        assert!(ProcessedManifest::load(&path).unwrap().is_empty());

        let mut m = ProcessedManifest::new();
        m.record("/raw/x", "/out/x");
        m.persist(&path).unwrap();
        assert_eq!(ProcessedManifest::load(&path).unwrap(), m);
    }

    #[test]
    fn test_infile_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("INFILE")).unwrap();

        assert!(matches!(
            write_infile(&path, &[]),
            Err(TrajclustError::EmptyBatch(_))
        ));
        assert!(!path.exists());

        assert!(matches!(
            write_infile(&path, &[Utf8PathBuf::from("/data/é")]),
            Err(TrajclustError::InvalidParameter(_))
        ));

        write_infile(
            &path,
            &[Utf8PathBuf::from("/data/a"), Utf8PathBuf::from("/data/b")],
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "/data/a\n/data/b\n");
    }
}
