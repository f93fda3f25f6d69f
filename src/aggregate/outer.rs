//! Outer pass: archetypes across months.
//!
//! The meta-means of every month (`*_META/C<m>_<K>_META_mean.tdump`) are clustered
//! hierarchically on the shape-aware distance. The cluster count is either fixed
//! ([`AggregateParams::archetypes`]) or taken from the partitional silhouette selection
//! over the same set. Labels are written as a CSV with the header `file,path,cluster`.
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AggregateParams, Member};
use crate::cluster::ClusterEngine;
use crate::tdump::Trajectory;
use crate::trajclust_errors::{DataError, TrajclustError};

/// One row of the label CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub file: String,
    pub path: String,
    pub cluster: usize,
}

/// Every `*_META/*_META_mean.tdump` directly under `root`, sorted by path.
pub fn collect_meta_means(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, TrajclustError> {
    let mut found = Vec::new();
    for entry in root.read_dir_utf8()? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || !entry.file_name().ends_with("_META") {
            continue;
        }
        for file in entry.path().read_dir_utf8()? {
            let file = file?;
            if file.file_name().ends_with("_META_mean.tdump") {
                found.push(file.path().to_path_buf());
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Cluster meta-means into archetypes and write the label CSV.
///
/// Arguments
/// -----------------
/// * `meta_means` – Mean trajectory files; unreadable ones are logged and left out.
/// * `csv_path` – Destination of the `file,path,cluster` table.
///
/// Return
/// ----------
/// * One record per clustered file, in input order.
/// * [`DataError::Misaligned`] when the means do not share one lag sequence.
pub fn cluster_archetypes(
    meta_means: &[Utf8PathBuf],
    csv_path: &Utf8Path,
    engine: &ClusterEngine,
    params: &AggregateParams,
) -> Result<Vec<LabelRecord>, TrajclustError> {
    let mut paths = Vec::new();
    let mut trajectories: Vec<Trajectory> = Vec::new();
    for path in meta_means {
        match Member::load(path) {
            Ok(member) => match member.trajectory() {
                Some(t) => {
                    trajectories.push(t.clone());
                    paths.push(path.clone());
                }
                None => warn!(path = %path, "meta-mean without trajectory skipped"),
            },
            Err(error) => warn!(path = %path, %error, "meta-mean skipped"),
        }
    }
    if trajectories.is_empty() {
        return Err(DataError::InsufficientSamples {
            needed: 1,
            available: 0,
        }
        .into());
    }

    let k = match params.archetypes {
        Some(k) => k.min(trajectories.len()),
        None => engine.partitional_trajectories(&trajectories)?.k,
    };
    let labels = engine.hierarchical(&trajectories, k)?;
    info!(means = trajectories.len(), k, "outer archetype pass");

    let records: Vec<LabelRecord> = paths
        .iter()
        .zip(labels)
        .map(|(path, cluster)| LabelRecord {
            file: path.file_name().unwrap_or_default().to_string(),
            path: path.to_string(),
            cluster,
        })
        .collect();

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(csv_path)?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(records)
}

#[cfg(test)]
mod outer_test {
    use super::*;

    fn write_meta_mean(root: &Utf8Path, month: &str, m: usize, lat: f64) -> Utf8PathBuf {
        let mut text = format!(
            "     1     1\n    GDAS    95     1    15     0     0\n     1 BACKWARD OMEGA\n    95     1    15    18 {lat:8.3}  100.000    500.0\n     1 PRESSURE\n"
        );
        for h in 0..4 {
            text.push_str(&format!(
                "     1     1    95     1    15    18     0   -88 {:7.1} {lat:8.3}  100.000    500.0      0.0\n",
                -(h as f64)
            ));
        }
        let dir = root.join(format!("{month}_META"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("C{m}_2_META_mean.tdump"));
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_archetypes_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        write_meta_mean(root, "01", 1, 10.0);
        write_meta_mean(root, "01", 2, 60.0);
        write_meta_mean(root, "02", 1, 11.0);
        write_meta_mean(root, "02", 2, 61.0);
        std::fs::write(root.join("01_META/C1_2_M_mean"), "# META_CLUSTER 1  (K=2)\n").unwrap();

        let means = collect_meta_means(root).unwrap();
        assert_eq!(means.len(), 4);

        let params = AggregateParams::builder()
            .month_tag("01")
            .archetypes(2)
            .build()
            .unwrap();
        let csv_path = root.join("labels.csv");
        let records =
            cluster_archetypes(&means, &csv_path, &ClusterEngine::default(), &params).unwrap();
        let clusters: Vec<usize> = records.iter().map(|r| r.cluster).collect();
        assert_eq!(clusters, vec![1, 2, 1, 2]);
        assert_eq!(records[0].file, "C1_2_META_mean.tdump");

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            &csv::StringRecord::from(vec!["file", "path", "cluster"])
        );
        let back: Vec<LabelRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back, records);
    }

    #[test]
    fn test_auto_archetypes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        let means = vec![
            write_meta_mean(root, "01", 1, 10.0),
            write_meta_mean(root, "01", 2, 60.0),
            write_meta_mean(root, "02", 1, 10.5),
        ];
        let params = AggregateParams::builder().month_tag("01").build().unwrap();
        let records = cluster_archetypes(
            &means,
            &root.join("out/labels.csv"),
            &ClusterEngine::default(),
            &params,
        )
        .unwrap();
        assert_eq!(records.iter().map(|r| r.cluster).collect::<Vec<_>>(), vec![1, 2, 1]);
    }
}
