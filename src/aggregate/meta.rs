//! Level B meta-clustering of per-point cluster means, and Level C averaging of the
//! resulting concatenations.
use std::fmt;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use regex::Regex;
use tracing::{info, warn};

use super::mean::synthesize_mean_of;
use super::{push_section, read_concatenation, AggregateParams, Member};
use crate::batch::BatchReport;
use crate::cluster::ClusterEngine;
use crate::progress::SweepProgress;
use crate::tdump::TdumpDocument;
use crate::trajclust_errors::{DataError, TrajclustError};

/// `C<c>_<K>_mean[.tdump]`; the external cluster tool writes them without extension.
static CLUSTER_MEAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^C(\d+)_(\d+)_mean(?:\.tdump)?$").expect("cluster mean regex")
});

/// `C<m>_<K>_M_mean`
static META_CONCAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^C(\d+)_(\d+)_M_mean$").expect("meta concatenation regex"));

/// One meta-cluster written by [`meta_cluster_month`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetaCluster {
    /// Meta label `1..=k`.
    pub label: usize,
    pub k: usize,
    /// `(point directory, first-level cluster, mean file)` of every member.
    pub members: Vec<(String, usize, Utf8PathBuf)>,
    /// The `C<m>_<K>_M_mean` concatenation.
    pub path: Utf8PathBuf,
}

impl fmt::Display for MetaCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refs = self
            .members
            .iter()
            .map(|(point, c, _)| format!("{point}/C{c}"))
            .join(", ");
        write!(f, "META_CLUSTER {} (K={}): [{refs}]", self.label, self.k)
    }
}

/// Per-point cluster mean files of the month: `root/<month_tag>_P*/C<c>_<K>_mean[.tdump]`,
/// sorted by path, with their point directory name and first-level cluster.
pub fn find_cluster_means(
    root: &Utf8Path,
    params: &AggregateParams,
) -> Result<Vec<(String, usize, Utf8PathBuf)>, TrajclustError> {
    let prefix = format!("{}_P", params.month_tag);
    let mut found = Vec::new();
    for entry in root.read_dir_utf8()? {
        let entry = entry?;
        let point = entry.file_name();
        if !entry.file_type()?.is_dir() || !point.starts_with(&prefix) {
            continue;
        }
        for file in entry.path().read_dir_utf8()? {
            let file = file?;
            if let Some(caps) = CLUSTER_MEAN_RE.captures(file.file_name()) {
                let cluster = caps[1].parse().unwrap_or(0);
                found.push((point.to_string(), cluster, file.path().to_path_buf()));
            }
        }
    }
    found.sort_by(|a, b| a.2.cmp(&b.2));
    Ok(found)
}

/// Level B: re-cluster the month's per-point cluster means.
///
/// Every mean file contributes one feature, the mean latitude and longitude of its
/// trajectory; `K` is chosen by the partitional silhouette selection. Each meta-cluster
/// is written to `root/<month_tag>_META/C<m>_<K>_M_mean`: a `# META_CLUSTER m  (K=k)`
/// banner followed by the member documents, each announced by a `# from` line.
///
/// Return
/// ----------
/// * The written meta-clusters, by label.
/// * [`DataError::InsufficientSamples`] with fewer than three readable mean files.
pub fn meta_cluster_month(
    root: &Utf8Path,
    engine: &ClusterEngine,
    params: &AggregateParams,
) -> Result<Vec<MetaCluster>, TrajclustError> {
    let mut refs = Vec::new();
    let mut features = Vec::new();
    let mut documents = Vec::new();
    for (point, cluster, path) in find_cluster_means(root, params)? {
        let member = match Member::load(&path) {
            Ok(m) => m,
            Err(error) => {
                warn!(path = %path, %error, "cluster mean skipped");
                continue;
            }
        };
        let Some(feature) = member.trajectory().and_then(|t| t.centroid_feature(false)) else {
            warn!(path = %path, "cluster mean without samples skipped");
            continue;
        };
        features.push(feature);
        documents.push(member.document);
        refs.push((point, cluster, path));
    }

    let partition = engine.partitional(&features)?;
    info!(month = %params.month_tag, means = features.len(), k = partition.k, silhouette = partition.silhouette, "level B meta-clustering");

    write_meta_clusters(&params.meta_dir(root), &partition.labels, &refs, &documents)
}

/// Write one `C<m>_<K>_M_mean` concatenation per non-empty meta-cluster.
///
/// Labels that no input carries are dropped; the remaining ones are renumbered
/// `1..=K` in increasing order, `K` being the number of distinct labels.
fn write_meta_clusters(
    dir: &Utf8Path,
    labels: &[usize],
    refs: &[(String, usize, Utf8PathBuf)],
    documents: &[TdumpDocument],
) -> Result<Vec<MetaCluster>, TrajclustError> {
    let groups: Vec<Vec<usize>> = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| (label, i))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(label, _)| *label)
        .map(|(_, picked)| picked)
        .collect();
    let k = groups.len();
    std::fs::create_dir_all(dir)?;

    let mut clusters = Vec::with_capacity(k);
    for (m, picked) in (1..=k).zip(groups) {
        let mut text = format!("# META_CLUSTER {m}  (K={k})\n");
        for &i in &picked {
            push_section(&mut text, &refs[i].2, &documents[i]);
        }
        let path = dir.join(format!("C{m}_{k}_M_mean"));
        std::fs::write(&path, text)?;
        clusters.push(MetaCluster {
            label: m,
            k,
            members: picked.iter().map(|&i| refs[i].clone()).collect(),
            path,
        });
    }
    Ok(clusters)
}

/// Level C: average every `C<m>_<K>_M_mean` concatenation of the month into
/// `C<m>_<K>_META_mean.tdump`.
///
/// Return
/// ----------
/// * A [`BatchReport`] with one outcome per concatenation; a concatenation without any
///   member of at least `min_member_samples` samples is a data failure.
pub fn synthesize_meta_means(
    root: &Utf8Path,
    params: &AggregateParams,
) -> Result<BatchReport, TrajclustError> {
    let dir = params.meta_dir(root);
    let mut inputs: Vec<(Utf8PathBuf, String, String)> = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        if let Some(caps) = META_CONCAT_RE.captures(entry.file_name()) {
            inputs.push((entry.path().to_path_buf(), caps[1].to_string(), caps[2].to_string()));
        }
    }
    inputs.sort();

    let mut report = BatchReport::new("meta-mean");
    let mut progress = SweepProgress::new(inputs.len(), "meta-mean");
    for (path, m, k) in inputs {
        let result = mean_of_concatenation(&path, params.min_member_samples).and_then(|mean| {
            let out = dir.join(format!("C{m}_{k}_META_mean.tdump"));
            mean.write_to(&out)?;
            Ok(vec![out])
        });
        report.record_result(path, result);
        progress.tick();
    }
    progress.finish();
    info!("{report}");
    Ok(report)
}

/// Mean trajectory of every section of a concatenated file.
pub fn mean_of_concatenation(
    path: &Utf8Path,
    min_member_samples: usize,
) -> Result<TdumpDocument, TrajclustError> {
    let text = std::fs::read_to_string(path)?;
    let documents: Vec<_> = read_concatenation(&text, path)
        .into_iter()
        .map(|m| m.document)
        .collect();
    if documents.is_empty() {
        return Err(DataError::NoUsableMembers.into());
    }
    synthesize_mean_of(&documents, min_member_samples)
}
