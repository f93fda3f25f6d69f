//! Level A: per-point concatenation of first-level clusters.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::{info, warn};

use super::mean::{synthesize_mean, MeanInput};
use super::{push_section, AggregateParams, Member};
use crate::cluster::ClusterEngine;
use crate::constants::Labels;
use crate::tdump::Trajectory;
use crate::trajclust_errors::{DataError, TrajclustError};

/// First-level labels of the members of one point.
///
/// With `k` given, the hierarchical tree is cut at `k` clusters; otherwise `K` is chosen
/// by the partitional silhouette selection over the trajectories' centroid features.
pub fn label_members(
    engine: &ClusterEngine,
    members: &[Member],
    k: Option<usize>,
) -> Result<Labels, DataError> {
    let trajectories: Vec<Trajectory> = members
        .iter()
        .enumerate()
        .map(|(index, m)| {
            m.trajectory().cloned().ok_or_else(|| DataError::Misaligned {
                index,
                reason: format!("{} holds no trajectory", m.path),
            })
        })
        .collect::<Result<_, _>>()?;
    match k {
        Some(k) => engine.hierarchical(&trajectories, k),
        None => Ok(engine.partitional_trajectories(&trajectories)?.labels),
    }
}

/// Write the member concatenation and the mean of every cluster of one point.
///
/// Arguments
/// -----------------
/// * `root` – Aggregation root; outputs go to `root/<month_tag>_P<point>/`.
/// * `point` – 1-based release point index.
/// * `members` – Documents of the point, one label each.
/// * `labels` – First-level labels `1..=K`.
///
/// Return
/// ----------
/// * The written paths: for every cluster `c`, `C<c>_<K>_members` then, when the cluster
///   has members long enough to be averaged, `C<c>_<K>_mean.tdump`.
pub fn merge_point(
    root: &Utf8Path,
    point: usize,
    members: &[Member],
    labels: &[usize],
    params: &AggregateParams,
) -> Result<Vec<Utf8PathBuf>, TrajclustError> {
    if members.len() != labels.len() {
        return Err(TrajclustError::InvalidParameter(format!(
            "{} labels for {} members",
            labels.len(),
            members.len()
        )));
    }
    let Some(&k) = labels.iter().max() else {
        return Ok(Vec::new());
    };

    let dir = params.point_dir(root, point);
    std::fs::create_dir_all(&dir)?;

    let mut written = Vec::new();
    let clusters = members
        .iter()
        .zip(labels)
        .into_group_map_by(|(_, label)| **label);
    for c in 1..=k {
        let Some(group) = clusters.get(&c) else {
            continue;
        };

        let mut text = String::new();
        for (m, _) in group {
            push_section(&mut text, &m.path, &m.document);
        }
        let members_path = dir.join(format!("C{c}_{k}_members"));
        std::fs::write(&members_path, text)?;
        written.push(members_path);

        let inputs: Vec<MeanInput<'_>> = group
            .iter()
            .flat_map(|(m, _)| MeanInput::all_of(std::slice::from_ref(&m.document)))
            .collect();
        match synthesize_mean(&inputs, params.min_member_samples) {
            Ok(mean) => {
                let mean_path = dir.join(format!("C{c}_{k}_mean.tdump"));
                mean.write_to(&mean_path)?;
                written.push(mean_path);
            }
            Err(TrajclustError::Data(error)) => {
                warn!(point, cluster = c, %error, "cluster mean not written");
            }
            Err(other) => return Err(other),
        }
    }
    info!(point, k, members = members.len(), outputs = written.len(), "level A merge");
    Ok(written)
}
