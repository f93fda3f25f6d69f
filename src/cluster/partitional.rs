//! # k-means with silhouette-driven selection of K
//!
//! Clusters small sets of feature vectors (one per trajectory or per first-level cluster:
//! mean latitude, mean longitude, optionally mean pressure).
//!
//! ## Pipeline
//! -----------------
//! 1. Optionally standardize every feature column to zero mean and unit (population)
//!    variance; constant columns are only centered.
//! 2. For every candidate `K` in `[2, min(max_k, N − 1)]`, run k-means `n_init` times
//!    from k-means++ seeds drawn from a `StdRng` seeded identically for every `K`, and
//!    keep the run with the lowest inertia.
//! 3. Score each `K` with the mean silhouette coefficient; the highest score wins and
//!    ties keep the smallest `K`.
//!
//! A `K` whose best run has fewer than two non-empty clusters has no silhouette and is
//! not a candidate.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::Labels;
use crate::trajclust_errors::DataError;

/// Outcome of [`select_k`].
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// Selected cluster count.
    pub k: usize,
    /// One label per input, `1..=k`, numbered by first appearance.
    pub labels: Labels,
    /// Mean silhouette coefficient of the selected partition.
    pub silhouette: f64,
    /// `(K, silhouette)` of every scored candidate, in increasing `K`.
    pub scores: Vec<(usize, f64)>,
}

/// Best k-means run for one `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// 0-based cluster index per input.
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroids.
    pub inertia: f64,
}

/// k-means tuning shared by every candidate `K`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansConfig {
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

#[inline]
fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Z-score standardization, column by column.
pub fn standardize(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(dim) = data.first().map(Vec::len) else {
        return Vec::new();
    };
    let n = data.len() as f64;
    let (mean, scale): (Vec<f64>, Vec<f64>) = (0..dim)
        .map(|c| {
            let mean = data.iter().map(|r| r[c]).sum::<f64>() / n;
            let var = data.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        })
        .unzip();
    data.iter()
        .map(|r| {
            r.iter()
                .enumerate()
                .map(|(c, v)| (v - mean[c]) / scale[c])
                .collect()
        })
        .collect()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, sq_dist(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding: first centroid uniform, the next ones drawn with probability
/// proportional to the squared distance to the closest centroid already chosen.
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..data.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = data.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // every point already coincides with a centroid
            centroids.push(data[rng.random_range(0..data.len())].clone());
            continue;
        }
        let target = rng.random::<f64>() * total;
        let mut cumsum = 0.0;
        let mut selected = data.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            cumsum += w;
            if *w > 0.0 && cumsum >= target {
                selected = i;
                break;
            }
        }
        centroids.push(data[selected].clone());
    }
    centroids
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> KMeansFit {
    let k = centroids.len();
    let dim = data[0].len();
    let mut assignments = vec![usize::MAX; data.len()];

    for _ in 0..max_iter.max(1) {
        let mut changed = false;
        for (i, p) in data.iter().enumerate() {
            let (c, _) = nearest(p, &centroids);
            if assignments[i] != c {
                assignments[i] = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &c) in data.iter().zip(&assignments) {
            for (s, v) in sums[c].iter_mut().zip(p) {
                *s += v;
            }
            counts[c] += 1;
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] > 0 {
                for (x, s) in centroid.iter_mut().zip(&sums[c]) {
                    *x = s / counts[c] as f64;
                }
            }
        }
    }

    let inertia = data
        .iter()
        .zip(&assignments)
        .map(|(p, &c)| sq_dist(p, &centroids[c]))
        .sum();
    KMeansFit {
        assignments,
        centroids,
        inertia,
    }
}

/// Best of `config.n_init` k-means runs (lowest inertia, first on ties).
pub fn kmeans(data: &[Vec<f64>], k: usize, config: &KMeansConfig) -> Result<KMeansFit, DataError> {
    if k == 0 || k > data.len() {
        return Err(DataError::InvalidClusterCount { k, n: data.len() });
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init.max(1) {
        let seeds = kmeans_plus_plus(data, k, &mut rng);
        let fit = lloyd(data, seeds, config.max_iter);
        if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    best.ok_or(DataError::InvalidClusterCount { k, n: data.len() })
}

/// Mean silhouette coefficient with Euclidean distances.
///
/// Singletons score 0, as does a point whose intra- and nearest-cluster mean distances
/// are both 0.
///
/// Return
/// ----------
/// * `None` unless the labels form between 2 and `N − 1` distinct clusters.
pub fn silhouette(data: &[Vec<f64>], labels: &[usize]) -> Option<f64> {
    let n = data.len();
    let mut clusters: Vec<usize> = labels.to_vec();
    clusters.sort_unstable();
    clusters.dedup();
    if clusters.len() < 2 || clusters.len() >= n {
        return None;
    }

    let total: f64 = (0..n)
        .map(|i| {
            let mut sum = vec![0.0; clusters.len()];
            let mut count = vec![0usize; clusters.len()];
            for j in (0..n).filter(|&j| j != i) {
                let c = clusters.binary_search(&labels[j]).unwrap_or(0);
                sum[c] += sq_dist(&data[i], &data[j]).sqrt();
                count[c] += 1;
            }
            let own = clusters.binary_search(&labels[i]).unwrap_or(0);
            if count[own] == 0 {
                return 0.0;
            }
            let a = sum[own] / count[own] as f64;
            let b = (0..clusters.len())
                .filter(|&c| c != own && count[c] > 0)
                .map(|c| sum[c] / count[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let m = a.max(b);
            if m > 0.0 {
                (b - a) / m
            } else {
                0.0
            }
        })
        .sum();
    Some(total / n as f64)
}

/// Renumber arbitrary cluster ids to `1..` by first appearance.
pub fn relabel_by_first_appearance(assignments: &[usize]) -> Labels {
    let mut seen: Vec<usize> = Vec::new();
    assignments
        .iter()
        .map(|a| match seen.iter().position(|s| s == a) {
            Some(p) => p + 1,
            None => {
                seen.push(*a);
                seen.len()
            }
        })
        .collect()
}

/// Cluster `features` and select `K` by silhouette.
///
/// Arguments
/// -----------------
/// * `features` – One vector per input, all of the same non-zero dimension.
/// * `max_k` – Upper bound of the candidate range (further capped at `N − 1`).
/// * `standardize_features` – Apply z-score standardization first.
/// * `config` – k-means restarts, iteration cap and seed.
///
/// Return
/// ----------
/// * The selected partition and the score of every candidate.
/// * [`DataError::InsufficientSamples`] when `N < 3`, or when no candidate `K` yields a
///   partition with a silhouette (inputs with fewer than two distinct points).
/// * [`DataError::Misaligned`] when feature vectors differ in dimension.
pub fn select_k(
    features: &[Vec<f64>],
    max_k: usize,
    standardize_features: bool,
    config: &KMeansConfig,
) -> Result<PartitionResult, DataError> {
    let n = features.len();
    if n < 3 {
        return Err(DataError::InsufficientSamples {
            needed: 3,
            available: n,
        });
    }
    let dim = features[0].len();
    if let Some(index) = features.iter().position(|f| f.len() != dim || f.is_empty()) {
        return Err(DataError::Misaligned {
            index,
            reason: format!("feature dimension {} instead of {dim}", features[index].len()),
        });
    }

    let data = if standardize_features {
        standardize(features)
    } else {
        features.to_vec()
    };

    let k_max = max_k.min(n - 1);
    let mut scores = Vec::new();
    let mut best: Option<(usize, f64, Vec<usize>)> = None;
    for k in 2..=k_max {
        let fit = kmeans(&data, k, config)?;
        let Some(score) = silhouette(&data, &fit.assignments) else {
            continue;
        };
        scores.push((k, score));
        if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
            best = Some((k, score, fit.assignments));
        }
    }

    let (k, silhouette, assignments) = best.ok_or(DataError::InsufficientSamples {
        needed: 3,
        available: n,
    })?;
    Ok(PartitionResult {
        k,
        labels: relabel_by_first_appearance(&assignments),
        silhouette,
        scores,
    })
}

#[cfg(test)]
mod partitional_test {
    use super::*;
    use approx::assert_relative_eq;

    const CONFIG: KMeansConfig = KMeansConfig {
        n_init: 10,
        max_iter: 300,
        seed: 0,
    };

    fn two_groups() -> Vec<Vec<f64>> {
        let mut pts = Vec::new();
        for i in 0..5 {
            let e = i as f64 * 0.1;
            pts.push(vec![10.0 + e, 10.0 - e]);
            pts.push(vec![50.0 - e, 50.0 + e]);
        }
        pts
    }

    #[test]
    fn test_silhouette_selects_two_groups() {
        let result = select_k(&two_groups(), 10, true, &CONFIG).unwrap();
        assert_eq!(result.k, 2);
        assert_eq!(result.labels, vec![1, 2, 1, 2, 1, 2, 1, 2, 1, 2]);
        assert!(result.silhouette > 0.9);
        assert_eq!(result.scores.first().map(|s| s.0), Some(2));
        assert!(result.scores.iter().all(|&(k, _)| k <= 9));
    }

    #[test]
    fn test_insufficient_samples() {
        assert_eq!(
            select_k(&two_groups()[..2], 10, true, &CONFIG),
            Err(DataError::InsufficientSamples {
                needed: 3,
                available: 2
            })
        );
        let same = vec![vec![1.0, 1.0]; 4];
        assert!(matches!(
            select_k(&same, 10, true, &CONFIG),
            Err(DataError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_standardize() {
        let z = standardize(&[vec![1.0, 5.0], vec![3.0, 5.0]]);
        assert_eq!(z, vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_silhouette_values() {
        let data = vec![vec![0.0], vec![1.0], vec![10.0], vec![11.0]];
        // a = 1 everywhere; b = 10.5 at the ends, 9.5 inside
        let expected = (2.0 * (9.5 / 10.5) + 2.0 * (8.5 / 9.5)) / 4.0;
        assert_relative_eq!(
            silhouette(&data, &[0, 0, 1, 1]).unwrap(),
            expected,
            epsilon = 1e-12
        );
        assert_eq!(silhouette(&data, &[0, 0, 0, 0]), None);
        assert_eq!(silhouette(&data, &[0, 1, 2, 3]), None);
        // singleton scores 0
        let s = silhouette(&data, &[0, 1, 1, 1]).unwrap();
        assert!(s < 0.9);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let a = kmeans(&two_groups(), 3, &CONFIG).unwrap();
        let b = kmeans(&two_groups(), 3, &CONFIG).unwrap();
        assert_eq!(a, b);
        assert!(kmeans(&two_groups(), 11, &CONFIG).is_err());
    }

    #[test]
    fn test_relabel() {
        assert_eq!(relabel_by_first_appearance(&[4, 4, 0, 7, 0]), vec![1, 1, 2, 3, 2]);
    }
}
