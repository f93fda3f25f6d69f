//! # Agglomerative clustering
//!
//! Builds a dendrogram from a distance matrix with the Lance–Williams update formulas and
//! cuts it into at most `K` flat clusters.
//!
//! ## Linkages
//! -----------------
//! With `d(i, j)` the distance between clusters `i` and `j` of sizes `nᵢ`, `nⱼ`, the
//! distance from the merged cluster `ij` to any other cluster `k` is:
//!
//! * **Ward** – `sqrt(((nᵢ+nₖ)·d(i,k)² + (nⱼ+nₖ)·d(j,k)² − nₖ·d(i,j)²) / (nᵢ+nⱼ+nₖ))`
//! * **Single** – `min(d(i,k), d(j,k))`
//! * **Complete** – `max(d(i,k), d(j,k))`
//! * **Average** – `(nᵢ·d(i,k) + nⱼ·d(j,k)) / (nᵢ+nⱼ)`
//!
//! ## Cut
//! -----------------
//! [`Dendrogram::cut_maxclust`] looks for the smallest height `t` such that applying every
//! merge of height `≤ t` leaves at most `K` clusters. Merges tied at `t` are all applied,
//! so a set of identical inputs collapses into a single cluster whatever `K` is.
//!
//! Flat labels are numbered `1..` in order of first appearance over the inputs.
use std::fmt;

use itertools::Itertools;
use nalgebra::DMatrix;

use crate::constants::Labels;
use crate::trajclust_errors::DataError;

/// Cluster-to-cluster distance update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    #[default]
    Ward,
    Single,
    Complete,
    Average,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Linkage::Ward => "ward",
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
        };
        f.write_str(s)
    }
}

impl Linkage {
    fn update(self, dik: f64, djk: f64, dij: f64, ni: f64, nj: f64, nk: f64) -> f64 {
        match self {
            Linkage::Ward => {
                let v = ((ni + nk) * dik * dik + (nj + nk) * djk * djk - nk * dij * dij)
                    / (ni + nj + nk);
                v.max(0.0).sqrt()
            }
            Linkage::Single => dik.min(djk),
            Linkage::Complete => dik.max(djk),
            Linkage::Average => (ni * dik + nj * djk) / (ni + nj),
        }
    }
}

/// One agglomeration step: cluster represented by input `right` joins the one represented
/// by input `left` at `height`; `size` is the size of the merged cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

/// The `n − 1` merges of an agglomeration over `n` inputs, in merge order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    n: usize,
    merges: Vec<Merge>,
}

/// Agglomerate the inputs of a square distance matrix.
///
/// At each step the closest pair of active clusters is merged; ties go to the pair with
/// the lowest `(left, right)` indices.
pub fn linkage(d: &DMatrix<f64>, method: Linkage) -> Dendrogram {
    let n = d.nrows();
    let mut dist = d.clone();
    let mut size = vec![1usize; n];
    let mut active: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    while active.len() > 1 {
        let (mut bi, mut bj, mut best) = (0usize, 1usize, f64::INFINITY);
        for (a, b) in active.iter().tuple_combinations() {
            if dist[(*a, *b)] < best {
                (bi, bj, best) = (*a, *b, dist[(*a, *b)]);
            }
        }

        let (ni, nj) = (size[bi] as f64, size[bj] as f64);
        for &k in active.iter().filter(|&&k| k != bi && k != bj) {
            let v = method.update(dist[(bi, k)], dist[(bj, k)], best, ni, nj, size[k] as f64);
            dist[(bi, k)] = v;
            dist[(k, bi)] = v;
        }
        size[bi] += size[bj];
        active.retain(|&k| k != bj);
        merges.push(Merge {
            left: bi,
            right: bj,
            height: best,
            size: size[bi],
        });
    }

    Dendrogram { n, merges }
}

impl Dendrogram {
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Cut into at most `k` flat clusters.
    ///
    /// Return
    /// ----------
    /// * One label per input, `1..=k'` with `k' ≤ k`, numbered by first appearance.
    /// * [`DataError::InvalidClusterCount`] if `k == 0` or `k > n`.
    pub fn cut_maxclust(&self, k: usize) -> Result<Labels, DataError> {
        if k == 0 || k > self.n {
            return Err(DataError::InvalidClusterCount { k, n: self.n });
        }

        // smallest threshold among {0} and the merge heights leaving at most k clusters;
        // zero-height merges are always applied
        let threshold = match self.n - k {
            0 => 0.0,
            needed => self
                .merges
                .iter()
                .map(|m| m.height)
                .sorted_by(|a, b| a.total_cmp(b))
                .nth(needed - 1)
                .map_or(f64::INFINITY, |h| h.max(0.0)),
        };
        let mut parent: Vec<usize> = (0..self.n).collect();
        for m in self.merges.iter().filter(|m| m.height <= threshold) {
            let (a, b) = (find(&mut parent, m.left), find(&mut parent, m.right));
            if a != b {
                parent[b] = a;
            }
        }

        let mut label_of_root = vec![0usize; self.n];
        let mut next = 0;
        let labels = (0..self.n)
            .map(|i| {
                let root = find(&mut parent, i);
                if label_of_root[root] == 0 {
                    next += 1;
                    label_of_root[root] = next;
                }
                label_of_root[root]
            })
            .collect();
        Ok(labels)
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}
