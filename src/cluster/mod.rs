//! # Trajectory clustering engine
//!
//! This module groups trajectories (or feature vectors derived from them) into clusters,
//! with three ways of choosing the partition:
//!
//! * **Hierarchical** – Agglomeration over the shape-aware distance matrix
//!   ([`distance`]) with a configurable [`Linkage`] (Ward by default), cut at a requested
//!   `K` ([`hierarchical`]).
//! * **Partitional** – k-means over centroid features with `K` chosen by silhouette
//!   ([`partitional`]).
//! * **Elbow** – `K` read off the diagnostic table of the external cluster tool
//!   ([`elbow`]).
//!
//! ## Configuration
//!
//! All tunables live in [`ClusterParams`], built and validated through
//! [`ClusterParamsBuilder`]:
//!
//! ```rust
//! use trajclust::cluster::{ClusterEngine, ClusterParams, Linkage};
//!
//! let params = ClusterParams::builder()
//!     .linkage(Linkage::Average)
//!     .max_k(6)
//!     .n_init(20)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! let engine = ClusterEngine::new(params);
//! # let _ = engine;
//! ```
//!
//! ## Errors
//!
//! Every operation returns [`DataError`]: misaligned trajectories for the distance
//! matrix, too few samples for silhouette scoring, out-of-range cluster counts, empty or
//! malformed diagnostic tables.
use std::fmt;

use nalgebra::DMatrix;
use tracing::debug;

use crate::constants::{
    Labels, DEFAULT_ELBOW_ABS_PCT, DEFAULT_ELBOW_JUMP_PCT, DEFAULT_MAX_K, MIN_ELBOW_K,
};
use crate::tdump::Trajectory;
use crate::trajclust_errors::{DataError, TrajclustError};

pub mod distance;
pub mod elbow;
pub mod hierarchical;
pub mod partitional;

pub use elbow::{parse_diagnostic_table, DiagnosticRow};
pub use hierarchical::{Dendrogram, Linkage};
pub use partitional::{KMeansConfig, PartitionResult};

/// Tunables of the [`ClusterEngine`].
///
/// Fields
/// -----------------
/// **Hierarchical**
/// * `linkage` – Agglomeration rule (default [`Linkage::Ward`]).
///
/// **Partitional**
/// * `max_k` – Upper bound of the silhouette candidate range, further capped at `N − 1`
///   (default 10).
/// * `n_init` – k-means restarts per candidate `K` (default 10).
/// * `max_iter` – Lloyd iterations per restart (default 300).
/// * `seed` – Seed of the k-means++ generator (default 0).
/// * `standardize` – Z-score the features before clustering (default `true`).
/// * `include_pressure` – Add the mean pressure/height to the centroid features of
///   trajectories (default `false`).
///
/// **Elbow**
/// * `elbow_abs_pct` – Minimal percent change of a qualifying row (default 15).
/// * `elbow_jump_pct` – Minimal increase over the previous row (default 10).
/// * `min_elbow_k` – Floor of the elbow result (default 3).
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub linkage: Linkage,

    pub max_k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
    pub standardize: bool,
    pub include_pressure: bool,

    pub elbow_abs_pct: f64,
    pub elbow_jump_pct: f64,
    pub min_elbow_k: usize,
}

impl ClusterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ClusterParamsBuilder {
        ClusterParamsBuilder::new()
    }

    pub fn kmeans_config(&self) -> KMeansConfig {
        KMeansConfig {
            n_init: self.n_init,
            max_iter: self.max_iter,
            seed: self.seed,
        }
    }
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            linkage: Linkage::Ward,

            max_k: DEFAULT_MAX_K,
            n_init: 10,
            max_iter: 300,
            seed: 0,
            standardize: true,
            include_pressure: false,

            elbow_abs_pct: DEFAULT_ELBOW_ABS_PCT,
            elbow_jump_pct: DEFAULT_ELBOW_JUMP_PCT,
            min_elbow_k: MIN_ELBOW_K,
        }
    }
}

impl fmt::Display for ClusterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 32;
            writeln!(f, "Clustering parameters")?;
            writeln!(f, "---------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Hierarchical]")?;
            line!("linkage          = {}", self.linkage, "Cluster distance update")?;

            writeln!(f, "\n[Partitional]")?;
            line!("max_k            = {}", self.max_k, "Largest candidate K")?;
            line!("n_init           = {}", self.n_init, "k-means restarts per K")?;
            line!("max_iter         = {}", self.max_iter, "Lloyd iterations per restart")?;
            line!("seed             = {}", self.seed, "k-means++ seed")?;
            line!("standardize      = {}", self.standardize, "Z-score features")?;
            line!("include_pressure = {}", self.include_pressure, "Mean pressure feature")?;

            writeln!(f, "\n[Elbow]")?;
            line!("elbow_abs_pct    = {:.1}", self.elbow_abs_pct, "Minimal percent change")?;
            line!("elbow_jump_pct   = {:.1}", self.elbow_jump_pct, "Minimal jump")?;
            write!(f, "  min_elbow_k      = {}", self.min_elbow_k)
        } else {
            write!(
                f,
                "ClusterParams(linkage={}, max_k={}, n_init={}, max_iter={}, seed={}, standardize={}, \
                 include_pressure={}, elbow_abs_pct={:.1}, elbow_jump_pct={:.1}, min_elbow_k={})",
                self.linkage,
                self.max_k,
                self.n_init,
                self.max_iter,
                self.seed,
                self.standardize,
                self.include_pressure,
                self.elbow_abs_pct,
                self.elbow_jump_pct,
                self.min_elbow_k
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterParamsBuilder {
    params: ClusterParams,
}

impl Default for ClusterParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: ClusterParams::default(),
        }
    }

    pub fn linkage(mut self, v: Linkage) -> Self {
        self.params.linkage = v;
        self
    }
    pub fn max_k(mut self, v: usize) -> Self {
        self.params.max_k = v;
        self
    }
    pub fn n_init(mut self, v: usize) -> Self {
        self.params.n_init = v;
        self
    }
    pub fn max_iter(mut self, v: usize) -> Self {
        self.params.max_iter = v;
        self
    }
    pub fn seed(mut self, v: u64) -> Self {
        self.params.seed = v;
        self
    }
    pub fn standardize(mut self, v: bool) -> Self {
        self.params.standardize = v;
        self
    }
    pub fn include_pressure(mut self, v: bool) -> Self {
        self.params.include_pressure = v;
        self
    }
    pub fn elbow_abs_pct(mut self, v: f64) -> Self {
        self.params.elbow_abs_pct = v;
        self
    }
    pub fn elbow_jump_pct(mut self, v: f64) -> Self {
        self.params.elbow_jump_pct = v;
        self
    }
    pub fn min_elbow_k(mut self, v: usize) -> Self {
        self.params.min_elbow_k = v;
        self
    }

    pub fn build(self) -> Result<ClusterParams, TrajclustError> {
        let p = &self.params;
        if p.max_k < 2 {
            return Err(TrajclustError::InvalidParameter(
                "max_k must be >= 2".into(),
            ));
        }
        if p.n_init == 0 || p.max_iter == 0 {
            return Err(TrajclustError::InvalidParameter(
                "n_init and max_iter must be >= 1".into(),
            ));
        }
        if !(p.elbow_abs_pct >= 0.0 && p.elbow_jump_pct >= 0.0) {
            return Err(TrajclustError::InvalidParameter(
                "elbow thresholds must be non-negative".into(),
            ));
        }
        if p.min_elbow_k == 0 {
            return Err(TrajclustError::InvalidParameter(
                "min_elbow_k must be >= 1".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Entry point of the three clustering modes.
#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    params: ClusterParams,
}

impl ClusterEngine {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Pairwise sum-of-haversine distance matrix, see [`distance::distance_matrix`].
    pub fn distance_matrix(&self, trajectories: &[Trajectory]) -> Result<DMatrix<f64>, DataError> {
        distance::distance_matrix(trajectories)
    }

    /// Dendrogram of a trajectory set under the configured linkage.
    pub fn dendrogram(&self, trajectories: &[Trajectory]) -> Result<Dendrogram, DataError> {
        let d = self.distance_matrix(trajectories)?;
        Ok(hierarchical::linkage(&d, self.params.linkage))
    }

    /// Hierarchical labels `1..=K'` (`K' ≤ k`) of aligned trajectories.
    ///
    /// Return
    /// ----------
    /// * [`DataError::Misaligned`] for trajectories of different lag sequences.
    /// * [`DataError::InvalidClusterCount`] if `k` is 0 or larger than the set.
    pub fn hierarchical(&self, trajectories: &[Trajectory], k: usize) -> Result<Labels, DataError> {
        if trajectories.is_empty() {
            return Err(DataError::InsufficientSamples {
                needed: 1,
                available: 0,
            });
        }
        let labels = self.dendrogram(trajectories)?.cut_maxclust(k)?;
        debug!(n = trajectories.len(), k, linkage = %self.params.linkage, "hierarchical cut");
        Ok(labels)
    }

    /// Silhouette-selected k-means partition of feature vectors.
    pub fn partitional(&self, features: &[Vec<f64>]) -> Result<PartitionResult, DataError> {
        let result = partitional::select_k(
            features,
            self.params.max_k,
            self.params.standardize,
            &self.params.kmeans_config(),
        )?;
        debug!(n = features.len(), k = result.k, silhouette = result.silhouette, "partitional selection");
        Ok(result)
    }

    /// Partitional mode over trajectory centroid features.
    pub fn partitional_trajectories(
        &self,
        trajectories: &[Trajectory],
    ) -> Result<PartitionResult, DataError> {
        let features = trajectories
            .iter()
            .enumerate()
            .map(|(index, t)| {
                t.centroid_feature(self.params.include_pressure)
                    .ok_or_else(|| DataError::Misaligned {
                        index,
                        reason: "empty trajectory".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.partitional(&features)
    }

    /// Elbow-mode `K` from parsed diagnostic rows.
    pub fn elbow(&self, rows: &[DiagnosticRow]) -> Result<usize, DataError> {
        elbow::select_elbow_k(
            rows,
            self.params.elbow_abs_pct,
            self.params.elbow_jump_pct,
            self.params.min_elbow_k,
        )
    }

    /// Elbow-mode `K` from the diagnostic table text.
    pub fn elbow_from_table(&self, text: &str) -> Result<usize, DataError> {
        self.elbow(&parse_diagnostic_table(text)?)
    }
}

#[cfg(test)]
mod cluster_engine_test {
    use super::*;
    use crate::tdump::TrajectoryPoint;

    fn traj(lat: f64, lon: f64) -> Trajectory {
        Trajectory::new(
            1,
            (0..5)
                .map(|h| TrajectoryPoint::new(-h, lat + h as f64 * 0.1, lon - h as f64 * 0.1, 900.0))
                .collect(),
        )
    }

    #[test]
    fn test_builder_validation() {
        assert!(ClusterParams::builder().max_k(1).build().is_err());
        assert!(ClusterParams::builder().n_init(0).build().is_err());
        assert!(ClusterParams::builder().elbow_abs_pct(-1.0).build().is_err());
        assert!(ClusterParams::builder().elbow_jump_pct(f64::NAN).build().is_err());
        assert!(ClusterParams::builder().min_elbow_k(0).build().is_err());
        let p = ClusterParams::builder().linkage(Linkage::Single).build().unwrap();
        assert_eq!(p.linkage, Linkage::Single);
    }

    #[test]
    fn test_display_forms() {
        let p = ClusterParams::default();
        assert!(p.to_string().starts_with("ClusterParams(linkage=ward, max_k=10"));
        let pretty = format!("{p:#}");
        assert!(pretty.contains("[Elbow]"));
        assert!(pretty.contains("min_elbow_k      = 3"));
    }

    #[test]
    fn test_hierarchical_and_partitional_agree() {
        let set = vec![
            traj(10.0, 10.0),
            traj(50.0, 50.0),
            traj(10.5, 10.2),
            traj(50.3, 49.8),
            traj(9.8, 10.1),
        ];
        let engine = ClusterEngine::default();
        assert_eq!(engine.hierarchical(&set, 2).unwrap(), vec![1, 2, 1, 2, 1]);

        let part = engine.partitional_trajectories(&set).unwrap();
        assert_eq!(part.k, 2);
        assert_eq!(part.labels, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_identical_trajectories_single_cluster() {
        let set = vec![traj(10.0, 10.0); 4];
        let engine = ClusterEngine::default();
        for k in 1..=4 {
            assert_eq!(engine.hierarchical(&set, k).unwrap(), vec![1; 4]);
        }
    }

    #[test]
    fn test_elbow_from_table() {
        let engine = ClusterEngine::new(
            ClusterParams::builder()
                .elbow_abs_pct(50.0)
                .elbow_jump_pct(30.0)
                .build()
                .unwrap(),
        );
        assert_eq!(
            engine.elbow_from_table("1 4 20\n2 3 60\n3 2 95\n4 1 98\n"),
            Ok(3)
        );
    }
}
