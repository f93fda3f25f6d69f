//! # Two-level aggregation of clustered trajectories
//!
//! Reduces a month of clustered trajectories to a handful of representative mean
//! trajectories, then groups those across months.
//!
//! ## Levels
//! -----------------
//! * **Level A** ([`merge`]) – For one release point, the members of every first-level
//!   cluster are concatenated into `<month_tag>_P<n>/C<c>_<K>_members`, and their mean
//!   is written next to it as `C<c>_<K>_mean.tdump`.
//! * **Level B** ([`meta`]) – The per-point cluster means of the month are re-clustered
//!   on their mean position; each meta-cluster is concatenated into
//!   `<month_tag>_META/C<m>_<K>_M_mean`.
//! * **Level C** ([`meta`], [`mean`]) – Each concatenation is averaged into
//!   `C<m>_<K>_META_mean.tdump`.
//! * **Outer pass** ([`outer`]) – The meta-means of every month are clustered
//!   hierarchically; the labels go to a `file,path,cluster` CSV.
//!
//! ## Concatenations
//! -----------------
//! Concatenated files hold complete tdump documents, each announced by a provenance line
//! `# from <path>`. Other lines starting with `#` before the first provenance line (such
//! as the `# META_CLUSTER` banner) are ignored. See [`read_concatenation`].
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::batch::BatchReport;
use crate::cluster::ClusterEngine;
use crate::constants::DEFAULT_MIN_MEMBER_SAMPLES;
use crate::tdump::{TdumpDocument, Trajectory};
use crate::trajclust_errors::TrajclustError;

pub mod mean;
pub mod merge;
pub mod meta;
pub mod outer;

pub use mean::{synthesize_mean, synthesize_mean_of, MeanInput};
pub use meta::MetaCluster;
pub use outer::LabelRecord;

/// Prefix of the provenance lines of concatenated files.
pub const FROM_PREFIX: &str = "# from ";

/// A trajectory document together with the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub path: Utf8PathBuf,
    pub document: TdumpDocument,
}

impl Member {
    pub fn new(path: impl Into<Utf8PathBuf>, document: TdumpDocument) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, TrajclustError> {
        Ok(Self::new(path, TdumpDocument::from_file(path)?))
    }

    /// First trajectory of the document (the only one for split files).
    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.document.trajectories().first()
    }
}

/// Split a concatenated file into its `# from` sections and parse each of them.
///
/// Sections that do not parse are logged and left out. A text without any provenance
/// line is read as a single document attributed to `fallback_source`.
pub fn read_concatenation(text: &str, fallback_source: &Utf8Path) -> Vec<Member> {
    let mut sections: Vec<(Utf8PathBuf, Vec<&str>)> = Vec::new();
    for line in text.lines() {
        if let Some(src) = line.strip_prefix(FROM_PREFIX) {
            sections.push((Utf8PathBuf::from(src.trim()), Vec::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line);
        }
    }
    if sections.is_empty() {
        sections.push((fallback_source.to_path_buf(), text.lines().collect()));
    }

    sections
        .into_iter()
        .filter_map(|(source, body)| {
            let mut section = body.join("\n");
            section.push('\n');
            match TdumpDocument::parse(&section) {
                Ok(document) => Some(Member::new(source, document)),
                Err(error) => {
                    warn!(file = %fallback_source, section = %source, %error, "unreadable section");
                    None
                }
            }
        })
        .collect()
}

/// Append one `# from` section to a concatenation buffer.
pub(crate) fn push_section(buffer: &mut String, source: &Utf8Path, document: &TdumpDocument) {
    buffer.push_str(FROM_PREFIX);
    buffer.push_str(source.as_str());
    buffer.push('\n');
    let text = document.serialize();
    buffer.push_str(text.trim_end_matches(['\n', '\r']));
    buffer.push('\n');
}

/// Tunables of the aggregation levels.
///
/// Fields
/// -----------------
/// * `month_tag` – Prefix of the per-point and meta directories (e.g. `1979_2020_01`).
/// * `min_member_samples` – Members with fewer samples are treated as malformed and left
///   out of means (default 1). Above that, a short member only drops out of the lags
///   it lacks.
/// * `archetypes` – Cluster count of the outer pass; `None` lets the silhouette
///   selection choose it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateParams {
    pub month_tag: String,
    pub min_member_samples: usize,
    pub archetypes: Option<usize>,
}

impl AggregateParams {
    pub fn builder() -> AggregateParamsBuilder {
        AggregateParamsBuilder::default()
    }

    /// `<month_tag>_P<point>`
    pub fn point_dir(&self, root: &Utf8Path, point: usize) -> Utf8PathBuf {
        root.join(format!("{}_P{point}", self.month_tag))
    }

    /// `<month_tag>_META`
    pub fn meta_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(format!("{}_META", self.month_tag))
    }
}

impl Default for AggregateParams {
    fn default() -> Self {
        AggregateParams {
            month_tag: String::from("month"),
            min_member_samples: DEFAULT_MIN_MEMBER_SAMPLES,
            archetypes: None,
        }
    }
}

impl fmt::Display for AggregateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let archetypes = self
            .archetypes
            .map_or_else(|| "auto".to_string(), |k| k.to_string());
        if f.alternate() {
            writeln!(f, "Aggregation parameters")?;
            writeln!(f, "----------------------")?;
            writeln!(f, "  month_tag          = {}", self.month_tag)?;
            writeln!(f, "  min_member_samples = {}", self.min_member_samples)?;
            write!(f, "  archetypes         = {archetypes}")
        } else {
            write!(
                f,
                "AggregateParams(month_tag={}, min_member_samples={}, archetypes={archetypes})",
                self.month_tag, self.min_member_samples
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateParamsBuilder {
    params: AggregateParams,
}

impl AggregateParamsBuilder {
    pub fn month_tag(mut self, v: impl Into<String>) -> Self {
        self.params.month_tag = v.into();
        self
    }
    pub fn min_member_samples(mut self, v: usize) -> Self {
        self.params.min_member_samples = v;
        self
    }
    pub fn archetypes(mut self, v: usize) -> Self {
        self.params.archetypes = Some(v);
        self
    }

    pub fn build(self) -> Result<AggregateParams, TrajclustError> {
        let p = &self.params;
        if p.month_tag.is_empty() || p.month_tag.contains(['/', '\\']) {
            return Err(TrajclustError::InvalidParameter(format!(
                "month_tag must be a non-empty directory name, got '{}'",
                p.month_tag
            )));
        }
        if p.min_member_samples == 0 {
            return Err(TrajclustError::InvalidParameter(
                "min_member_samples must be >= 1".into(),
            ));
        }
        if p.archetypes == Some(0) {
            return Err(TrajclustError::InvalidParameter(
                "archetypes must be >= 1".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Runs the aggregation levels of one month with a shared clustering engine.
#[derive(Debug, Clone)]
pub struct MetaAggregator {
    params: AggregateParams,
    engine: ClusterEngine,
}

impl MetaAggregator {
    pub fn new(params: AggregateParams, engine: ClusterEngine) -> Self {
        Self { params, engine }
    }

    pub fn params(&self) -> &AggregateParams {
        &self.params
    }

    pub fn engine(&self) -> &ClusterEngine {
        &self.engine
    }

    /// Level A, see [`merge::merge_point`].
    pub fn merge_point(
        &self,
        root: &Utf8Path,
        point: usize,
        members: &[Member],
        labels: &[usize],
    ) -> Result<Vec<Utf8PathBuf>, TrajclustError> {
        merge::merge_point(root, point, members, labels, &self.params)
    }

    /// Level B, see [`meta::meta_cluster_month`].
    pub fn meta_cluster_month(&self, root: &Utf8Path) -> Result<Vec<MetaCluster>, TrajclustError> {
        meta::meta_cluster_month(root, &self.engine, &self.params)
    }

    /// Level C, see [`meta::synthesize_meta_means`].
    pub fn synthesize_meta_means(
        &self,
        root: &Utf8Path,
    ) -> Result<BatchReport, TrajclustError> {
        meta::synthesize_meta_means(root, &self.params)
    }

    /// Outer pass, see [`outer::cluster_archetypes`].
    pub fn cluster_archetypes(
        &self,
        meta_means: &[Utf8PathBuf],
        csv_path: &Utf8Path,
    ) -> Result<Vec<LabelRecord>, TrajclustError> {
        outer::cluster_archetypes(meta_means, csv_path, &self.engine, &self.params)
    }
}

#[cfg(test)]
mod aggregate_test {
    use super::*;

    const SINGLE: &str = "     1     1
    GDAS    95     1    15     0     0
     1 BACKWARD OMEGA
    95     1    15    18   40.000  -90.000    500.0
     1 PRESSURE
     1     1    95     1    15    18     0     0     0.0   40.000  -90.000    500.0    950.0
     1     1    95     1    15    17     0     0    -1.0   40.100  -90.200    510.0    951.0
";

    #[test]
    fn test_concatenation_round_trip() {
        let doc = TdumpDocument::parse(SINGLE).unwrap();
        let mut buffer = String::from("# META_CLUSTER 1  (K=2)\n");
        push_section(&mut buffer, Utf8Path::new("/a/C1_2_mean.tdump"), &doc);
        push_section(&mut buffer, Utf8Path::new("/b/C2_2_mean.tdump"), &doc);
        buffer.push_str("# from /c/broken\nnot a tdump\n");

        let members = read_concatenation(&buffer, Utf8Path::new("cat"));
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].path, "/a/C1_2_mean.tdump");
        assert_eq!(members[1].path, "/b/C2_2_mean.tdump");
        assert_eq!(members[1].document.trajectories(), doc.trajectories());
    }

    #[test]
    fn test_plain_text_is_one_section() {
        let members = read_concatenation(SINGLE, Utf8Path::new("plain.tdump"));
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].path, "plain.tdump");
        assert_eq!(members[0].trajectory().unwrap().len(), 2);
    }

    #[test]
    fn test_params() {
        assert!(AggregateParams::builder().month_tag("").build().is_err());
        assert!(AggregateParams::builder().month_tag("a/b").build().is_err());
        assert!(AggregateParams::builder().min_member_samples(0).build().is_err());
        assert!(AggregateParams::builder().archetypes(0).build().is_err());

        let p = AggregateParams::builder()
            .month_tag("1979_2020_01")
            .build()
            .unwrap();
        assert_eq!(p.point_dir(Utf8Path::new("/r"), 3), "/r/1979_2020_01_P3");
        assert_eq!(p.meta_dir(Utf8Path::new("/r")), "/r/1979_2020_01_META");
        assert_eq!(
            p.to_string(),
            "AggregateParams(month_tag=1979_2020_01, min_member_samples=1, archetypes=auto)"
        );
    }
}
