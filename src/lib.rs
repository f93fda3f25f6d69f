pub mod aggregate;
pub mod batch;
pub mod cluster;
pub mod constants;
pub mod convert;
pub mod filters;
pub mod manifest;
mod progress;
pub mod split;
pub mod tdump;
pub mod trajclust_errors;

pub use aggregate::{AggregateParams, MetaAggregator};
pub use batch::{BatchReport, FileOutcome};
pub use cluster::{ClusterEngine, ClusterParams, Linkage};
pub use manifest::ProcessedManifest;
pub use split::{split_document, split_tree, SplitParams};
pub use tdump::{TdumpDocument, Trajectory, TrajectoryPoint};
pub use trajclust_errors::{DataError, FormatError, TrajclustError};
