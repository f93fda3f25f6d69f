//! # Batch filters over split trajectory trees
//!
//! Both filters run over the `root/<year>/P<n>/<file>` tree produced by
//! [`split_tree`](crate::split::split_tree) and report one
//! [`FileOutcome`](crate::batch::FileOutcome) per visited file.
//!
//! * [`completeness`] – Removes (or reports) trajectories that stop before the end of the
//!   modeled window.
//! * [`humidity`] – Keeps the trajectories along which specific humidity decreases
//!   toward the release point and lists them in the INFILE of the external cluster tool.
pub mod completeness;
pub mod humidity;

pub use completeness::{filter_incomplete, CompletenessMode, CompletenessParams};
pub use humidity::{filter_humidity, HumidityParams};
