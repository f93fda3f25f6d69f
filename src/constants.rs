//! # Constants and type definitions for trajclust
//!
//! This module centralizes the **format constants**, **default thresholds**, and **common
//! type aliases** shared by the tdump reader, the batch filters, the clustering engine and
//! the aggregation levels.
//!
//! ## Overview
//!
//! - Modeled back-trajectory window (0 … −240 h)
//! - Column-sniffing sample size and data-row field offsets
//! - Default selection thresholds (keep-hours, elbow thresholds, silhouette range)
//! - Type aliases for labels and lag hours

use std::collections::HashMap;

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Trajectory window
// -------------------------------------------------------------------------------------------------

/// Modeled trajectory duration in hours (absolute value of the last lag hour).
pub const DEFAULT_DURATION_HOURS: i32 = 240;

/// Number of hourly samples of a complete trajectory (lags 0, −1, …, −240).
pub const COMPLETE_SAMPLE_COUNT: usize = DEFAULT_DURATION_HOURS as usize + 1;

// -------------------------------------------------------------------------------------------------
// Format layout
// -------------------------------------------------------------------------------------------------

/// Number of data rows inspected when probing the trajectory-id column.
pub const ID_PROBE_ROWS: usize = 200;

/// Offsets of the data-row fields, relative to the trajectory-id column.
pub const GRID_OFFSET: usize = 1;
pub const YEAR_OFFSET: usize = 2;
pub const FORECAST_HOUR_OFFSET: usize = 7;
pub const LAG_OFFSET: usize = 8;
pub const LAT_OFFSET: usize = 9;
pub const LON_OFFSET: usize = 10;
pub const PRESSURE_OFFSET: usize = 11;
pub const EXTRA_OFFSET: usize = 12;

/// Marker names that identify a specific-humidity diagnostic column.
pub const HUMIDITY_NAMES: [&str; 3] = ["SPCHUMID", "SPHU", "SPCHUM"];

/// Two-digit years at or above this value belong to the 1900s, the others to the 2000s.
pub const CENTURY_CUTOVER: u32 = 50;

/// Forecast-hour marker written on synthesized rows.
pub const SYNTHETIC_FORECAST_HOUR: i64 = -88;

// -------------------------------------------------------------------------------------------------
// Selection defaults
// -------------------------------------------------------------------------------------------------

/// Release hours kept by the humidity filter when none are requested.
pub const DEFAULT_KEEP_HOURS: [u32; 2] = [6, 18];

/// Upper bound of the silhouette candidate range.
pub const DEFAULT_MAX_K: usize = 10;

/// Elbow-mode default thresholds (percent).
pub const DEFAULT_ELBOW_ABS_PCT: f64 = 15.0;
pub const DEFAULT_ELBOW_JUMP_PCT: f64 = 10.0;

/// Elbow-mode results are never below this cluster count.
pub const MIN_ELBOW_K: usize = 3;

/// Members shorter than this are treated as malformed during mean synthesis; the
/// default only drops members without any sample.
pub const DEFAULT_MIN_MEMBER_SAMPLES: usize = 1;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Signed hours elapsed since release (0, −1, …).
pub type LagHour = i32;

/// Cluster label, numbered from 1.
pub type ClusterLabel = usize;

/// One label per input, index-aligned with the clustered inputs.
pub type Labels = Vec<ClusterLabel>;

/// Fast map used for grouping keyed by labels, points or lags.
pub type FastMap<K, V> = HashMap<K, V, RandomState>;
