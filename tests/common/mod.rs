#![allow(dead_code)]

use approx::assert_relative_eq;
use camino::{Utf8Path, Utf8PathBuf};
use trajclust::TrajectoryPoint;

/// Shape of the synthetic runs written by [`tdump_text`].
pub struct SyntheticRun<'a> {
    /// Release position of every origin.
    pub origins: &'a [(f64, f64)],
    /// Last lag hour, written as `-last_lag`.
    pub last_lag: i32,
    /// Specific-humidity change per hour back in time; `None` writes no humidity column.
    pub humidity_slope: Option<f64>,
}

/// Multi-origin backward run drifting south-west by a fixed step per hour.
pub fn tdump_text(run: &SyntheticRun<'_>) -> String {
    let mut text = String::from("     1     1\n    GDAS    95     1    15     0     0\n");
    text.push_str(&format!("{:6} BACKWARD OMEGA\n", run.origins.len()));
    for (lat, lon) in run.origins {
        text.push_str(&format!("    95     1    15    18 {lat:8.3} {lon:8.3}    500.0\n"));
    }
    match run.humidity_slope {
        Some(_) => text.push_str("     2 PRESSURE SPCHUMID\n"),
        None => text.push_str("     1 PRESSURE\n"),
    }
    for h in 0..=run.last_lag {
        for (i, (lat, lon)) in run.origins.iter().enumerate() {
            let (la, lo) = (lat - 0.01 * h as f64, lon - 0.02 * h as f64);
            text.push_str(&format!(
                "{:6}     1    95     1    15    18     0     0 {:7.1} {la:8.3} {lo:8.3} {:8.1}    900.0",
                i + 1,
                -(h as f64),
                500.0 + h as f64,
            ));
            if let Some(slope) = run.humidity_slope {
                text.push_str(&format!("{:9.1}", 5.0 + slope * h as f64));
            }
            text.push('\n');
        }
    }
    text
}

pub fn write(path: &Utf8Path, text: &str) -> Utf8PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, text).unwrap();
    path.to_path_buf()
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

pub fn assert_point_close(p: &TrajectoryPoint, lat: f64, lon: f64, pressure: f64, epsilon: f64) {
    assert_relative_eq!(p.latitude, lat, epsilon = epsilon);
    assert_relative_eq!(p.longitude, lon, epsilon = epsilon);
    assert_relative_eq!(p.pressure_or_height, pressure, epsilon = epsilon);
}
