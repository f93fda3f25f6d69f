//! Shape-aware trajectory distance.
//!
//! Two trajectories are compared sample by sample: the distance is the sum, over every
//! lag hour, of the great-circle distance (km) between their positions at that lag. This
//! only makes sense when every trajectory of the set has the same number of samples at
//! the same lag hours, which is checked before any distance is computed.
use geo::{Distance, Haversine, Point};
use nalgebra::DMatrix;

use crate::tdump::{Trajectory, TrajectoryPoint};
use crate::trajclust_errors::DataError;

/// Great-circle distance in kilometres between two samples.
#[inline]
pub fn haversine_km(a: &TrajectoryPoint, b: &TrajectoryPoint) -> f64 {
    Haversine::distance(
        Point::new(a.longitude, a.latitude),
        Point::new(b.longitude, b.latitude),
    ) / 1000.0
}

/// Sum of per-lag great-circle distances between two aligned trajectories.
pub fn trajectory_distance(a: &Trajectory, b: &Trajectory) -> f64 {
    a.points()
        .iter()
        .zip(b.points())
        .map(|(p, q)| haversine_km(p, q))
        .sum()
}

/// Check that every trajectory has the sample count and lag sequence of the first one.
///
/// Return
/// ----------
/// * [`DataError::Misaligned`] naming the first offending index.
pub fn check_alignment(trajectories: &[Trajectory]) -> Result<(), DataError> {
    let Some(reference) = trajectories.first() else {
        return Ok(());
    };
    for (index, t) in trajectories.iter().enumerate().skip(1) {
        if t.len() != reference.len() {
            return Err(DataError::Misaligned {
                index,
                reason: format!("{} samples instead of {}", t.len(), reference.len()),
            });
        }
        if let Some((lag, expected)) = t.lags().zip(reference.lags()).find(|(a, b)| a != b) {
            return Err(DataError::Misaligned {
                index,
                reason: format!("lag {lag} where {expected} was expected"),
            });
        }
    }
    Ok(())
}

/// Full pairwise distance matrix (symmetric, zero diagonal).
pub fn distance_matrix(trajectories: &[Trajectory]) -> Result<DMatrix<f64>, DataError> {
    check_alignment(trajectories)?;
    let n = trajectories.len();
    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let v = trajectory_distance(&trajectories[i], &trajectories[j]);
            d[(i, j)] = v;
            d[(j, i)] = v;
        }
    }
    Ok(d)
}

/// Upper triangle of a square matrix, row by row (`(0,1), (0,2), …, (n-2,n-1)`).
pub fn condensed(d: &DMatrix<f64>) -> Vec<f64> {
    let n = d.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(d[(i, j)]);
        }
    }
    out
}

#[cfg(test)]
mod distance_test {
    use super::*;
    use approx::assert_relative_eq;

    fn traj(points: &[(f64, f64)]) -> Trajectory {
        Trajectory::new(
            1,
            points
                .iter()
                .enumerate()
                .map(|(h, &(lat, lon))| TrajectoryPoint::new(-(h as i32), lat, lon, 850.0))
                .collect(),
        )
    }

    #[test]
    fn test_one_degree_of_meridian() {
        let a = TrajectoryPoint::new(0, 0.0, 0.0, 0.0);
        let b = TrajectoryPoint::new(0, 1.0, 0.0, 0.0);
        assert_relative_eq!(haversine_km(&a, &b), 111.195, epsilon = 1e-2);
    }

    #[test]
    fn test_matrix_properties() {
        let set = vec![
            traj(&[(40.0, -90.0), (41.0, -91.0)]),
            traj(&[(40.0, -90.0), (42.0, -93.0)]),
            traj(&[(10.0, 10.0), (11.0, 12.0)]),
        ];
        let d = distance_matrix(&set).unwrap();
        for i in 0..3 {
            assert_eq!(d[(i, i)], 0.0);
            for j in 0..3 {
                assert_eq!(d[(i, j)], d[(j, i)]);
            }
        }
        assert!(d[(0, 1)] < d[(0, 2)]);
        assert_eq!(condensed(&d), vec![d[(0, 1)], d[(0, 2)], d[(1, 2)]]);
    }

    #[test]
    fn test_identical_trajectories_zero_matrix() {
        let t = traj(&[(40.0, -90.0), (41.0, -91.0), (42.0, -92.0)]);
        let d = distance_matrix(&[t.clone(), t.clone(), t]).unwrap();
        assert!(d.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_misaligned() {
        let set = vec![
            traj(&[(40.0, -90.0), (41.0, -91.0)]),
            traj(&[(40.0, -90.0)]),
        ];
        assert!(matches!(
            distance_matrix(&set),
            Err(DataError::Misaligned { index: 1, .. })
        ));

        let shifted = Trajectory::new(
            1,
            vec![
                TrajectoryPoint::new(0, 40.0, -90.0, 0.0),
                TrajectoryPoint::new(-2, 41.0, -91.0, 0.0),
            ],
        );
        assert!(matches!(
            check_alignment(&[set[0].clone(), shifted]),
            Err(DataError::Misaligned { index: 1, .. })
        ));
    }
}
