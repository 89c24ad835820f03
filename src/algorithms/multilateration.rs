//! Four-anchor least-squares multilateration
//!
//! Subtracting the range equation of the reference anchor (index 0) from
//! that of anchor i linearises the problem:
//!
//! ```text
//! (xi - x1)·x + (yi - y1)·y = ½·[(xi² + yi² - di²) - (x1² + y1² - d1²)]
//! ```
//!
//! Three such rows form an over-determined 3×2 system `A·p = b`, solved in
//! the least-squares sense through an SVD of `A`.

use crate::core::{AnchorConfiguration, DistanceVector, PositionEstimate, ANCHOR_COUNT, DEFAULT_MAX_RANGE};
use nalgebra::{Matrix3x2, Vector3};

/// Ratio of smallest to largest singular value below which `A` is
/// treated as rank deficient
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-9;

/// Solver output with its fit quality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub position: PositionEstimate,
    /// RMS residual of the linearised system (squared device units)
    pub residual_rms: f64,
}

/// Stateless multilateration solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multilateration {
    /// Distances outside `(0, max_range]` are rejected before solving
    pub max_range: u32,
    pub rank_tolerance: f64,
}

impl Default for Multilateration {
    fn default() -> Self {
        Self {
            max_range: DEFAULT_MAX_RANGE,
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
        }
    }
}

impl Multilateration {
    pub fn new(max_range: u32) -> Self {
        Self {
            max_range,
            ..Self::default()
        }
    }

    /// Estimate the tag position, or `None` for out-of-range distances and
    /// degenerate geometry
    pub fn solve(
        &self,
        distances: &DistanceVector,
        anchors: &AnchorConfiguration,
    ) -> Option<PositionEstimate> {
        self.solve_detailed(distances, anchors).map(|s| s.position)
    }

    pub fn solve_detailed(
        &self,
        distances: &DistanceVector,
        anchors: &AnchorConfiguration,
    ) -> Option<Solution> {
        if !distances.is_within_range(self.max_range) {
            return None;
        }

        let (a, b) = linear_system(distances, anchors);

        let svd = a.svd(true, true);
        let largest = svd.singular_values.max();
        if !largest.is_finite() || largest <= 0.0 {
            return None;
        }
        let eps = largest * self.rank_tolerance;
        if svd.singular_values.min() <= eps {
            return None;
        }

        let p = svd.solve(&b, eps).ok()?;
        let position = PositionEstimate::new(p[0], p[1]);
        if !position.is_finite() {
            return None;
        }

        let residual = a * p - b;
        Some(Solution {
            position,
            residual_rms: (residual.norm_squared() / (ANCHOR_COUNT - 1) as f64).sqrt(),
        })
    }
}

/// Solve with the default range limit
pub fn solve(distances: &DistanceVector, anchors: &AnchorConfiguration) -> Option<PositionEstimate> {
    Multilateration::default().solve(distances, anchors)
}

fn linear_system(
    distances: &DistanceVector,
    anchors: &AnchorConfiguration,
) -> (Matrix3x2<f64>, Vector3<f64>) {
    let positions = anchors.positions();
    let d = (*distances.as_array()).map(f64::from);

    let reference = positions[0];
    let k1 = reference.x.powi(2) + reference.y.powi(2) - d[0].powi(2);

    let mut a = Matrix3x2::zeros();
    let mut b = Vector3::zeros();
    for i in 1..ANCHOR_COUNT {
        let row = i - 1;
        let anchor = positions[i];
        a[(row, 0)] = anchor.x - reference.x;
        a[(row, 1)] = anchor.y - reference.y;
        b[row] = 0.5 * ((anchor.x.powi(2) + anchor.y.powi(2) - d[i].powi(2)) - k1);
    }
    (a, b)
}
