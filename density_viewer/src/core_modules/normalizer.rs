// THEORY:
// The `normalizer` module puts a raw point cloud and every geometric primitive that
// shares its coordinate frame (Gaussian means and covariances) into one common,
// viewer-friendly frame.
//
// Key architectural principles:
// 1.  **Fit Once, Apply Everywhere**: The transform is fitted on the point cloud only.
//     Means and covariances never influence it; they are pushed through the exact same
//     `(center, scale)` pair so that ellipsoids stay glued to the points they summarize.
// 2.  **Bounding-Box Frame**: The center is the midpoint of the per-axis bounding box and
//     the scale is its single largest extent. After normalization the largest axis spans
//     exactly [-50, 50] (100 units) and every other axis fits inside it.
// 3.  **Explicit Degeneracy**: A cloud with zero extent (one point, coincident points, or
//     no points at all) cannot be scaled. Instead of dividing by zero the transform
//     falls back to unit scale around the computed center and says so.

use crate::error::{Result, ServiceError};

pub type Coordinate = f64;
pub type Point3 = [Coordinate; 3];
pub type Covariance = [[Coordinate; 3]; 3];

/// Width of the interval the largest axis is mapped onto.
pub const NORMALIZED_SPAN: f64 = 100.0;

/// The centering and scaling pair fitted on a raw point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationTransform {
    /// Midpoint of the per-axis minimum and maximum.
    pub center: Point3,
    /// Largest per-axis extent (`max - min`). `1.0` when the cloud is degenerate.
    pub scale: f64,
    degenerate: bool,
}

impl NormalizationTransform {
    /// Fits the transform on `points`.
    ///
    /// Fails on non-finite coordinates and on clouds whose extent overflows `f64`. An
    /// empty or zero-extent cloud yields a unit-scale transform for which
    /// [`is_degenerate`](Self::is_degenerate) is true.
    pub fn fit(points: &[Point3]) -> Result<Self> {
        if let Some(index) = points.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(ServiceError::malformed(format!(
                "point {index} has a non-finite coordinate"
            )));
        }

        let Some(first) = points.first() else {
            return Ok(Self {
                center: [0.0; 3],
                scale: 1.0,
                degenerate: true,
            });
        };

        let (min_v, max_v) = points.iter().fold((*first, *first), |(mut lo, mut hi), p| {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(p[axis]);
                hi[axis] = hi[axis].max(p[axis]);
            }
            (lo, hi)
        });

        // Halve before adding so two large coordinates of the same sign cannot overflow.
        let center = [
            min_v[0] / 2.0 + max_v[0] / 2.0,
            min_v[1] / 2.0 + max_v[1] / 2.0,
            min_v[2] / 2.0 + max_v[2] / 2.0,
        ];
        let extent = (0..3)
            .map(|axis| max_v[axis] - min_v[axis])
            .fold(0.0_f64, f64::max);

        if !extent.is_finite() {
            return Err(ServiceError::malformed(
                "point cloud extent exceeds the floating-point range",
            ));
        }

        if extent > 0.0 {
            Ok(Self {
                center,
                scale: extent,
                degenerate: false,
            })
        } else {
            Ok(Self {
                center,
                scale: 1.0,
                degenerate: true,
            })
        }
    }

    /// True when the fitted cloud had no usable extent and unit scale was substituted.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Maps a single point into the normalized frame.
    pub fn apply(&self, point: &Point3) -> Point3 {
        [
            (point[0] - self.center[0]) / self.scale * NORMALIZED_SPAN,
            (point[1] - self.center[1]) / self.scale * NORMALIZED_SPAN,
            (point[2] - self.center[2]) / self.scale * NORMALIZED_SPAN,
        ]
    }

    /// Rescales a covariance matrix. Matrices do not translate, so no centering.
    ///
    /// The entries are divided by `scale`, not `scale²`. A covariance carries squared
    /// length units so this is dimensionally off, but existing clients draw their
    /// ellipsoids from exactly these numbers.
    pub fn apply_covariance(&self, covariance: &Covariance) -> Covariance {
        covariance.map(|row| row.map(|c| c / self.scale * NORMALIZED_SPAN))
    }
}

/// Fits a transform on `points` and returns the normalized cloud alongside it.
pub fn normalize(points: &[Point3]) -> Result<(Vec<Point3>, NormalizationTransform)> {
    let transform = NormalizationTransform::fit(points)?;
    if transform.is_degenerate() && !points.is_empty() {
        tracing::warn!(
            count = points.len(),
            "point cloud has zero extent, normalizing with unit scale"
        );
    }
    Ok((apply_transform(points, &transform), transform))
}

/// Applies an already fitted transform to another point set in the same frame.
pub fn apply_transform(points: &[Point3], transform: &NormalizationTransform) -> Vec<Point3> {
    points.iter().map(|p| transform.apply(p)).collect()
}

/// Applies an already fitted transform to a set of covariance matrices.
pub fn scale_covariances(
    covariances: &[Covariance],
    transform: &NormalizationTransform,
) -> Vec<Covariance> {
    covariances
        .iter()
        .map(|c| transform.apply_covariance(c))
        .collect()
}
