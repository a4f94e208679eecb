// THEORY:
// The `dataset` module holds the on-disk record shapes and the one place where their
// cross-record invariants are checked. Upstream pipelines write two records per point
// cloud: the points with their component labels, and the fitted Gaussians with one
// log-density each. Nothing downstream re-checks lengths or label bounds, so a record
// pair that passes `Dataset::assemble` can be normalized and colored without panics.

use serde::{Deserialize, Serialize};

use crate::core_modules::normalizer::{Covariance, Point3};
use crate::error::{Result, ServiceError};

/// Points and their component assignment, as written by the clustering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub points: Vec<Point3>,
    pub labels: Vec<i64>,
    /// Reassignment after outlier cleaning. Takes precedence over `labels`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_labels: Option<Vec<i64>>,
}

impl PointRecord {
    /// The label array in effect.
    pub fn assignment(&self) -> &[i64] {
        self.new_labels.as_deref().unwrap_or(&self.labels)
    }
}

/// Fitted Gaussian components sharing the point cloud's coordinate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianRecord {
    pub means: Vec<Point3>,
    pub covs: Vec<Covariance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub densities_log: Option<Vec<f64>>,
}

/// A single 2D detection produced by the contour stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub segments: Vec<[i64; 2]>,
    pub center: [f64; 2],
    pub intensity: f64,
}

/// Contour centers and intensities in the shape the image viewer consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub points: Vec<[i64; 2]>,
    pub intensities: Vec<f64>,
}

impl Detections {
    /// Centers are truncated to whole pixels.
    pub fn from_contours(contours: &[Contour]) -> Self {
        Self {
            points: contours
                .iter()
                .map(|c| [c.center[0] as i64, c.center[1] as i64])
                .collect(),
            intensities: contours.iter().map(|c| c.intensity).collect(),
        }
    }
}

/// Decodes a JSON record, reporting shape problems as `MalformedRecord`.
pub fn decode<T: serde::de::DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ServiceError::malformed(format!("{what}: {e}")))
}

/// A point cloud and its Gaussians after every cross-record invariant has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub points: Vec<Point3>,
    /// One valid component index per point.
    pub labels: Vec<usize>,
    pub means: Vec<Point3>,
    pub covariances: Vec<Covariance>,
    /// One log-density per component.
    pub log_densities: Vec<f64>,
}

impl Dataset {
    pub fn assemble(points: PointRecord, gaussians: GaussianRecord) -> Result<Self> {
        let components = gaussians.means.len();
        if gaussians.covs.len() != components {
            return Err(ServiceError::malformed(format!(
                "{} covariances for {components} means",
                gaussians.covs.len()
            )));
        }

        let log_densities = match gaussians.densities_log {
            Some(d) if d.len() != components => {
                return Err(ServiceError::malformed(format!(
                    "{} log-densities for {components} components",
                    d.len()
                )));
            }
            Some(d) => d,
            // Without densities every component sits on the flat midpoint.
            None => vec![0.0; components],
        };

        let raw_labels = points.assignment();
        if raw_labels.len() != points.points.len() {
            return Err(ServiceError::malformed(format!(
                "{} labels for {} points",
                raw_labels.len(),
                points.points.len()
            )));
        }
        let labels = raw_labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                usize::try_from(label)
                    .ok()
                    .filter(|&l| l < components)
                    .ok_or_else(|| {
                        ServiceError::malformed(format!(
                            "label {label} of point {i} is out of range for {components} components"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(i) = gaussians
            .means
            .iter()
            .position(|m| m.iter().any(|c| !c.is_finite()))
        {
            return Err(ServiceError::malformed(format!("mean {i} is not finite")));
        }
        if let Some(i) = gaussians
            .covs
            .iter()
            .position(|cov| cov.iter().flatten().any(|c| !c.is_finite()))
        {
            return Err(ServiceError::malformed(format!("covariance {i} is not finite")));
        }

        Ok(Self {
            points: points.points,
            labels,
            means: gaussians.means,
            covariances: gaussians.covs,
            log_densities,
        })
    }
}
