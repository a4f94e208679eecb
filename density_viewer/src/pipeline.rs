// THEORY:
// The `pipeline` module is the top-level API of the crate. It turns a dataset
// identifier and an optional colormap name into the complete JSON-ready response the
// viewer renders, and it is the only module that knows the order of the stages:
//
//   resolve colormap → load + validate records → normalize cloud → move Gaussians
//   into the same frame → colorize by density → assemble response
//
// Every check that can fail runs before the response is built, so a caller either gets
// a whole response or a `ServiceError`, never a half-filled one. The three historical
// backend flavors differ only in where records come from, which `DatasetSchema` captures.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core_modules::colorizer::{self, DensityRange};
use crate::core_modules::colormap::{Colormap, ColormapRegistry, Rgb, RgbBytes};
use crate::core_modules::dataset::Dataset;
use crate::core_modules::normalizer::{self, Covariance, Point3};
use crate::error::{Result, ServiceError};
use crate::store::DataStore;

pub const NOTHING_SELECTED: &str = "Nothing selected";

/// Which dataset family a deployment serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSchema {
    /// One fixed point cloud and Gaussian record pair.
    SingleFile,
    /// Many point clouds, one subdirectory each, picked by name.
    MultiDataset,
    /// 2D images with contour detections; no point clouds.
    ImageContour,
}

impl DatasetSchema {
    pub fn serves_point_clouds(&self) -> bool {
        !matches!(self, DatasetSchema::ImageContour)
    }

    pub fn default_explanation(&self) -> &'static str {
        match self {
            DatasetSchema::SingleFile => {
                "Points are colored by the log-density of the Gaussian component they belong to."
            }
            DatasetSchema::MultiDataset => {
                "Each point takes the color of its Gaussian component. Color encodes the \
                 component's log-density between the minimum and maximum shown on the legend."
            }
            DatasetSchema::ImageContour => {
                "Contour centers detected in the image, with their intensities."
            }
        }
    }
}

impl fmt::Display for DatasetSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetSchema::SingleFile => "single-file",
            DatasetSchema::MultiDataset => "multi-dataset",
            DatasetSchema::ImageContour => "image-contour",
        })
    }
}

impl FromStr for DatasetSchema {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-file" | "single" => Ok(DatasetSchema::SingleFile),
            "multi-dataset" | "multi" => Ok(DatasetSchema::MultiDataset),
            "image-contour" | "image" => Ok(DatasetSchema::ImageContour),
            other => Err(format!(
                "unknown schema '{other}', expected single-file, multi-dataset or image-contour"
            )),
        }
    }
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schema: DatasetSchema,
    /// Point record of a single-file deployment, relative to the data root.
    pub point_file: PathBuf,
    /// Gaussian record of a single-file deployment, relative to the data root.
    pub gaussian_file: PathBuf,
    pub explanation_text: String,
}

impl PipelineConfig {
    pub fn for_schema(schema: DatasetSchema) -> Self {
        Self {
            schema,
            point_file: PathBuf::from("pointcloud.json"),
            gaussian_file: PathBuf::from("pointcloud_gaussians.json"),
            explanation_text: schema.default_explanation().to_string(),
        }
    }
}

/// Gaussian means and covariances in the normalized frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianSummary {
    pub means: Vec<Point3>,
    pub covariances: Vec<Covariance>,
}

/// The `get-pointcloud` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudResponse {
    pub point_cloud: Vec<Point3>,
    /// Per-point colors with channels in [0, 1], parallel to `point_cloud`.
    pub colors: Vec<Rgb>,
    pub min_density: f64,
    pub max_density: f64,
    pub explanation_text: String,
    /// 101 legend samples with byte channels.
    pub color_gradient: Vec<RgbBytes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaussians: Option<GaussianSummary>,
}

impl PointCloudResponse {
    /// The response for "no dataset selected". The legend is still filled in.
    pub fn empty(colormap: &Colormap) -> Self {
        Self {
            point_cloud: Vec::new(),
            colors: Vec::new(),
            min_density: DensityRange::EMPTY.min,
            max_density: DensityRange::EMPTY.max,
            explanation_text: NOTHING_SELECTED.to_string(),
            color_gradient: colorizer::gradient(colormap),
            labels: Vec::new(),
            gaussians: None,
        }
    }
}

/// Normalizes and colors a validated dataset.
pub fn assemble_response(
    dataset: &Dataset,
    colormap: &Colormap,
    explanation_text: &str,
) -> Result<PointCloudResponse> {
    let (point_cloud, transform) = normalizer::normalize(&dataset.points)?;
    let means = normalizer::apply_transform(&dataset.means, &transform);
    let covariances = normalizer::scale_covariances(&dataset.covariances, &transform);
    let coloring = colorizer::colorize(&dataset.log_densities, &dataset.labels, colormap)?;

    Ok(PointCloudResponse {
        point_cloud,
        colors: coloring.colors,
        min_density: coloring.range.min,
        max_density: coloring.range.max,
        explanation_text: explanation_text.to_string(),
        color_gradient: coloring.gradient,
        labels: dataset.labels.clone(),
        gaussians: Some(GaussianSummary { means, covariances }),
    })
}

/// The normalization & coloring service: configuration, data and colormaps, built once.
#[derive(Debug, Clone)]
pub struct DensityPipeline {
    config: PipelineConfig,
    store: DataStore,
    colormaps: ColormapRegistry,
}

impl DensityPipeline {
    pub fn new(config: PipelineConfig, store: DataStore, colormaps: ColormapRegistry) -> Self {
        Self {
            config,
            store,
            colormaps,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn colormaps(&self) -> &ColormapRegistry {
        &self.colormaps
    }

    /// Builds the point-cloud response for `name` colored with `colormap`.
    ///
    /// A missing or blank `name` yields [`PointCloudResponse::empty`], except in
    /// single-file deployments which always serve their one dataset.
    pub fn point_cloud(
        &self,
        name: Option<&str>,
        colormap: Option<&str>,
    ) -> Result<PointCloudResponse> {
        let colormap = self.colormaps.resolve(colormap)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let dataset = match (self.config.schema, name) {
            (DatasetSchema::SingleFile, _) => self
                .store
                .load_fixed_dataset(&self.config.point_file, &self.config.gaussian_file)?,
            (_, None) => return Ok(PointCloudResponse::empty(colormap)),
            (DatasetSchema::MultiDataset, Some(name)) => self.store.load_named_dataset(name)?,
            (DatasetSchema::ImageContour, Some(name)) => {
                return Err(ServiceError::DatasetNotFound { name: name.to_string() });
            }
        };

        let response = assemble_response(&dataset, colormap, &self.config.explanation_text)?;
        tracing::info!(
            dataset = name.unwrap_or("<fixed>"),
            colormap = colormap.name(),
            points = response.point_cloud.len(),
            components = dataset.means.len(),
            "assembled point cloud response"
        );
        Ok(response)
    }
}
