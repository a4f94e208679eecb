// THEORY:
// The `DataStore` is the read-only window onto the data directory. It knows the file
// layout of each dataset family and nothing about normalization or color. Everything
// it returns is either a validated record or a `ServiceError` that already says
// whether the data was missing, malformed, or unreadable.
//
// Dataset identifiers come straight from query strings, so a name is only accepted
// when it is a single plain path component. Anything else is reported as not found.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::core_modules::dataset::{
    decode, Contour, Dataset, Detections, GaussianRecord, PointRecord,
};
use crate::core_modules::image_helper;
use crate::error::{Result, ServiceError};

pub const POINTS_FILE: &str = "points.json";
pub const GAUSSIANS_FILE: &str = "gaussians.json";
pub const IMAGE_FILE: &str = "image.png";
pub const DETECTIONS_FILE: &str = "detections.json";

#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Point clouds ---

    /// Loads the record pair of a named dataset: `<root>/<name>/{points,gaussians}.json`.
    pub fn load_named_dataset(&self, name: &str) -> Result<Dataset> {
        let dir = self.dataset_dir(name)?;
        self.load_record_pair(name, &dir.join(POINTS_FILE), &dir.join(GAUSSIANS_FILE))
    }

    /// Loads the fixed record pair of a single-file deployment, relative to the root.
    pub fn load_fixed_dataset(&self, point_file: &Path, gaussian_file: &Path) -> Result<Dataset> {
        let name = point_file.display().to_string();
        self.load_record_pair(&name, &self.root.join(point_file), &self.root.join(gaussian_file))
    }

    fn load_record_pair(
        &self,
        name: &str,
        points_path: &Path,
        gaussians_path: &Path,
    ) -> Result<Dataset> {
        let points: PointRecord = decode(
            &record_label(points_path),
            &self.read(name, points_path)?,
        )?;
        let gaussians: GaussianRecord = decode(
            &record_label(gaussians_path),
            &self.read(name, gaussians_path)?,
        )?;
        tracing::debug!(
            dataset = name,
            points = points.points.len(),
            components = gaussians.means.len(),
            "loaded record pair"
        );
        Dataset::assemble(points, gaussians)
    }

    /// Sorted names of every subdirectory holding both point-cloud records.
    pub fn dataset_names(&self) -> Result<Vec<String>> {
        self.names_with(&[POINTS_FILE, GAUSSIANS_FILE])
    }

    // --- Images and detections ---

    /// Sorted names of every subdirectory holding both an image and its detections.
    pub fn image_names(&self) -> Result<Vec<String>> {
        self.names_with(&[DETECTIONS_FILE, IMAGE_FILE])
    }

    /// The dataset's image, re-encoded as PNG.
    pub fn image_png(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dataset_dir(name)?.join(IMAGE_FILE);
        image_helper::load_png(&path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == ErrorKind::NotFound => {
                ServiceError::DatasetNotFound { name: name.to_string() }
            }
            image::ImageError::IoError(io) => ServiceError::Io { path, source: io },
            other => ServiceError::malformed(format!("{IMAGE_FILE}: {other}")),
        })
    }

    pub fn detections(&self, name: &str) -> Result<Detections> {
        let path = self.dataset_dir(name)?.join(DETECTIONS_FILE);
        let contours: Vec<Contour> = decode(DETECTIONS_FILE, &self.read(name, &path)?)?;
        Ok(Detections::from_contours(&contours))
    }

    // --- Helpers ---

    fn dataset_dir(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => Ok(self.root.join(part)),
            _ => Err(ServiceError::DatasetNotFound { name: name.to_string() }),
        }
    }

    fn read(&self, name: &str, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ServiceError::DatasetNotFound { name: name.to_string() },
            _ => ServiceError::Io {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    fn names_with(&self, required: &[&str]) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|source| ServiceError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| required.iter().all(|file| entry.path().join(file).is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// File name used to identify a record in error messages.
fn record_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
