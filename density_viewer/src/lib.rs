// THEORY:
// This file is the entry point for the `density_viewer` library crate.
//
// The public surface is the `DensityPipeline` in `pipeline` together with the
// response types it produces. The building blocks it composes live in
// `core_modules` (normalizer, colormap, colorizer, dataset records) and are public
// so that other frontends, and the tests, can drive each stage on its own. The
// `store` module is the only code that touches the filesystem.

pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod store;

pub use error::{Result, ServiceError};
pub use pipeline::{DatasetSchema, DensityPipeline, PipelineConfig, PointCloudResponse};
