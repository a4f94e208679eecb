pub mod colorizer;
pub mod colormap;
pub mod dataset;
pub mod image_helper;
pub mod normalizer;
