//! terrastack: per-pixel compositing of multispectral satellite stacks
//!
//! Takes a temporal stack of co-registered Sentinel-2 style scenes (six
//! reflectance bands plus alpha), flags clouds, ranks scenes by spectral
//! indices and reduces the stack to mean, min, max, median, greenest and
//! percentile-greenest composites while honoring per-pixel validity.

pub mod types;
pub mod config;
pub mod core;
#[cfg(feature = "gdal-io")]
pub mod io;

// Re-export main types and functions for easier access
pub use types::{
    Band, BandCube, Collection, CompositeError, CompositeResult, GeoReference, GeoTransform,
    RasterStack,
};
pub use config::PipelineConfig;
pub use core::{
    CloudClassifier, Composite, CompositePolicy, Compositor, RankingMetric, SceneRanker,
    SpectralIndex, ValidityMask,
};

#[cfg(feature = "gdal-io")]
pub use io::{RasterReader, RasterWriter};
