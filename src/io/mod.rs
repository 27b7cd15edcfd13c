//! GDAL-backed raster reading and writing

pub mod raster_reader;
pub mod raster_writer;

pub use raster_reader::RasterReader;
pub use raster_writer::{prepare_output_dir, RasterWriter};
