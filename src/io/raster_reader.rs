use crate::types::{
    BandCube, Collection, CompositeError, CompositeResult, GeoReference, GeoTransform, RasterStack,
};
use gdal::Dataset;
use std::path::{Path, PathBuf};

/// File extensions picked up when loading a directory
const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Loads multi-band GeoTIFF scenes
pub struct RasterReader;

impl RasterReader {
    /// Read every band of one raster as a (band, row, col) cube.
    ///
    /// The label is the file name; geotransform and projection are carried
    /// through unmodified.
    pub fn read_stack<P: AsRef<Path>>(path: P) -> CompositeResult<RasterStack> {
        let path = path.as_ref();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        log::debug!("Reading raster: {}", path.display());
        let dataset = Dataset::open(path)?;

        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;
        log::debug!("{}: {}x{}, {} bands", label, width, height, band_count);

        let mut data = BandCube::zeros((band_count, height, width));
        for band_index in 0..band_count {
            let rasterband = dataset.rasterband(band_index as isize + 1)?;
            let buffer = rasterband.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
            if buffer.data.len() != width * height {
                return Err(CompositeError::Processing(format!(
                    "{}: band {} returned {} values, expected {}",
                    label,
                    band_index + 1,
                    buffer.data.len(),
                    width * height
                )));
            }
            let mut plane = data.index_axis_mut(ndarray::Axis(0), band_index);
            for (dst, &src) in plane.iter_mut().zip(buffer.data.iter()) {
                *dst = src as f32;
            }
        }

        let georef = GeoReference {
            geo_transform: dataset.geo_transform().ok().map(GeoTransform::from_gdal),
            projection: dataset.projection(),
        };

        RasterStack::new(label, data, georef)
    }

    /// GeoTIFF files of a directory in file-name order.
    ///
    /// Anything else (GDAL `.aux.xml` sidecars, notes, subdirectories) is
    /// skipped.
    pub fn list_rasters<P: AsRef<Path>>(dir: P) -> CompositeResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if is_geotiff(&path) {
                paths.push(path);
            } else {
                log::warn!("Skipping non-raster file {}", path.display());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load a directory of co-registered scenes into a validated collection
    pub fn load_collection<P: AsRef<Path>>(dir: P) -> CompositeResult<Collection> {
        log::info!("Loading scenes from {}", dir.as_ref().display());
        let stacks = Self::list_rasters(dir)?
            .iter()
            .map(Self::read_stack)
            .collect::<CompositeResult<Vec<_>>>()?;
        log::info!("Loaded {} scenes", stacks.len());
        Collection::new(stacks)
    }
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RASTER_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
