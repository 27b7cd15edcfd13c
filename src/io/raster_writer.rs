use crate::core::composite::{quantize, Composite};
use crate::types::{Band, CompositeError, CompositeResult, GeoReference, RasterStack};
use gdal::raster::Buffer;
use gdal::DriverManager;
use ndarray::{s, Array3, Axis};
use std::path::Path;

/// Writes UInt16 GeoTIFFs
pub struct RasterWriter {
    nodata: u16,
}

impl RasterWriter {
    /// `nodata` is written to reflectance bands of undefined composite pixels
    pub fn new(nodata: u16) -> Self {
        Self { nodata }
    }

    /// Write a composite; undefined pixels get `nodata` and alpha 0
    pub fn write_composite<P: AsRef<Path>>(&self, composite: &Composite, path: P) -> CompositeResult<()> {
        let data = composite.to_u16(self.nodata);
        let has_undefined = composite.undefined_count() > 0;
        self.write_cube(&data, &composite.georef, path.as_ref(), has_undefined)?;
        log::info!("Done, output: {}", path.as_ref().display());
        Ok(())
    }

    /// Write a scene without its cloud mask band
    pub fn write_stack<P: AsRef<Path>>(&self, stack: &RasterStack, path: P) -> CompositeResult<()> {
        let bands = stack.output_band_count();
        let data = stack.data().slice(s![..bands, .., ..]).mapv(quantize);
        self.write_cube(&data, stack.georef(), path.as_ref(), false)
    }

    fn write_cube(
        &self,
        data: &Array3<u16>,
        georef: &GeoReference,
        path: &Path,
        set_nodata: bool,
    ) -> CompositeResult<()> {
        if path.exists() {
            return Err(CompositeError::OutputAlreadyExists(path.to_path_buf()));
        }

        let (bands, height, width) = data.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<u16, _>(
            path,
            width as isize,
            height as isize,
            bands as isize,
        )?;

        if let Some(transform) = &georef.geo_transform {
            dataset.set_geo_transform(&transform.to_gdal())?;
        }
        if !georef.projection.is_empty() {
            dataset.set_projection(&georef.projection)?;
        }

        for (band_index, plane) in data.axis_iter(Axis(0)).enumerate() {
            let mut rasterband = dataset.rasterband(band_index as isize + 1)?;
            let flat_data: Vec<u16> = plane.iter().copied().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;

            if set_nodata && band_index != Band::Alpha.index() {
                rasterband.set_no_data_value(Some(self.nodata as f64))?;
            }
        }

        log::debug!("Wrote {} bands of {}x{} to {}", bands, width, height, path.display());
        Ok(())
    }
}

/// Create a fresh output directory, refusing to reuse an existing one
pub fn prepare_output_dir<P: AsRef<Path>>(dir: P) -> CompositeResult<()> {
    let dir = dir.as_ref();
    if dir.exists() {
        return Err(CompositeError::OutputAlreadyExists(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
