use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Radiometric value of a single band sample (u16 source range, held as f32)
pub type BandValue = f32;

/// 3D band cube (band x row x col)
pub type BandCube = Array3<BandValue>;

/// Per-pixel boolean grid (row x col)
pub type BoolGrid = Array2<bool>;

/// Number of bands in a stack before the cloud mask has been appended
pub const BASE_BAND_COUNT: usize = 7;

/// Number of bands in a stack once the cloud mask has been appended
pub const MASKED_BAND_COUNT: usize = 8;

/// Cloud mask value of a cloud pixel
pub const CLOUD_MASK_CLOUD: BandValue = 0.0;

/// Cloud mask value of a clear (or unclassified) pixel
pub const CLOUD_MASK_CLEAR: BandValue = 65535.0;

/// Fixed band layout of every input scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Red,
    Green,
    Blue,
    Nir,
    Swir1,
    Swir2,
    /// Sensor validity, > 0 where the pixel carries data
    Alpha,
    /// [`CLOUD_MASK_CLOUD`] or [`CLOUD_MASK_CLEAR`]
    CloudMask,
}

impl Band {
    /// Reflectance channels in storage order
    pub const REFLECTANCE: [Band; 6] = [
        Band::Red,
        Band::Green,
        Band::Blue,
        Band::Nir,
        Band::Swir1,
        Band::Swir2,
    ];

    /// Zero-based position of the band in a stack
    pub const fn index(self) -> usize {
        match self {
            Band::Red => 0,
            Band::Green => 1,
            Band::Blue => 2,
            Band::Nir => 3,
            Band::Swir1 => 4,
            Band::Swir2 => 5,
            Band::Alpha => 6,
            Band::CloudMask => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Band> {
        match index {
            0 => Some(Band::Red),
            1 => Some(Band::Green),
            2 => Some(Band::Blue),
            3 => Some(Band::Nir),
            4 => Some(Band::Swir1),
            5 => Some(Band::Swir2),
            6 => Some(Band::Alpha),
            7 => Some(Band::CloudMask),
            _ => None,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Red => write!(f, "Red"),
            Band::Green => write!(f, "Green"),
            Band::Blue => write!(f, "Blue"),
            Band::Nir => write!(f, "NIR"),
            Band::Swir1 => write!(f, "SWIR1"),
            Band::Swir2 => write!(f, "SWIR2"),
            Band::Alpha => write!(f, "Alpha"),
            Band::CloudMask => write!(f, "CloudMask"),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Spatial reference carried through the pipeline untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub geo_transform: Option<GeoTransform>,
    /// Projection as WKT, empty when the source had none
    pub projection: String,
}

/// One multi-band scene: bands 0-5 reflectance, 6 alpha, optional 7 cloud mask
#[derive(Debug, Clone)]
pub struct RasterStack {
    label: String,
    data: BandCube,
    georef: GeoReference,
}

impl RasterStack {
    /// Build a stack from a (band, row, col) cube.
    ///
    /// The cube must hold the six reflectance bands plus alpha, and may hold
    /// the cloud mask as an eighth band.
    pub fn new(label: impl Into<String>, data: BandCube, georef: GeoReference) -> CompositeResult<Self> {
        let label = label.into();
        let bands = data.len_of(Axis(0));
        if bands != BASE_BAND_COUNT && bands != MASKED_BAND_COUNT {
            return Err(CompositeError::PreconditionViolation {
                label,
                reason: format!(
                    "expected {} or {} bands, found {}",
                    BASE_BAND_COUNT, MASKED_BAND_COUNT, bands
                ),
            });
        }
        Ok(Self { label, data, georef })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> ArrayView3<'_, BandValue> {
        self.data.view()
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    pub fn band_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Spatial shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    pub fn has_cloud_mask(&self) -> bool {
        self.band_count() > Band::CloudMask.index()
    }

    /// Bands that make it into a composite: everything except the cloud mask
    pub fn output_band_count(&self) -> usize {
        self.band_count().min(Band::CloudMask.index())
    }

    pub fn band(&self, band: Band) -> Option<ArrayView2<'_, BandValue>> {
        let index = band.index();
        if index < self.band_count() {
            Some(self.data.index_axis(Axis(0), index))
        } else {
            None
        }
    }

    #[inline]
    pub fn value(&self, band: Band, row: usize, col: usize) -> Option<BandValue> {
        self.data.get([band.index(), row, col]).copied()
    }

    /// All band values of one pixel
    pub fn pixel(&self, row: usize, col: usize) -> ArrayView1<'_, BandValue> {
        self.data.slice(s![.., row, col])
    }

    /// Replace (or append) the cloud mask band
    pub fn with_cloud_mask(self, mask: Array2<BandValue>) -> CompositeResult<Self> {
        let (rows, cols) = self.shape();
        if mask.dim() != (rows, cols) {
            return Err(CompositeError::PreconditionViolation {
                label: self.label,
                reason: format!(
                    "cloud mask shape {:?} does not match raster shape {:?}",
                    mask.dim(),
                    (rows, cols)
                ),
            });
        }

        let mut data = BandCube::zeros((MASKED_BAND_COUNT, rows, cols));
        data.slice_mut(s![..BASE_BAND_COUNT, .., ..])
            .assign(&self.data.slice(s![..BASE_BAND_COUNT, .., ..]));
        data.index_axis_mut(Axis(0), Band::CloudMask.index()).assign(&mask);

        Ok(Self {
            label: self.label,
            data,
            georef: self.georef,
        })
    }

    pub fn into_parts(self) -> (String, BandCube, GeoReference) {
        (self.label, self.data, self.georef)
    }
}

/// Temporal stack of co-registered scenes sharing shape and band layout
#[derive(Debug, Clone)]
pub struct Collection {
    stacks: Vec<RasterStack>,
}

impl Collection {
    /// Validate that every scene matches the first one in shape and band count
    pub fn new(stacks: Vec<RasterStack>) -> CompositeResult<Self> {
        let first = stacks.first().ok_or_else(|| CompositeError::PreconditionViolation {
            label: "<collection>".to_string(),
            reason: "collection contains no scenes".to_string(),
        })?;

        let shape = first.shape();
        let bands = first.band_count();
        for stack in &stacks[1..] {
            if stack.shape() != shape {
                return Err(CompositeError::PreconditionViolation {
                    label: stack.label().to_string(),
                    reason: format!(
                        "shape {:?} differs from {:?} of '{}'",
                        stack.shape(),
                        shape,
                        first.label()
                    ),
                });
            }
            if stack.band_count() != bands {
                return Err(CompositeError::PreconditionViolation {
                    label: stack.label().to_string(),
                    reason: format!(
                        "{} bands differs from {} of '{}'",
                        stack.band_count(),
                        bands,
                        first.label()
                    ),
                });
            }
        }

        log::debug!(
            "Collection of {} scenes, {}x{} pixels, {} bands",
            stacks.len(),
            shape.0,
            shape.1,
            bands
        );
        Ok(Self { stacks })
    }

    pub fn stacks(&self) -> &[RasterStack] {
        &self.stacks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RasterStack> {
        self.stacks.iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.stacks[0].shape()
    }

    pub fn band_count(&self) -> usize {
        self.stacks[0].band_count()
    }

    pub fn output_band_count(&self) -> usize {
        self.stacks[0].output_band_count()
    }

    /// Spatial reference of the collection (inputs are co-registered)
    pub fn georef(&self) -> &GeoReference {
        self.stacks[0].georef()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.stacks.iter().map(RasterStack::label).collect()
    }

    pub fn into_stacks(self) -> Vec<RasterStack> {
        self.stacks
    }
}

/// Error types for compositing
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "gdal-io")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Precondition violated by '{label}': {reason}")]
    PreconditionViolation { label: String, reason: String },

    #[error("No valid pixels for scene {label}")]
    NoValidPixels { label: String },

    #[error("Output already exists: {}", .0.display())]
    OutputAlreadyExists(PathBuf),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for compositing operations
pub type CompositeResult<T> = Result<T, CompositeError>;
