//! Spectral indices
//!
//! Scalar per-pixel indices computed from the reflectance bands of a scene.
//! Every index is returned as `Option<f64>`: `None` marks a pixel where the
//! index is undefined, either because the pixel is not usable or because a
//! normalized difference hit a zero denominator. Callers exclude such pixels
//! from reductions instead of folding in NaN or zero.

use crate::core::parallel::fill_rows;
use crate::core::validity::ValidityMask;
use crate::types::{Band, CompositeError, CompositeResult, RasterStack};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Denominators with a magnitude below this are treated as zero
pub const DENOMINATOR_EPSILON: f64 = 1e-10;

/// Rec. 709 relative luminance weights for (red, green, blue)
pub const LUMINANCE_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];

/// Enumeration of supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index, (NIR - Red) / (NIR + Red)
    Ndvi,
    /// Normalized Difference Snow Index, (Green - SWIR1) / (Green + SWIR1)
    Ndsi,
    /// Relative luminance, 0.2126 Red + 0.7152 Green + 0.0722 Blue
    Luminance,
}

/// Reflectance values of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reflectance {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub nir: f64,
    pub swir1: f64,
    pub swir2: f64,
}

impl Reflectance {
    /// Read the six reflectance bands of a pixel
    pub fn at(stack: &RasterStack, row: usize, col: usize) -> Self {
        Self::from_pixel(stack.pixel(row, col))
    }

    /// Build from a band vector laid out per [`Band`]
    pub fn from_pixel(pixel: ArrayView1<'_, f32>) -> Self {
        let get = |band: Band| pixel.get(band.index()).copied().unwrap_or(0.0) as f64;
        Self {
            red: get(Band::Red),
            green: get(Band::Green),
            blue: get(Band::Blue),
            nir: get(Band::Nir),
            swir1: get(Band::Swir1),
            swir2: get(Band::Swir2),
        }
    }
}

/// `(a - b) / (a + b)`, undefined when `a + b` is zero
#[inline]
pub fn normalized_difference(a: f64, b: f64) -> Option<f64> {
    let sum = a + b;
    if sum.abs() < DENOMINATOR_EPSILON {
        return None;
    }
    let value = (a - b) / sum;
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

impl SpectralIndex {
    /// Evaluate the index on one pixel's reflectance
    pub fn compute(self, r: &Reflectance) -> Option<f64> {
        match self {
            SpectralIndex::Ndvi => normalized_difference(r.nir, r.red),
            SpectralIndex::Ndsi => normalized_difference(r.green, r.swir1),
            SpectralIndex::Luminance => {
                let [wr, wg, wb] = LUMINANCE_WEIGHTS;
                Some(wr * r.red + wg * r.green + wb * r.blue)
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndsi => "NDSI",
            SpectralIndex::Luminance => "luminance",
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SpectralIndex {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ndvi" => Ok(SpectralIndex::Ndvi),
            "ndsi" => Ok(SpectralIndex::Ndsi),
            "luminance" | "brightness" => Ok(SpectralIndex::Luminance),
            _ => Err(CompositeError::InvalidParameter(format!(
                "Unknown spectral index: {}",
                s
            ))),
        }
    }
}

/// Index value at one pixel, defined only where the mask marks it usable
pub fn index_at(
    kind: SpectralIndex,
    stack: &RasterStack,
    mask: &ValidityMask,
    row: usize,
    col: usize,
) -> Option<f64> {
    if !mask.is_valid(row, col) {
        return None;
    }
    kind.compute(&Reflectance::at(stack, row, col))
}

/// Index over the whole scene, `None` where invalid or degenerate
pub fn index_grid(kind: SpectralIndex, stack: &RasterStack) -> Array2<Option<f64>> {
    let mask = ValidityMask::from_stack(stack);
    index_grid_masked(kind, stack, &mask)
}

/// Same as [`index_grid`] with a precomputed mask
pub fn index_grid_masked(
    kind: SpectralIndex,
    stack: &RasterStack,
    mask: &ValidityMask,
) -> Array2<Option<f64>> {
    let mut grid = Array2::from_elem(stack.shape(), None);
    fill_rows(&mut grid, |row, mut line| {
        for (col, value) in line.iter_mut().enumerate() {
            *value = index_at(kind, stack, mask, row, col);
        }
    });
    grid
}
