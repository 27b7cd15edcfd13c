use crate::core::histogram::BandHistogram;
use crate::core::validity::ValidityMask;
use crate::types::{Band, CompositeError, CompositeResult, RasterStack};
use ndarray::{Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Min/max scaling of reflectance bands for model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationParams {
    /// (min, max) per reflectance band, in [`Band::REFLECTANCE`] order
    pub ranges: Vec<(f32, f32)>,
    /// Value written where the pixel is not usable
    pub fill: f32,
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self {
            // Sentinel-2 L2A surface reflectance scale
            ranges: vec![(0.0, 10000.0); Band::REFLECTANCE.len()],
            fill: -1.0,
        }
    }
}

impl NormalizationParams {
    /// Take each band's range from an observed distribution
    pub fn from_histograms(histograms: &[BandHistogram]) -> CompositeResult<Self> {
        let ranges = Band::REFLECTANCE
            .iter()
            .map(|band| {
                histograms
                    .iter()
                    .find(|h| h.band == *band)
                    .and_then(|h| h.range)
                    .ok_or_else(|| {
                        CompositeError::InvalidParameter(format!("No observed range for band {}", band))
                    })
            })
            .collect::<CompositeResult<Vec<_>>>()?;
        Ok(Self { ranges, ..Self::default() })
    }
}

/// Scales reflectance to [0, 1] and blanks unusable pixels
#[derive(Debug, Clone)]
pub struct BandNormalizer {
    params: NormalizationParams,
}

impl BandNormalizer {
    pub fn new(params: NormalizationParams) -> CompositeResult<Self> {
        if params.ranges.len() != Band::REFLECTANCE.len() {
            return Err(CompositeError::InvalidParameter(format!(
                "Expected {} band ranges, got {}",
                Band::REFLECTANCE.len(),
                params.ranges.len()
            )));
        }
        if let Some((min, max)) = params.ranges.iter().find(|(min, max)| !(max > min)) {
            return Err(CompositeError::InvalidParameter(format!(
                "Band range max must exceed min, got ({}, {})",
                min, max
            )));
        }
        Ok(Self { params })
    }

    /// Normalized reflectance cube (band x row x col).
    ///
    /// Each band maps `v` to `(v - min) / (max - min)`; pixels the validity
    /// mask rejects get the fill value in every band.
    pub fn normalize(&self, stack: &RasterStack) -> Array3<f32> {
        let (rows, cols) = stack.shape();
        let mask = ValidityMask::from_stack(stack);
        let mut out = Array3::<f32>::from_elem((Band::REFLECTANCE.len(), rows, cols), self.params.fill);

        for (band, &(min, max)) in Band::REFLECTANCE.iter().zip(&self.params.ranges) {
            let source = match stack.band(*band) {
                Some(source) => source,
                None => continue,
            };
            let scale = max - min;
            Zip::from(out.index_axis_mut(Axis(0), band.index()))
                .and(&source)
                .and(mask.grid())
                .for_each(|o, &v, &usable| {
                    if usable {
                        *o = (v - min) / scale;
                    }
                });
        }

        log::debug!("Normalized {} ({}x{})", stack.label(), rows, cols);
        out
    }
}
