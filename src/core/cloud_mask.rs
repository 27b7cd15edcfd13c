use crate::core::indices::{normalized_difference, Reflectance};
use crate::core::parallel::fill_rows;
use crate::types::{
    Band, BandValue, Collection, CompositeResult, RasterStack, BASE_BAND_COUNT, CLOUD_MASK_CLEAR,
    CLOUD_MASK_CLOUD,
};
use ndarray::{s, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Spectral-ratio cloud classification thresholds.
///
/// The mask encoding itself is fixed ([`CLOUD_MASK_CLOUD`] /
/// [`CLOUD_MASK_CLEAR`]) because [`ValidityMask`](crate::core::ValidityMask)
/// and the cloud ratio read it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudMaskParams {
    /// Lower bound for both blue/SWIR normalized ratios
    pub ratio_threshold: f64,
    /// Upper bound for NDSI
    pub ndsi_threshold: f64,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            ratio_threshold: -0.13,
            ndsi_threshold: 0.4,
        }
    }
}

/// Appends a cloud mask band to scenes
#[derive(Debug, Clone)]
pub struct CloudClassifier {
    params: CloudMaskParams,
}

impl CloudClassifier {
    pub fn new(params: CloudMaskParams) -> Self {
        Self { params }
    }

    /// Classifier with the standard Sentinel-2 thresholds
    pub fn standard() -> Self {
        Self::new(CloudMaskParams::default())
    }

    pub fn params(&self) -> &CloudMaskParams {
        &self.params
    }

    /// Decide whether one alpha-valid pixel is cloud.
    ///
    /// A pixel passes as clear-sky surface when both blue/SWIR ratios reach
    /// `ratio_threshold` and NDSI stays at or below `ndsi_threshold`; any other
    /// pixel is cloud. A zero denominator in any of the three ratios means
    /// the pixel cannot be classified and it is left clear.
    pub fn is_cloud(&self, r: &Reflectance) -> bool {
        let ratios = (
            normalized_difference(r.green, r.swir1),
            normalized_difference(r.blue, r.swir1),
            normalized_difference(r.blue, r.swir2),
        );
        match ratios {
            (Some(ndsi), Some(ratio1), Some(ratio2)) => {
                let surface = ratio1 >= self.params.ratio_threshold
                    && ratio2 >= self.params.ratio_threshold
                    && ndsi <= self.params.ndsi_threshold;
                !surface
            }
            _ => false,
        }
    }

    /// Compute the mask band for a scene without modifying it.
    ///
    /// Pixels whose alpha is not positive keep the clear value.
    pub fn cloud_mask(&self, stack: &RasterStack) -> Array2<BandValue> {
        let mut mask = Array2::from_elem(stack.shape(), CLOUD_MASK_CLEAR);

        fill_rows(&mut mask, |row, mut line| {
            for (col, value) in line.iter_mut().enumerate() {
                let alpha = stack.value(Band::Alpha, row, col).unwrap_or(0.0);
                if alpha > 0.0 && self.is_cloud(&Reflectance::at(stack, row, col)) {
                    *value = CLOUD_MASK_CLOUD;
                }
            }
        });

        mask
    }

    /// Return the scene with its cloud mask band appended (or recomputed)
    pub fn classify(&self, stack: RasterStack) -> CompositeResult<RasterStack> {
        let mask = self.cloud_mask(&stack);
        let cloudy = mask.iter().filter(|&&v| v == CLOUD_MASK_CLOUD).count();
        log::debug!(
            "Cloud mask for {}: {} of {} pixels flagged",
            stack.label(),
            cloudy,
            mask.len()
        );
        stack.with_cloud_mask(mask)
    }

    /// Classify every scene of a collection
    pub fn classify_collection(&self, collection: Collection) -> CompositeResult<Collection> {
        log::info!("Adding cloud mask to {} scenes", collection.len());
        let stacks = collection
            .into_stacks()
            .into_iter()
            .map(|stack| self.classify(stack))
            .collect::<CompositeResult<Vec<_>>>()?;
        Collection::new(stacks)
    }
}

/// Merge the cloud mask into alpha so clouds read as no-data in a GIS viewer.
///
/// Alpha becomes `min(alpha, cloud_mask)` and the cloud band is dropped. A
/// scene without a cloud mask is returned unchanged.
pub fn fold_cloud_into_alpha(stack: &RasterStack) -> CompositeResult<RasterStack> {
    let cloud = match stack.band(Band::CloudMask) {
        Some(cloud) => cloud,
        None => return Ok(stack.clone()),
    };

    let mut data = stack.data().slice(s![..BASE_BAND_COUNT, .., ..]).to_owned();
    Zip::from(data.index_axis_mut(Axis(0), Band::Alpha.index()))
        .and(&cloud)
        .for_each(|alpha, &c| *alpha = alpha.min(c));

    RasterStack::new(stack.label(), data, stack.georef().clone())
}
