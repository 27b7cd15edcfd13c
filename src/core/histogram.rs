//! Per-band value distributions over the usable pixels of a collection.

use crate::core::parallel::map_items;
use crate::core::validity::ValidityMask;
use crate::types::{Band, Collection, CompositeError, CompositeResult};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    /// Number of equal-width bins between the observed min and max
    pub bins: usize,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self { bins: 256 }
    }
}

/// Distribution of one reflectance band
#[derive(Debug, Clone, Serialize)]
pub struct BandHistogram {
    pub band: Band,
    /// Observed (min, max), `None` when no pixel was usable
    pub range: Option<(f32, f32)>,
    pub count: usize,
    pub mean: Option<f64>,
    pub counts: Vec<usize>,
}

impl BandHistogram {
    pub fn bin_width(&self) -> Option<f64> {
        let (min, max) = self.range?;
        if self.counts.is_empty() {
            return None;
        }
        Some((max as f64 - min as f64) / self.counts.len() as f64)
    }

    /// Index and count of the most populated bin
    pub fn mode_bin(&self) -> Option<(usize, usize)> {
        self.counts
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .filter(|&(_, count)| count > 0)
    }
}

/// Histogram every reflectance band over pixels usable in each scene
pub fn band_histograms(
    collection: &Collection,
    params: &HistogramParams,
) -> CompositeResult<Vec<BandHistogram>> {
    if params.bins == 0 {
        return Err(CompositeError::InvalidParameter(
            "Histogram needs at least one bin".to_string(),
        ));
    }
    log::info!("Creating histograms of {} bands", Band::REFLECTANCE.len());

    let masks: Vec<ValidityMask> = collection.iter().map(ValidityMask::from_stack).collect();

    let histograms = map_items(&Band::REFLECTANCE, |&band| {
        let mut values = Vec::new();
        for (stack, mask) in collection.iter().zip(&masks) {
            if let Some(data) = stack.band(band) {
                Zip::from(&data).and(mask.grid()).for_each(|&v, &usable| {
                    if usable {
                        values.push(v);
                    }
                });
            }
        }
        histogram_of(band, &values, params.bins)
    });

    Ok(histograms)
}

fn histogram_of(band: Band, values: &[f32], bins: usize) -> BandHistogram {
    let mut counts = vec![0usize; bins];
    let range = values.iter().fold(None, |range: Option<(f32, f32)>, &v| match range {
        Some((min, max)) => Some((min.min(v), max.max(v))),
        None => Some((v, v)),
    });

    let (min, max) = match range {
        Some(range) => range,
        None => {
            return BandHistogram { band, range: None, count: 0, mean: None, counts };
        }
    };

    let span = max as f64 - min as f64;
    let mut sum = 0.0f64;
    for &v in values {
        sum += v as f64;
        let bin = if span > 0.0 {
            (((v as f64 - min as f64) / span) * bins as f64) as usize
        } else {
            0
        };
        counts[bin.min(bins - 1)] += 1;
    }

    BandHistogram {
        band,
        range: Some((min, max)),
        count: values.len(),
        mean: Some(sum / values.len() as f64),
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandCube, GeoReference, RasterStack, BASE_BAND_COUNT};

    fn scene(label: &str, red: &[f32], alpha: &[f32]) -> RasterStack {
        let mut data = BandCube::zeros((BASE_BAND_COUNT, 1, red.len()));
        for col in 0..red.len() {
            data[[Band::Red.index(), 0, col]] = red[col];
            data[[Band::Alpha.index(), 0, col]] = alpha[col];
        }
        RasterStack::new(label, data, GeoReference::default()).unwrap()
    }

    #[test]
    fn test_histogram_over_valid_pixels() {
        let collection = Collection::new(vec![
            scene("a", &[0.0, 50.0, 9999.0], &[1.0, 1.0, 0.0]),
            scene("b", &[100.0, 100.0, 100.0], &[1.0, 1.0, 1.0]),
        ])
        .unwrap();

        let histograms = band_histograms(&collection, &HistogramParams { bins: 4 }).unwrap();
        assert_eq!(histograms.len(), 6);

        let red = &histograms[0];
        assert_eq!(red.band, Band::Red);
        assert_eq!(red.count, 5);
        assert_eq!(red.range, Some((0.0, 100.0)));
        assert_eq!(red.counts, vec![1, 0, 1, 3]);
        assert_eq!(red.mode_bin(), Some((3, 3)));
        assert_eq!(red.bin_width(), Some(25.0));
    }

    #[test]
    fn test_constant_band_single_bin() {
        let collection = Collection::new(vec![scene("a", &[7.0, 7.0], &[1.0, 1.0])]).unwrap();
        let histograms = band_histograms(&collection, &HistogramParams { bins: 3 }).unwrap();
        // green is all zeros
        assert_eq!(histograms[1].counts, vec![2, 0, 0]);
        assert_eq!(histograms[0].mean, Some(7.0));
    }

    #[test]
    fn test_no_valid_pixels() {
        let collection = Collection::new(vec![scene("a", &[7.0], &[0.0])]).unwrap();
        let histograms = band_histograms(&collection, &HistogramParams::default()).unwrap();
        assert!(histograms[0].range.is_none());
        assert_eq!(histograms[0].count, 0);
        assert!(histograms[0].mode_bin().is_none());
    }

    #[test]
    fn test_zero_bins_rejected() {
        let collection = Collection::new(vec![scene("a", &[7.0], &[1.0])]).unwrap();
        assert!(band_histograms(&collection, &HistogramParams { bins: 0 }).is_err());
    }
}
