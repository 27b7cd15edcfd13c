//! Per-pixel compositing of a temporal stack.
//!
//! Every policy shares one masking contract: at each pixel only the scenes
//! whose [`ValidityMask`] is set contribute. Elementwise policies (mean, min,
//! max, median) reduce each band independently over those contributors.
//! Selection policies (greenest, percentile greenest) rank contributors by
//! NDVI and copy the whole pixel vector of the chosen scene.
//!
//! A pixel without contributors is left undefined and flagged in
//! [`Composite::defined`]; it is never filled with a plausible value.

use crate::core::indices::{index_grid_masked, SpectralIndex};
use crate::core::parallel::map_rows;
use crate::core::validity::ValidityMask;
use crate::types::{
    Band, BandCube, BandValue, BoolGrid, Collection, CompositeError, CompositeResult, GeoReference,
};
use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Reduction applied across the stack at every pixel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    Mean,
    Min,
    Max,
    Median,
    /// Whole pixel of the contributor with maximum NDVI
    Greenest,
    /// Whole pixel of the contributor at the given NDVI percentile (0.0 - 1.0)
    PercentileGreenest(f64),
}

impl CompositePolicy {
    /// The six products of a standard run
    pub fn defaults() -> Vec<CompositePolicy> {
        vec![
            CompositePolicy::Mean,
            CompositePolicy::Min,
            CompositePolicy::Max,
            CompositePolicy::Median,
            CompositePolicy::Greenest,
            CompositePolicy::PercentileGreenest(0.85),
        ]
    }

    pub fn validate(&self) -> CompositeResult<()> {
        if let CompositePolicy::PercentileGreenest(p) = *self {
            if !(0.0..=1.0).contains(&p) {
                return Err(CompositeError::InvalidParameter(format!(
                    "Percentile must be within [0, 1], got {}",
                    p
                )));
            }
        }
        Ok(())
    }

    /// Selection policies copy a whole pixel vector from one scene
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            CompositePolicy::Greenest | CompositePolicy::PercentileGreenest(_)
        )
    }

    /// Short product name, e.g. `median` or `greenest85`
    pub fn name(&self) -> String {
        match self {
            CompositePolicy::Mean => "mean".to_string(),
            CompositePolicy::Min => "min".to_string(),
            CompositePolicy::Max => "max".to_string(),
            CompositePolicy::Median => "median".to_string(),
            CompositePolicy::Greenest => "greenest".to_string(),
            CompositePolicy::PercentileGreenest(p) => format!("greenest{}", (p * 100.0).round() as i64),
        }
    }

    /// Output file name of the product
    pub fn file_name(&self) -> String {
        format!("{}.tif", self.name())
    }

    /// Validate a batch of policies and make sure no two share an output file.
    ///
    /// Percentiles are named by whole percent, so e.g. 0.851 and 0.854 would
    /// both land in `greenest85.tif`.
    pub fn validate_batch(policies: &[CompositePolicy]) -> CompositeResult<()> {
        let mut seen: Vec<(String, CompositePolicy)> = Vec::with_capacity(policies.len());
        for &policy in policies {
            policy.validate()?;
            let file_name = policy.file_name();
            if let Some((_, earlier)) = seen.iter().find(|(name, _)| *name == file_name) {
                return Err(CompositeError::InvalidParameter(format!(
                    "Policies {:?} and {:?} both write {}",
                    earlier, policy, file_name
                )));
            }
            seen.push((file_name, policy));
        }
        Ok(())
    }
}

impl std::fmt::Display for CompositePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for CompositePolicy {
    type Err = CompositeError;

    /// Accepts `mean`, `min`, `max`, `median`, `greenest`, `greenest85`
    /// (percent) and `percentile:0.85` (fraction).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let policy = match lower.as_str() {
            "mean" => CompositePolicy::Mean,
            "min" => CompositePolicy::Min,
            "max" => CompositePolicy::Max,
            "median" => CompositePolicy::Median,
            "greenest" => CompositePolicy::Greenest,
            other => {
                let invalid = || CompositeError::InvalidParameter(format!("Unknown composite policy: {}", s));
                if let Some(fraction) = other.strip_prefix("percentile:") {
                    let p: f64 = fraction.parse().map_err(|_| invalid())?;
                    CompositePolicy::PercentileGreenest(p)
                } else if let Some(percent) = other.strip_prefix("greenest") {
                    let p: f64 = percent.parse().map_err(|_| invalid())?;
                    CompositePolicy::PercentileGreenest(p / 100.0)
                } else {
                    return Err(invalid());
                }
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Compositing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    /// Value written to reflectance bands of undefined pixels on export
    pub nodata: u16,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self { nodata: 65535 }
    }
}

/// One reduced image
#[derive(Debug, Clone)]
pub struct Composite {
    pub policy: CompositePolicy,
    /// Reduced values (band x row x col), cloud mask band excluded
    pub data: BandCube,
    /// False where no scene contributed
    pub defined: BoolGrid,
    /// Number of contributing scenes per pixel
    pub contributors: Array2<u32>,
    /// Scene chosen per pixel, selection policies only
    pub selection: Option<Array2<Option<usize>>>,
    pub georef: GeoReference,
}

impl Composite {
    pub fn shape(&self) -> (usize, usize) {
        self.defined.dim()
    }

    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    pub fn is_defined(&self, row: usize, col: usize) -> bool {
        self.defined.get((row, col)).copied().unwrap_or(false)
    }

    pub fn value(&self, band: Band, row: usize, col: usize) -> Option<BandValue> {
        if !self.is_defined(row, col) {
            return None;
        }
        self.data.get([band.index(), row, col]).copied()
    }

    pub fn pixel(&self, row: usize, col: usize) -> Option<Vec<BandValue>> {
        if !self.is_defined(row, col) {
            return None;
        }
        Some(self.data.slice(s![.., row, col]).to_vec())
    }

    /// Index of the scene a selection policy copied at this pixel
    pub fn source_scene(&self, row: usize, col: usize) -> Option<usize> {
        self.selection
            .as_ref()
            .and_then(|selection| selection.get((row, col)).copied().flatten())
    }

    pub fn undefined_count(&self) -> usize {
        self.defined.iter().filter(|&&d| !d).count()
    }

    /// Quantize to the 16-bit output range.
    ///
    /// Undefined pixels get `nodata` on every band except alpha, which is set
    /// to 0 so the pixel also reads as no-data to alpha-aware consumers.
    pub fn to_u16(&self, nodata: u16) -> Array3<u16> {
        let alpha = Band::Alpha.index();
        let mut out = Array3::<u16>::zeros(self.data.dim());
        for ((band, row, col), value) in self.data.indexed_iter() {
            out[[band, row, col]] = if self.defined[[row, col]] {
                quantize(*value)
            } else if band == alpha {
                0
            } else {
                nodata
            };
        }
        out
    }
}

/// Round and clamp to u16
#[inline]
pub fn quantize(value: BandValue) -> u16 {
    if !value.is_finite() {
        return 0;
    }
    num_traits::clamp(value.round(), 0.0, u16::MAX as BandValue) as u16
}

// ---------------------------------------------------------------------------
// Pure reducers over (value, contributes) samples
// ---------------------------------------------------------------------------

/// Arithmetic mean of contributing samples
pub fn mean_of<I>(samples: I) -> Option<BandValue>
where
    I: IntoIterator<Item = (BandValue, bool)>,
{
    let (sum, count) = samples
        .into_iter()
        .filter(|&(_, contributes)| contributes)
        .fold((0.0f64, 0usize), |(sum, count), (value, _)| (sum + value as f64, count + 1));
    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as BandValue)
    }
}

/// Minimum of contributing samples
pub fn min_of<I>(samples: I) -> Option<BandValue>
where
    I: IntoIterator<Item = (BandValue, bool)>,
{
    samples
        .into_iter()
        .filter(|&(_, contributes)| contributes)
        .map(|(value, _)| value)
        .reduce(BandValue::min)
}

/// Maximum of contributing samples
pub fn max_of<I>(samples: I) -> Option<BandValue>
where
    I: IntoIterator<Item = (BandValue, bool)>,
{
    samples
        .into_iter()
        .filter(|&(_, contributes)| contributes)
        .map(|(value, _)| value)
        .reduce(BandValue::max)
}

/// Median of contributing samples, averaging the middle pair for even counts
pub fn median_of<I>(samples: I) -> Option<BandValue>
where
    I: IntoIterator<Item = (BandValue, bool)>,
{
    let mut values: Vec<BandValue> = samples
        .into_iter()
        .filter(|&(_, contributes)| contributes)
        .map(|(value, _)| value)
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(((values[mid - 1] as f64 + values[mid] as f64) / 2.0) as BandValue)
    } else {
        Some(values[mid])
    }
}

/// Scene with the highest NDVI; `None` entries never win.
///
/// Ties go to the earliest scene in collection order.
pub fn greenest_of(ndvi: &[Option<f64>]) -> Option<usize> {
    ndvi.iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Scene at NDVI percentile `p` among the defined entries.
///
/// The defined values are sorted ascending and the one at rank
/// `ceil(p * n) - 1` (clamped to `[0, n - 1]`) is picked. When several scenes
/// share that NDVI the earliest one in collection order is returned.
pub fn percentile_of(ndvi: &[Option<f64>], p: f64) -> Option<usize> {
    let mut sorted: Vec<f64> = ndvi.iter().filter_map(|v| *v).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let rank = ((p * n as f64).ceil() as i64 - 1).clamp(0, n as i64 - 1) as usize;
    let target = sorted[rank];

    ndvi.iter()
        .position(|v| matches!(v, Some(v) if v.total_cmp(&target) == Ordering::Equal))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reduced values of one pixel
struct PixelOutcome {
    values: Option<Vec<BandValue>>,
    contributors: u32,
    source: Option<usize>,
}

/// Reduces a collection to one composite per policy
#[derive(Debug, Clone)]
pub struct Compositor {
    params: CompositeParams,
}

impl Compositor {
    pub fn new(params: CompositeParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(CompositeParams::default())
    }

    pub fn params(&self) -> &CompositeParams {
        &self.params
    }

    /// Reduce the collection under one policy
    pub fn composite(
        &self,
        policy: CompositePolicy,
        collection: &Collection,
    ) -> CompositeResult<Composite> {
        policy.validate()?;
        log::info!("Creating {} composite from {} scenes", policy, collection.len());

        let masks: Vec<ValidityMask> = collection.iter().map(ValidityMask::from_stack).collect();
        let ndvi: Vec<Array2<Option<f64>>> = if policy.is_selection() {
            collection
                .iter()
                .zip(&masks)
                .map(|(stack, mask)| index_grid_masked(SpectralIndex::Ndvi, stack, mask))
                .collect()
        } else {
            Vec::new()
        };

        let (rows, cols) = collection.shape();
        let bands = collection.output_band_count();

        let outcomes = map_rows(rows, |row| {
            (0..cols)
                .map(|col| reduce_pixel(policy, collection, &masks, &ndvi, bands, row, col))
                .collect()
        });

        let mut data = BandCube::zeros((bands, rows, cols));
        let mut defined = BoolGrid::from_elem((rows, cols), false);
        let mut contributors = Array2::<u32>::zeros((rows, cols));
        let mut selection = if policy.is_selection() {
            Some(Array2::from_elem((rows, cols), None))
        } else {
            None
        };

        for (i, outcome) in outcomes.into_iter().enumerate() {
            let (row, col) = (i / cols, i % cols);
            contributors[[row, col]] = outcome.contributors;
            if let Some(selection) = selection.as_mut() {
                selection[[row, col]] = outcome.source;
            }
            if let Some(values) = outcome.values {
                defined[[row, col]] = true;
                for (band, value) in values.into_iter().enumerate() {
                    data[[band, row, col]] = value;
                }
            }
        }

        let composite = Composite {
            policy,
            data,
            defined,
            contributors,
            selection,
            georef: collection.georef().clone(),
        };

        let undefined = composite.undefined_count();
        if undefined > 0 {
            log::warn!(
                "{} composite: {} of {} pixels have no valid contributors",
                policy,
                undefined,
                rows * cols
            );
        }
        log::debug!("{} composite complete: {} bands, {}x{}", policy, bands, rows, cols);

        Ok(composite)
    }

    /// Reduce the collection under each policy in turn
    pub fn composite_all(
        &self,
        policies: &[CompositePolicy],
        collection: &Collection,
    ) -> CompositeResult<Vec<Composite>> {
        CompositePolicy::validate_batch(policies)?;
        policies
            .iter()
            .map(|&policy| self.composite(policy, collection))
            .collect()
    }
}

fn reduce_pixel(
    policy: CompositePolicy,
    collection: &Collection,
    masks: &[ValidityMask],
    ndvi: &[Array2<Option<f64>>],
    bands: usize,
    row: usize,
    col: usize,
) -> PixelOutcome {
    let contributes: Vec<bool> = masks.iter().map(|mask| mask.is_valid(row, col)).collect();
    let contributors = contributes.iter().filter(|&&c| c).count() as u32;
    if contributors == 0 {
        return PixelOutcome { values: None, contributors, source: None };
    }

    let stacks = collection.stacks();
    let elementwise = |reducer: fn(Vec<(BandValue, bool)>) -> Option<BandValue>| {
        (0..bands)
            .map(|band| {
                let samples: Vec<(BandValue, bool)> = stacks
                    .iter()
                    .zip(&contributes)
                    .map(|(stack, &c)| (stack.data()[[band, row, col]], c))
                    .collect();
                reducer(samples)
            })
            .collect::<Option<Vec<_>>>()
    };

    match policy {
        CompositePolicy::Mean => PixelOutcome {
            values: elementwise(mean_of),
            contributors,
            source: None,
        },
        CompositePolicy::Min => PixelOutcome {
            values: elementwise(min_of),
            contributors,
            source: None,
        },
        CompositePolicy::Max => PixelOutcome {
            values: elementwise(max_of),
            contributors,
            source: None,
        },
        CompositePolicy::Median => PixelOutcome {
            values: elementwise(median_of),
            contributors,
            source: None,
        },
        CompositePolicy::Greenest | CompositePolicy::PercentileGreenest(_) => {
            let scores: Vec<Option<f64>> = ndvi
                .iter()
                .zip(&contributes)
                .map(|(grid, &c)| if c { grid[[row, col]] } else { None })
                .collect();
            let source = match policy {
                CompositePolicy::PercentileGreenest(p) => percentile_of(&scores, p),
                _ => greenest_of(&scores),
            };
            let values = source.map(|i| stacks[i].data().slice(s![..bands, row, col]).to_vec());
            PixelOutcome { values, contributors, source }
        }
    }
}
