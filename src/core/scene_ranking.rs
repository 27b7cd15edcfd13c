use crate::core::indices::{index_at, SpectralIndex};
use crate::core::parallel::map_items;
use crate::core::validity::ValidityMask;
use crate::types::{
    Band, Collection, CompositeError, CompositeResult, RasterStack, CLOUD_MASK_CLOUD,
};
use serde::{Deserialize, Serialize};

/// Scalar used to order scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    /// Mean of a spectral index over usable pixels
    Index(SpectralIndex),
    /// Cloud pixels over alpha-valid pixels
    CloudRatio,
}

impl std::fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingMetric::Index(kind) => write!(f, "average {}", kind),
            RankingMetric::CloudRatio => write!(f, "cloud ratio"),
        }
    }
}

/// Score of one scene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneScore {
    pub label: String,
    pub score: f64,
    /// Pixels that entered the score
    pub pixel_count: usize,
}

/// Scenes ordered by descending score
#[derive(Debug, Clone, Serialize)]
pub struct SceneRanking {
    pub metric: RankingMetric,
    pub ranked: Vec<SceneScore>,
    /// Scenes without a single usable pixel
    pub unscored: Vec<String>,
}

impl SceneRanking {
    /// Highest-scoring scene
    pub fn best(&self) -> Option<&SceneScore> {
        self.ranked.first()
    }
}

/// Standard ranking set printed after loading a collection
#[derive(Debug, Clone, Serialize)]
pub struct RankingReport {
    pub greenest: SceneRanking,
    pub snowiest: SceneRanking,
    pub cloudiest: SceneRanking,
    pub brightest: SceneRanking,
}

impl RankingReport {
    pub fn entries(&self) -> [(&'static str, &SceneRanking); 4] {
        [
            ("Greenest", &self.greenest),
            ("Snowiest", &self.snowiest),
            ("Cloudiest", &self.cloudiest),
            ("Brightest", &self.brightest),
        ]
    }
}

/// Aggregates per-scene scores and orders scenes
pub struct SceneRanker;

impl SceneRanker {
    /// Score a single scene.
    ///
    /// Index metrics average the index over usable pixels where it is
    /// defined. The cloud ratio divides cloud-flagged pixels by alpha-valid
    /// pixels. A scene with nothing to average fails with `NoValidPixels`.
    pub fn score_scene(stack: &RasterStack, metric: RankingMetric) -> CompositeResult<SceneScore> {
        let no_pixels = || CompositeError::NoValidPixels { label: stack.label().to_string() };
        let (rows, cols) = stack.shape();

        let (score, pixel_count) = match metric {
            RankingMetric::Index(kind) => {
                let mask = ValidityMask::from_stack(stack);
                let mut sum = 0.0f64;
                let mut count = 0usize;
                for row in 0..rows {
                    for col in 0..cols {
                        if let Some(value) = index_at(kind, stack, &mask, row, col) {
                            sum += value;
                            count += 1;
                        }
                    }
                }
                if count == 0 {
                    return Err(no_pixels());
                }
                (sum / count as f64, count)
            }
            RankingMetric::CloudRatio => {
                let alpha_valid = ValidityMask::alpha_only(stack);
                let valid = alpha_valid.valid_count();
                if valid == 0 {
                    return Err(no_pixels());
                }
                let cloudy = match stack.band(Band::CloudMask) {
                    Some(cloud) => alpha_valid
                        .grid()
                        .iter()
                        .zip(cloud.iter())
                        .filter(|&(&usable, &c)| usable && c == CLOUD_MASK_CLOUD)
                        .count(),
                    None => 0,
                };
                (cloudy as f64 / valid as f64, valid)
            }
        };

        Ok(SceneScore {
            label: stack.label().to_string(),
            score,
            pixel_count,
        })
    }

    /// Score every scene and sort by descending score.
    ///
    /// Scenes that cannot be scored are logged and listed in `unscored`;
    /// equal scores keep collection order.
    pub fn rank(stacks: &[RasterStack], metric: RankingMetric) -> SceneRanking {
        log::info!("Ranking {} scenes by {}", stacks.len(), metric);

        let results = map_items(stacks, |stack| Self::score_scene(stack, metric));

        let mut ranked = Vec::with_capacity(results.len());
        let mut unscored = Vec::new();
        for (stack, result) in stacks.iter().zip(results) {
            match result {
                Ok(score) => ranked.push(score),
                Err(e) => {
                    log::warn!("{}", e);
                    unscored.push(stack.label().to_string());
                }
            }
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        SceneRanking { metric, ranked, unscored }
    }

    /// Greenest, snowiest, cloudiest and brightest rankings of a collection
    pub fn report(collection: &Collection) -> RankingReport {
        let stacks = collection.stacks();
        RankingReport {
            greenest: Self::rank(stacks, RankingMetric::Index(SpectralIndex::Ndvi)),
            snowiest: Self::rank(stacks, RankingMetric::Index(SpectralIndex::Ndsi)),
            cloudiest: Self::rank(stacks, RankingMetric::CloudRatio),
            brightest: Self::rank(stacks, RankingMetric::Index(SpectralIndex::Luminance)),
        }
    }
}
