//! Core compositing stages

mod parallel;

pub mod validity;
pub mod indices;
pub mod cloud_mask;
pub mod composite;
pub mod scene_ranking;
pub mod histogram;
pub mod normalize;  // Model-input scaling

// Re-export main types
pub use validity::{valid_of, ValidityMask};
pub use indices::{index_at, index_grid, normalized_difference, Reflectance, SpectralIndex};
pub use cloud_mask::{fold_cloud_into_alpha, CloudClassifier, CloudMaskParams};
pub use composite::{Composite, CompositeParams, CompositePolicy, Compositor};
pub use scene_ranking::{RankingMetric, RankingReport, SceneRanker, SceneRanking, SceneScore};
pub use histogram::{band_histograms, BandHistogram, HistogramParams};
pub use normalize::{BandNormalizer, NormalizationParams};
