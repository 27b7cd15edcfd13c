use crate::core::{CloudMaskParams, CompositeParams, CompositePolicy, HistogramParams};
use crate::types::{CompositeError, CompositeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of a full compositing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cloud: CloudMaskParams,
    pub composite: CompositeParams,
    pub histogram: HistogramParams,
    /// Products to write, in order
    pub policies: Vec<CompositePolicy>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cloud: CloudMaskParams::default(),
            composite: CompositeParams::default(),
            histogram: HistogramParams::default(),
            policies: CompositePolicy::defaults(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; omitted fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> CompositeResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)
            .map_err(|e| CompositeError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> CompositeResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| CompositeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CompositeResult<()> {
        if self.policies.is_empty() {
            return Err(CompositeError::Config("no composite policies configured".to_string()));
        }
        CompositePolicy::validate_batch(&self.policies)?;
        if self.histogram.bins == 0 {
            return Err(CompositeError::Config("histogram bins must be positive".to_string()));
        }
        Ok(())
    }
}
