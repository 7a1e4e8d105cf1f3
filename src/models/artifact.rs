use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::ml::{SgdRegressor, StandardScaler};
use crate::models::FEATURE_NAMES;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    Full,
    Streaming,
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingMode::Full => f.write_str("full"),
            TrainingMode::Streaming => f.write_str("streaming"),
        }
    }
}

impl FromStr for TrainingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "full-batch" | "full_batch" => Ok(TrainingMode::Full),
            "streaming" | "incremental" => Ok(TrainingMode::Streaming),
            other => Err(format!("unknown training mode '{}' (expected 'full' or 'streaming')", other)),
        }
    }
}

/// The persisted (scaler, model) pair plus the metadata serving needs to
/// rebuild the feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub epoch: DateTime<Utc>,
    pub mode: TrainingMode,
    pub trained_at: DateTime<Utc>,
    pub samples: usize,
    pub batches: usize,
    pub scaler: StandardScaler,
    pub model: SgdRegressor,
}

impl ModelArtifact {
    pub fn new(
        scaler: StandardScaler,
        model: SgdRegressor,
        epoch: DateTime<Utc>,
        mode: TrainingMode,
        samples: usize,
        batches: usize,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            epoch,
            mode,
            trained_at: Utc::now(),
            samples,
            batches,
            scaler,
            model,
        }
    }

    /// Structural checks applied on load; any failure means the file cannot be served.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            ));
        }
        self.scaler.check_consistent()?;
        let width = self.scaler.n_features();
        if self.model.n_features() != width {
            return Err(format!(
                "scaler has {} features but model has {}",
                width,
                self.model.n_features()
            ));
        }
        if self.feature_names.len() != width {
            return Err(format!(
                "artifact names {} features but scaler has {}",
                self.feature_names.len(),
                width
            ));
        }
        if !self.model.intercept().is_finite() || self.model.coef().iter().any(|c| !c.is_finite()) {
            return Err("model contains non-finite parameters".into());
        }
        Ok(())
    }

    /// Scale a raw feature row and predict a price.
    pub fn predict(&self, row: &[f64]) -> Result<f64, AppError> {
        let scaled = self.scaler.transform_row(row)?;
        self.model.predict_row(&scaled)
    }
}
