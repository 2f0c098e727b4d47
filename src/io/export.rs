//! Export single-model fits to JSON.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::pipeline::SingleFit;
use crate::domain::{FitMethod, FitRecord};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub method: FitMethod,
    pub seed: u64,
    pub best_restart: usize,
    /// Free parameters that ended within 1% of a bound.
    pub pinned: Vec<String>,
    #[serde(flatten)]
    pub record: FitRecord,
}

impl FitFile {
    pub fn from_fit(fit: &SingleFit, method: FitMethod) -> Self {
        Self {
            tool: "envfit".to_string(),
            created: Utc::now(),
            method,
            seed: fit.seed,
            best_restart: fit.outcome.best_restart,
            pinned: fit.outcome.pinned.clone(),
            record: fit.record.clone(),
        }
    }
}

pub fn write_fit_json(path: &Path, file: &FitFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::io(format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}
