//! Detection configuration
//!
//! Settings are re-read at the start of every pipeline run so operators
//! can switch models or thresholds without a restart.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model identifier recorded for simulated runs
pub const SIMULATION_MODEL_ID: &str = "simulation";

/// Which detection backend a run should use. Stored as a single string:
/// the literal `"simulation"` or a path to ONNX weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelSelection {
    Simulation,
    Onnx(PathBuf),
}

impl ModelSelection {
    pub fn is_simulation(&self) -> bool {
        matches!(self, ModelSelection::Simulation)
    }

    /// The identifier recorded on detection records for this selection.
    pub fn model_id(&self) -> String {
        match self {
            ModelSelection::Simulation => SIMULATION_MODEL_ID.to_string(),
            ModelSelection::Onnx(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl From<String> for ModelSelection {
    fn from(value: String) -> Self {
        if value == SIMULATION_MODEL_ID {
            ModelSelection::Simulation
        } else {
            ModelSelection::Onnx(PathBuf::from(value))
        }
    }
}

impl From<ModelSelection> for String {
    fn from(value: ModelSelection) -> Self {
        value.model_id()
    }
}

/// Snapshot of the detection settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub active_detection_model: ModelSelection,
    pub dangerous_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            active_detection_model: ModelSelection::Simulation,
            dangerous_threshold: 0.5,
        }
    }
}

impl DetectionSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.1..=1.0).contains(&self.dangerous_threshold) {
            return Err(format!(
                "dangerous_threshold must be between 0.1 and 1.0, got {}",
                self.dangerous_threshold
            ));
        }
        Ok(())
    }
}

/// Source of per-run settings snapshots. The persistent implementation
/// lives in the storage layer; pipelines only see this trait.
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> Result<DetectionSettings>;
}

/// Fixed settings for tests and single-tenant deployments
pub struct StaticSettings(pub DetectionSettings);

impl SettingsProvider for StaticSettings {
    fn snapshot(&self) -> Result<DetectionSettings> {
        Ok(self.0.clone())
    }
}
