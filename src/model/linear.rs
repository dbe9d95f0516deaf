//! Standard-scaled linear regression

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{FeatureVector, OrientationModel, FEATURE_COUNT};
use crate::error::Result;
use crate::telemetry::MlPredictions;

/// Linear model over standard-scaled features
///
/// Serialized form:
/// `{"mean":[9],"scale":[9],"coefficients":[[9],[9],[9]],"intercept":[3]}`
/// with coefficient rows for roll, pitch and yaw error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub mean: [f64; FEATURE_COUNT],
    pub scale: [f64; FEATURE_COUNT],
    pub coefficients: [[f64; FEATURE_COUNT]; 3],
    pub intercept: [f64; 3],
}

impl LinearModel {
    /// Parse a model from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a model from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn scaled(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut scaled = [0.0; FEATURE_COUNT];
        for (i, value) in features.0.iter().enumerate() {
            // constant feature during fitting
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            scaled[i] = (value - self.mean[i]) / scale;
        }
        scaled
    }
}

impl OrientationModel for LinearModel {
    fn predict(&self, features: &FeatureVector) -> MlPredictions {
        let x = self.scaled(features);
        let mut out = self.intercept;
        for (row, target) in self.coefficients.iter().zip(out.iter_mut()) {
            *target += row.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>();
        }

        MlPredictions {
            roll_error: out[0],
            pitch_error: out[1],
            yaw_error: out[2],
        }
    }
}
