//! Orientation-error model boundary
//!
//! The producer predicts roll/pitch/yaw errors from gyro rates and motor
//! commands and ships them inside each record as `ml_predictions`. The relay
//! itself never evaluates a model; this module is used by the producer side
//! (see the `telemetry-sim` binary).

pub mod linear;

pub use linear::LinearModel;

use crate::telemetry::MlPredictions;

/// Number of model inputs
pub const FEATURE_COUNT: usize = 9;

/// Model input names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "motor_fl",
    "motor_fr",
    "motor_rl",
    "motor_rr",
    "total_thrust",
    "stability_index",
];

/// Model input vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build the vector from raw sensor readings
    ///
    /// `motors` is ordered front-left, front-right, rear-left, rear-right.
    /// Total thrust is the sum of absolute motor commands.
    pub fn from_sensors(gyro: [f64; 3], motors: [f64; 4], stability_index: f64) -> Self {
        let total_thrust = motors.iter().map(|m| m.abs()).sum();
        Self([
            gyro[0],
            gyro[1],
            gyro[2],
            motors[0],
            motors[1],
            motors[2],
            motors[3],
            total_thrust,
            stability_index,
        ])
    }

    /// Feature values in [`FEATURE_NAMES`] order
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Stability in `[0, 1]` from roll and pitch (radians)
pub fn stability_index(roll: f64, pitch: f64) -> f64 {
    (1.0 - (roll.abs() + pitch.abs()) * 0.5).clamp(0.0, 1.0)
}

/// Predicts orientation errors from a feature vector
pub trait OrientationModel: Send + Sync {
    /// Predict roll, pitch and yaw errors
    fn predict(&self, features: &FeatureVector) -> MlPredictions;
}

/// Stand-in used when no trained model is available; predicts zeros
#[derive(Debug, Clone, Copy, Default)]
pub struct NullModel;

impl OrientationModel for NullModel {
    fn predict(&self, _features: &FeatureVector) -> MlPredictions {
        MlPredictions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_thrust_uses_absolute_values() {
        let features = FeatureVector::from_sensors([0.1, 0.2, 0.3], [10.0, -10.0, 5.0, -5.0], 0.9);

        assert_eq!(features.0[7], 30.0);
        assert_eq!(features.0[8], 0.9);
        assert_eq!(&features.0[..3], &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_stability_index() {
        assert_eq!(stability_index(0.0, 0.0), 1.0);
        assert_eq!(stability_index(0.5, -0.5), 0.5);
        assert_eq!(stability_index(2.0, 1.0), 0.0);
    }

    #[test]
    fn test_null_model_predicts_zeros() {
        let features = FeatureVector::from_sensors([1.0; 3], [1.0; 4], 1.0);
        assert_eq!(NullModel.predict(&features), MlPredictions::default());
    }
}
