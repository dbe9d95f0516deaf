//! Telemetry record and its nested value types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FrameError;

/// Vehicle position in world coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Vehicle attitude, radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Linear velocity components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// Orientation errors predicted by the external model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MlPredictions {
    pub roll_error: f64,
    pub pitch_error: f64,
    pub yaw_error: f64,
}

/// One snapshot of vehicle state plus model predictions
///
/// Keys the relay does not know about (the control loop also reports things
/// like `altitude`, `gyro_x` or `motor_velocities`) are kept in `extra` and
/// forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Seconds since simulation start
    pub simulation_time: f64,
    pub position: Position,
    pub orientation: Orientation,
    pub velocity: Velocity,
    /// Stability in `[0, 1]`, higher is more stable
    pub stability_index: f64,
    pub ml_predictions: MlPredictions,
    /// Unrecognised top-level keys, passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryRecord {
    /// Create a record with no pass-through fields
    pub fn new(
        simulation_time: f64,
        position: Position,
        orientation: Orientation,
        velocity: Velocity,
        stability_index: f64,
        ml_predictions: MlPredictions,
    ) -> Self {
        Self {
            simulation_time,
            position,
            orientation,
            velocity,
            stability_index,
            ml_predictions,
            extra: Map::new(),
        }
    }

    /// Zeroed record at the given time, stability 1.0
    pub fn at(simulation_time: f64) -> Self {
        Self::new(
            simulation_time,
            Position::default(),
            Orientation::default(),
            Velocity::default(),
            1.0,
            MlPredictions::default(),
        )
    }

    /// Attach a pass-through field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> Result<(), FrameError> {
        let numeric = [
            ("simulation_time", self.simulation_time),
            ("position.x", self.position.x),
            ("position.y", self.position.y),
            ("position.z", self.position.z),
            ("orientation.roll", self.orientation.roll),
            ("orientation.pitch", self.orientation.pitch),
            ("orientation.yaw", self.orientation.yaw),
            ("velocity.vx", self.velocity.vx),
            ("velocity.vy", self.velocity.vy),
            ("velocity.vz", self.velocity.vz),
            ("ml_predictions.roll_error", self.ml_predictions.roll_error),
            ("ml_predictions.pitch_error", self.ml_predictions.pitch_error),
            ("ml_predictions.yaw_error", self.ml_predictions.yaw_error),
        ];
        for (field, value) in numeric {
            if !value.is_finite() {
                return Err(FrameError::OutOfRange { field, value });
            }
        }

        if !(0.0..=1.0).contains(&self.stability_index) {
            return Err(FrameError::OutOfRange {
                field: "stability_index",
                value: self.stability_index,
            });
        }

        Ok(())
    }
}
