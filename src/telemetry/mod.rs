//! Telemetry data model
//!
//! One [`TelemetryRecord`] is emitted per control-loop tick by the producer.
//! Records are immutable once decoded; the hub shares them between
//! subscribers behind an `Arc`.

pub mod record;

pub use record::{MlPredictions, Orientation, Position, TelemetryRecord, Velocity};
