//! Producer-side client
//!
//! Used by the simulator binary and the integration tests to stream
//! telemetry into a relay.

pub mod publisher;

pub use publisher::{PublisherConfig, TelemetryPublisher};
