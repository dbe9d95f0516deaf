//! Relay server
//!
//! Two listeners share one broadcast hub:
//! - producer ingress: a single TCP producer streaming telemetry frames
//! - subscriber egress: any number of WebSocket subscribers

pub mod config;
pub mod egress;
pub mod ingress;
pub mod listener;

pub use config::ServerConfig;
pub use egress::{EgressEnd, EgressOutcome, SubscriberEgress};
pub use ingress::{ProducerIngress, SessionEnd, SessionOutcome};
pub use listener::RelayServer;
