//! # telemetry-relay
//!
//! Single-producer, many-subscriber relay for drone simulation telemetry.
//!
//! A simulator connects over TCP and streams newline-delimited JSON records.
//! Every record is fanned out, in order, to all WebSocket subscribers that
//! are connected at that moment. Each subscriber has its own bounded queue;
//! a subscriber that falls too far behind is evicted instead of slowing the
//! producer or its peers.
//!
//! ```no_run
//! use telemetry_relay::{RelayServer, ServerConfig};
//!
//! # async fn example() -> telemetry_relay::Result<()> {
//! let server = RelayServer::bind(ServerConfig::default()).await?;
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod client;
pub mod error;
pub mod export;
pub mod hub;
pub mod model;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;
pub mod telemetry;

pub use error::{Error, Result};
pub use hub::BroadcastHub;
pub use server::{RelayServer, ServerConfig};
pub use telemetry::TelemetryRecord;
