//! Producer session bookkeeping
//!
//! A session is the lifetime of one producer connection. Records never
//! cross a session boundary; the hub enforces that, this module tracks the
//! per-session lifecycle and counters.

pub mod state;

pub use state::{ProducerSession, SessionPhase};
