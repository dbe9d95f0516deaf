//! Items carried by subscriber queues
//!
//! The hub knows nothing about wire formats; it moves these values and the
//! egress side decides how to encode them.

use std::sync::Arc;

use crate::telemetry::TelemetryRecord;

/// Producer session lifecycle notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A producer connected and became the active session
    Started { session_id: u64 },
    /// The active producer session ended
    Ended { session_id: u64 },
}

/// One entry in a subscriber queue
///
/// Cheap to clone: records are reference counted and shared by every
/// subscriber that receives them.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A telemetry record
    Record(Arc<TelemetryRecord>),
    /// A producer session notice
    Session(SessionEvent),
}

impl Delivery {
    /// The record carried by this delivery, if any
    pub fn record(&self) -> Option<&TelemetryRecord> {
        match self {
            Delivery::Record(record) => Some(record),
            Delivery::Session(_) => None,
        }
    }
}
