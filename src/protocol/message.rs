//! Subscriber-side messages
//!
//! Every delivery becomes one WebSocket text message. Records are sent as
//! the bare record object; status notices carry a `type` tag so dashboards
//! can tell them apart.

use serde::Serialize;

use crate::error::Result;
use crate::hub::{Delivery, SessionEvent};

/// Greeting text sent right after a subscriber connects
pub const CONNECTED_MESSAGE: &str = "Connected to telemetry stream";

/// Out-of-band notices pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMessage {
    /// Sent once per subscriber connection
    ConnectionStatus { status: String, message: String },
    /// Producer session started or ended
    SessionStatus { status: String, session_id: u64 },
}

impl StatusMessage {
    /// Greeting for a freshly registered subscriber
    pub fn connected() -> Self {
        StatusMessage::ConnectionStatus {
            status: "connected".into(),
            message: CONNECTED_MESSAGE.into(),
        }
    }

    /// Notice for a producer session change
    pub fn session(event: &SessionEvent) -> Self {
        let (status, session_id) = match *event {
            SessionEvent::Started { session_id } => ("started", session_id),
            SessionEvent::Ended { session_id } => ("ended", session_id),
        };
        StatusMessage::SessionStatus {
            status: status.into(),
            session_id,
        }
    }

    /// JSON text for the wire
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encode a hub delivery as WebSocket message text
pub fn encode_delivery(delivery: &Delivery) -> Result<String> {
    match delivery {
        Delivery::Record(record) => Ok(serde_json::to_string(record.as_ref())?),
        Delivery::Session(event) => StatusMessage::session(event).to_json(),
    }
}
