//! Session state machine
//!
//! Tracks one producer connection from accept to teardown.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::stats::SessionStats;
use crate::telemetry::TelemetryRecord;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// TCP connected, not yet registered with the hub
    Connected,
    /// Registered as the active session, records flowing
    Streaming,
    /// Teardown in progress
    Closing,
    /// Session over
    Closed,
}

/// State of one producer session
#[derive(Debug)]
pub struct ProducerSession {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Simulation time of the last decoded record
    pub last_simulation_time: Option<f64>,

    /// Running counters
    pub stats: SessionStats,
}

impl ProducerSession {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            last_simulation_time: None,
            stats: SessionStats::new(),
        }
    }

    /// Transition to streaming
    pub fn start_streaming(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// Count bytes read from the socket
    pub fn add_bytes_received(&mut self, bytes: usize) {
        self.stats.bytes_received += bytes as u64;
    }

    /// Record a decoded frame
    ///
    /// Returns `false` if its simulation time is lower than the previous
    /// record's.
    pub fn on_record(&mut self, record: &TelemetryRecord) -> bool {
        self.stats.records_decoded += 1;

        let in_order = self
            .last_simulation_time
            .map_or(true, |last| record.simulation_time >= last);
        if !in_order {
            self.stats.time_regressions += 1;
        }

        self.last_simulation_time = Some(record.simulation_time);
        in_order
    }

    /// Record a malformed frame
    pub fn on_malformed(&mut self) {
        self.stats.malformed_frames += 1;
    }

    /// Record a successful hub publish
    pub fn on_published(&mut self) {
        self.stats.records_published += 1;
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Check if the session is streaming
    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Mark the session closed and return its final statistics
    pub fn finish(&mut self) -> SessionStats {
        self.phase = SessionPhase::Closed;
        self.stats.duration = self.duration();
        self.stats.calculate_record_rate();
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> ProducerSession {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8766);
        ProducerSession::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = session();
        assert_eq!(state.phase, SessionPhase::Connected);

        state.start_streaming();
        assert!(state.is_streaming());

        state.close();
        assert_eq!(state.phase, SessionPhase::Closing);

        let stats = state.finish();
        assert_eq!(state.phase, SessionPhase::Closed);
        assert_eq!(stats.records_decoded, 0);
    }

    #[test]
    fn test_time_regression_detected() {
        let mut state = session();

        assert!(state.on_record(&TelemetryRecord::at(1.0)));
        assert!(state.on_record(&TelemetryRecord::at(1.0)));
        assert!(!state.on_record(&TelemetryRecord::at(0.5)));
        assert!(state.on_record(&TelemetryRecord::at(0.6)));

        assert_eq!(state.stats.records_decoded, 4);
        assert_eq!(state.stats.time_regressions, 1);
    }

    #[test]
    fn test_counters() {
        let mut state = session();
        state.add_bytes_received(100);
        state.add_bytes_received(28);
        state.on_malformed();
        state.on_published();

        assert_eq!(state.stats.bytes_received, 128);
        assert_eq!(state.stats.malformed_frames, 1);
        assert_eq!(state.stats.records_published, 1);
    }
}
