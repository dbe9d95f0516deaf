//! Statistics for producer sessions, subscribers and the hub

use std::time::Duration;

/// Producer session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Total bytes read from the producer
    pub bytes_received: u64,
    /// Frames decoded into valid records
    pub records_decoded: u64,
    /// Frames rejected as malformed
    pub malformed_frames: u64,
    /// Records accepted by the hub
    pub records_published: u64,
    /// Records whose simulation time went backwards
    pub time_regressions: u64,
    /// Session duration
    pub duration: Duration,
    /// Average record rate (records/sec)
    pub record_rate: f64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate record rate from decoded count and duration
    pub fn calculate_record_rate(&mut self) {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.record_rate = self.records_decoded as f64 / secs;
        }
    }
}

/// Per-subscriber statistics
#[derive(Debug, Clone)]
pub struct SubscriberStats {
    /// Label given at registration (usually the peer address)
    pub label: String,
    /// Deliveries queued for this subscriber
    pub delivered: u64,
    /// Time since registration
    pub connected_for: Duration,
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscriber_count: usize,
    /// Producer session allowed to publish
    pub active_session: Option<u64>,
    /// Records fanned out since startup
    pub records_published: u64,
    /// Subscribers evicted for a full queue
    pub evictions: u64,
    /// Producer sessions begun since startup
    pub sessions_started: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.records_decoded, 0);
        assert_eq!(stats.malformed_frames, 0);
        assert_eq!(stats.records_published, 0);
        assert_eq!(stats.record_rate, 0.0);
    }

    #[test]
    fn test_session_stats_calculate_record_rate() {
        let mut stats = SessionStats::new();
        stats.records_decoded = 500;
        stats.duration = Duration::from_secs(10);

        stats.calculate_record_rate();

        assert_eq!(stats.record_rate, 50.0);
    }

    #[test]
    fn test_session_stats_calculate_record_rate_zero_duration() {
        let mut stats = SessionStats::new();
        stats.records_decoded = 500;

        stats.calculate_record_rate();

        assert_eq!(stats.record_rate, 0.0);
    }

    #[test]
    fn test_hub_stats_default() {
        let stats = HubStats::default();
        assert_eq!(stats.subscriber_count, 0);
        assert_eq!(stats.active_session, None);
        assert_eq!(stats.evictions, 0);
    }
}
