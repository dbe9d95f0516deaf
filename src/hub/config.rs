//! Hub configuration

/// Default per-subscriber queue capacity, about five seconds at 50 Hz
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Broadcast hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Deliveries a subscriber may have pending before it is evicted
    pub queue_capacity: usize,

    /// Push producer session start/end notices to subscribers
    pub notify_sessions: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            notify_sessions: true,
        }
    }
}

impl HubConfig {
    /// Set the per-subscriber queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Enable or disable session notices
    pub fn notify_sessions(mut self, enabled: bool) -> Self {
        self.notify_sessions = enabled;
        self
    }
}
