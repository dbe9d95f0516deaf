//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::hub::HubConfig;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default producer (TCP) port
pub const DEFAULT_PRODUCER_PORT: u16 = 8766;

/// Default subscriber (WebSocket) port
pub const DEFAULT_SUBSCRIBER_PORT: u16 = 8765;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the producer connects to
    pub producer_addr: SocketAddr,

    /// Address subscribers connect to
    pub subscriber_addr: SocketAddr,

    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_subscribers: usize,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout: Duration,

    /// End a producer session after this long without data (None = never)
    pub producer_idle_timeout: Option<Duration>,

    /// How long a superseded producer session gets to wind down
    pub session_handover_timeout: Duration,

    /// WebSocket ping interval towards subscribers
    pub ping_interval: Duration,

    /// Time allowed for a close frame to be written on eviction
    pub close_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size for the producer socket
    pub read_buffer_size: usize,

    /// Maximum producer frame length in bytes
    pub max_frame_size: usize,

    /// Hub settings
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            producer_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PRODUCER_PORT)),
            subscriber_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_SUBSCRIBER_PORT)),
            max_subscribers: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            producer_idle_timeout: None,
            session_handover_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(20),
            close_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Records are small and latency matters
            read_buffer_size: 64 * 1024, // 64KB
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom addresses
    pub fn with_addrs(producer_addr: SocketAddr, subscriber_addr: SocketAddr) -> Self {
        Self {
            producer_addr,
            subscriber_addr,
            ..Default::default()
        }
    }

    /// Set the producer address
    pub fn producer_addr(mut self, addr: SocketAddr) -> Self {
        self.producer_addr = addr;
        self
    }

    /// Set the subscriber address
    pub fn subscriber_addr(mut self, addr: SocketAddr) -> Self {
        self.subscriber_addr = addr;
        self
    }

    /// Set maximum subscribers
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set producer idle timeout
    pub fn producer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.producer_idle_timeout = Some(timeout);
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set per-subscriber queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.hub = self.hub.queue_capacity(capacity);
        self
    }

    /// Set hub configuration
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.producer_addr.port(), DEFAULT_PRODUCER_PORT);
        assert_eq!(config.subscriber_addr.port(), DEFAULT_SUBSCRIBER_PORT);
        assert_eq!(config.max_subscribers, 0);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.producer_idle_timeout.is_none());
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addrs() {
        let producer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let subscriber: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let config = ServerConfig::with_addrs(producer, subscriber);

        assert_eq!(config.producer_addr, producer);
        assert_eq!(config.subscriber_addr, subscriber);
    }

    #[test]
    fn test_builder_queue_capacity() {
        let config = ServerConfig::default().queue_capacity(32);

        assert_eq!(config.hub.queue_capacity, 32);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig::default()
            .producer_addr(addr)
            .subscriber_addr(addr)
            .max_subscribers(10)
            .handshake_timeout(Duration::from_secs(2))
            .producer_idle_timeout(Duration::from_secs(5))
            .ping_interval(Duration::from_secs(1))
            .max_frame_size(1024);

        assert_eq!(config.producer_addr, addr);
        assert_eq!(config.subscriber_addr, addr);
        assert_eq!(config.max_subscribers, 10);
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
        assert_eq!(config.producer_idle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.ping_interval, Duration::from_secs(1));
        assert_eq!(config.max_frame_size, 1024);
    }
}
