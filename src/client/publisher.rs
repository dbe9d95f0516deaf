//! Telemetry publisher
//!
//! Producer-side TCP client. Encodes records with the frame codec and writes
//! them to the relay's producer address.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::encode;
use crate::server::config::DEFAULT_PRODUCER_PORT;
use crate::telemetry::TelemetryRecord;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Relay producer address
    pub addr: SocketAddr,
    /// Connection attempt timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on the connection
    pub tcp_nodelay: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PRODUCER_PORT)),
            connect_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
        }
    }
}

impl PublisherConfig {
    /// Config for the given relay address
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Telemetry stream publisher
///
/// Connects lazily: `send` opens the connection if there is none. A failed
/// write drops the connection and returns the error, so the next `send`
/// starts a fresh connection (which the relay treats as a new session).
///
/// # Example
/// ```no_run
/// use telemetry_relay::client::{PublisherConfig, TelemetryPublisher};
/// use telemetry_relay::TelemetryRecord;
///
/// # async fn example() -> telemetry_relay::Result<()> {
/// let addr = "127.0.0.1:8766".parse().unwrap();
/// let mut publisher = TelemetryPublisher::new(PublisherConfig::new(addr));
///
/// publisher.send(&TelemetryRecord::at(0.02)).await?;
/// # Ok(())
/// # }
/// ```
pub struct TelemetryPublisher {
    config: PublisherConfig,
    stream: Option<TcpStream>,
    records_sent: u64,
}

impl TelemetryPublisher {
    /// Create a disconnected publisher
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            stream: None,
            records_sent: 0,
        }
    }

    /// Open the connection, replacing any existing one
    pub async fn connect(&mut self) -> Result<()> {
        self.stream = None;

        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };

        if self.config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        tracing::debug!(addr = %self.config.addr, "Publisher connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Encode and send one record, connecting first if needed
    pub async fn send(&mut self, record: &TelemetryRecord) -> Result<()> {
        let frame = encode(record)?;
        self.send_raw(&frame).await?;
        self.records_sent += 1;
        Ok(())
    }

    /// Write raw bytes to the relay, connecting first if needed
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        if let Err(e) = stream.write_all(data).await {
            tracing::warn!(addr = %self.config.addr, error = %e, "Publisher write failed");
            self.stream = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the connection, ending the producer session on the relay
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    /// Whether a connection is open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Records successfully written since creation
    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }
}
