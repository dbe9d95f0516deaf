//! Error types
//!
//! Connection-local failures are logged inside the task that owns the
//! connection; only `Error::Bind` is meant to reach the process entry point.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// A listener could not be bound at startup
    #[error("failed to bind {role} listener on {addr}: {source}")]
    Bind {
        /// Which listener ("producer" or "subscriber")
        role: &'static str,
        /// Requested address
        addr: SocketAddr,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization failure outside of frame decoding
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake did not finish in time
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Client operation attempted without a connection
    #[error("not connected")]
    NotConnected,
}

/// Reasons a telemetry frame is rejected as malformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Frame bytes are not UTF-8
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// Structure, missing field or non-numeric value
    #[error("invalid telemetry JSON: {0}")]
    InvalidJson(String),

    /// A numeric field is outside its allowed range
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name as it appears on the wire
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// Frame exceeds the configured maximum size
    #[error("frame too long: {len} bytes (max {max})")]
    TooLong {
        /// Bytes seen so far without a terminator, or the full line length
        len: usize,
        /// Configured limit
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_role_and_addr() {
        let addr: SocketAddr = "127.0.0.1:8766".parse().unwrap();
        let err = Error::Bind {
            role: "producer",
            addr,
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind producer listener on 127.0.0.1:8766: in use"
        );
    }

    #[test]
    fn test_encode_failure_maps_to_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
