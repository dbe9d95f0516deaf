//! Producer ingress
//!
//! Owns the single producer connection: reads the byte stream, decodes
//! frames and publishes each record to the hub. Malformed frames are logged
//! and skipped; the connection stays up. Any read error, EOF, idle timeout
//! or handover to a newer producer ends the session.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;

use crate::hub::BroadcastHub;
use crate::protocol::FrameDecoder;
use crate::server::config::ServerConfig;
use crate::session::ProducerSession;
use crate::stats::SessionStats;

/// Why a producer session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Producer closed the connection
    Eof,
    /// Read failed (reset, broken pipe, ...)
    ReadError(io::Error),
    /// No data within the configured idle timeout
    IdleTimeout,
    /// A newer producer session took over
    Superseded,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::Eof => f.write_str("producer closed connection"),
            SessionEnd::ReadError(e) => write!(f, "read error: {}", e),
            SessionEnd::IdleTimeout => f.write_str("idle timeout"),
            SessionEnd::Superseded => f.write_str("superseded by a newer producer"),
        }
    }
}

/// Result of a finished producer session
#[derive(Debug)]
pub struct SessionOutcome {
    /// Why the session ended
    pub reason: SessionEnd,
    /// Final counters
    pub stats: SessionStats,
}

/// One producer session
pub struct ProducerIngress<S> {
    session: ProducerSession,
    stream: S,
    decoder: FrameDecoder,
    hub: Arc<BroadcastHub>,
    read_buffer_size: usize,
    idle_timeout: Option<Duration>,
    shutdown: Option<oneshot::Receiver<()>>,
}

impl<S> ProducerIngress<S>
where
    S: AsyncRead + Unpin,
{
    /// Create an ingress for an accepted producer connection
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        stream: S,
        hub: Arc<BroadcastHub>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            session: ProducerSession::new(session_id, peer_addr),
            stream,
            decoder: FrameDecoder::with_max_frame_size(config.max_frame_size),
            hub,
            read_buffer_size: config.read_buffer_size.max(1),
            idle_timeout: config.producer_idle_timeout,
            shutdown: None,
        }
    }

    /// Stop the session when this receiver fires (or its sender is dropped)
    pub fn with_shutdown(mut self, shutdown: oneshot::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the session to completion
    pub async fn run(mut self) -> SessionOutcome {
        let session_id = self.session.id;

        self.hub.begin_session(session_id).await;
        self.session.start_streaming();
        tracing::info!(
            session_id = session_id,
            peer = %self.session.peer_addr,
            "Producer session streaming"
        );

        let reason = self.read_loop().await;
        self.session.close();

        if self.decoder.pending() > 0 && !self.decoder.is_discarding() {
            tracing::warn!(
                session_id = session_id,
                bytes = self.decoder.pending(),
                "Discarding partial frame at end of session"
            );
        }
        self.decoder.clear();

        self.hub.end_session(session_id).await;

        let stats = self.session.finish();
        tracing::info!(
            session_id = session_id,
            peer = %self.session.peer_addr,
            reason = %reason,
            bytes = stats.bytes_received,
            records = stats.records_decoded,
            published = stats.records_published,
            malformed = stats.malformed_frames,
            duration_ms = stats.duration.as_millis() as u64,
            "Producer session closed"
        );

        SessionOutcome { reason, stats }
    }

    async fn read_loop(&mut self) -> SessionEnd {
        loop {
            self.decoder.buffer_mut().reserve(self.read_buffer_size);

            let read = tokio::select! {
                biased;

                _ = wait_shutdown(&mut self.shutdown) => return SessionEnd::Superseded,
                read = read_some(&mut self.stream, &mut self.decoder, self.idle_timeout) => read,
            };

            match read {
                Some(Ok(0)) => return SessionEnd::Eof,
                Some(Ok(n)) => {
                    self.session.add_bytes_received(n);
                    if let Some(end) = self.drain_frames().await {
                        return end;
                    }
                }
                Some(Err(e)) => return SessionEnd::ReadError(e),
                None => return SessionEnd::IdleTimeout,
            }
        }
    }

    /// Publish every complete frame currently buffered
    async fn drain_frames(&mut self) -> Option<SessionEnd> {
        let session_id = self.session.id;

        while let Some(frame) = self.decoder.next_frame() {
            let record = match frame {
                Ok(record) => record,
                Err(error) => {
                    self.session.on_malformed();
                    tracing::warn!(
                        session_id = session_id,
                        error = %error,
                        "Malformed telemetry frame dropped"
                    );
                    continue;
                }
            };

            let previous = self.session.last_simulation_time;
            if !self.session.on_record(&record) {
                tracing::warn!(
                    session_id = session_id,
                    simulation_time = record.simulation_time,
                    previous = ?previous,
                    "Simulation time went backwards"
                );
            }

            match self.hub.publish(session_id, record).await {
                Ok(fan_out) => {
                    self.session.on_published();
                    tracing::trace!(
                        session_id = session_id,
                        delivered = fan_out.delivered,
                        evicted = fan_out.evicted,
                        "Record published"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        session_id = session_id,
                        error = %error,
                        "Record rejected, session no longer active"
                    );
                    return Some(SessionEnd::Superseded);
                }
            }
        }

        None
    }
}

/// Read into the decoder buffer; `None` means the idle timeout elapsed
async fn read_some<S>(
    stream: &mut S,
    decoder: &mut FrameDecoder,
    idle_timeout: Option<Duration>,
) -> Option<io::Result<usize>>
where
    S: AsyncRead + Unpin,
{
    let read = stream.read_buf(decoder.buffer_mut());
    match idle_timeout {
        Some(timeout) => tokio::time::timeout(timeout, read).await.ok(),
        None => Some(read.await),
    }
}

async fn wait_shutdown(shutdown: &mut Option<oneshot::Receiver<()>>) {
    match shutdown {
        Some(rx) => {
            // a dropped sender also means stop
            let _ = rx.await;
        }
        None => std::future::pending().await,
    }
}
