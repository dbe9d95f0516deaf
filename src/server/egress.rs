//! Subscriber egress
//!
//! One task per WebSocket subscriber. It drains the subscriber's hub queue
//! in order and writes each delivery as a text message. A slow socket only
//! ever stalls this task; if the queue overflows meanwhile, the hub evicts
//! the subscriber and the task closes the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::hub::{BroadcastHub, RemovalReason, Subscription, SubscriptionEvent};
use crate::protocol::{encode_delivery, StatusMessage};
use crate::server::config::ServerConfig;

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

/// Why a subscriber connection ended
#[derive(Debug)]
pub enum EgressEnd {
    /// Subscriber sent a close frame or the socket reached EOF
    ClientClosed,
    /// Reading from the subscriber failed
    ReadError(WsError),
    /// Writing to the subscriber failed
    WriteError(WsError),
    /// The hub removed the subscriber
    Removed(RemovalReason),
}

impl std::fmt::Display for EgressEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EgressEnd::ClientClosed => f.write_str("subscriber closed connection"),
            EgressEnd::ReadError(e) => write!(f, "read error: {}", e),
            EgressEnd::WriteError(e) => write!(f, "write error: {}", e),
            EgressEnd::Removed(reason) => write!(f, "removed by hub: {}", reason),
        }
    }
}

/// Result of a finished subscriber connection
#[derive(Debug)]
pub struct EgressOutcome {
    /// Why the connection ended
    pub reason: EgressEnd,
    /// Telemetry records written to the socket
    pub records_sent: u64,
}

enum Write {
    Sent,
    Failed(WsError),
    Removed(RemovalReason),
}

/// One subscriber connection
pub struct SubscriberEgress<S> {
    ws: WebSocketStream<S>,
    subscription: Subscription,
    hub: Arc<BroadcastHub>,
    peer_addr: SocketAddr,
    ping_interval: Duration,
    close_timeout: Duration,
}

impl<S> SubscriberEgress<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an egress for a registered subscriber
    ///
    /// A zero `ping_interval` in the config disables pings.
    pub fn new(
        ws: WebSocketStream<S>,
        subscription: Subscription,
        hub: Arc<BroadcastHub>,
        peer_addr: SocketAddr,
        config: &ServerConfig,
    ) -> Self {
        Self {
            ws,
            subscription,
            hub,
            peer_addr,
            ping_interval: config.ping_interval,
            close_timeout: config.close_timeout,
        }
    }

    /// Serve the subscriber until it leaves or is removed
    ///
    /// The subscriber is always deregistered on return.
    pub async fn run(self) -> EgressOutcome {
        let Self {
            ws,
            mut subscription,
            hub,
            peer_addr,
            ping_interval,
            close_timeout,
        } = self;
        let subscriber_id = subscription.id();
        let (mut sink, mut stream) = ws.split();
        let mut records_sent = 0u64;

        tracing::info!(
            subscriber_id = subscriber_id,
            peer = %peer_addr,
            "Subscriber connected"
        );

        let reason = async {
            match StatusMessage::connected().to_json() {
                Ok(text) => match write(&mut sink, &mut subscription, Message::text(text)).await {
                    Write::Sent => {}
                    Write::Failed(e) => return EgressEnd::WriteError(e),
                    Write::Removed(reason) => return EgressEnd::Removed(reason),
                },
                Err(e) => tracing::error!(error = %e, "Failed to encode greeting"),
            }

            let pings_enabled = !ping_interval.is_zero();
            let period = ping_interval.max(Duration::from_millis(1));
            let mut ping = tokio::time::interval_at(Instant::now() + period, period);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let (message, is_record) = tokio::select! {
                    biased;

                    event = subscription.next_event() => match event {
                        SubscriptionEvent::Removed(reason) => return EgressEnd::Removed(reason),
                        SubscriptionEvent::Delivery(delivery) => match encode_delivery(&delivery) {
                            Ok(text) => (Message::text(text), delivery.record().is_some()),
                            Err(e) => {
                                tracing::warn!(
                                    subscriber_id = subscriber_id,
                                    error = %e,
                                    "Failed to encode delivery"
                                );
                                continue;
                            }
                        },
                    },
                    incoming = stream.next() => match incoming {
                        None | Some(Ok(Message::Close(_))) => return EgressEnd::ClientClosed,
                        Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                            tracing::debug!(
                                subscriber_id = subscriber_id,
                                "Ignoring message from subscriber"
                            );
                            continue;
                        }
                        // pong replies are queued by tungstenite itself
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return EgressEnd::ReadError(e),
                    },
                    _ = ping.tick(), if pings_enabled => (Message::Ping(Bytes::new()), false),
                };

                match write(&mut sink, &mut subscription, message).await {
                    Write::Sent => {
                        if is_record {
                            records_sent += 1;
                        }
                    }
                    Write::Failed(e) => return EgressEnd::WriteError(e),
                    Write::Removed(reason) => return EgressEnd::Removed(reason),
                }
            }
        }
        .await;

        if let EgressEnd::Removed(removal) = &reason {
            close(&mut sink, *removal, close_timeout, subscriber_id).await;
        }

        hub.deregister(subscriber_id).await;

        tracing::info!(
            subscriber_id = subscriber_id,
            peer = %peer_addr,
            reason = %reason,
            records_sent = records_sent,
            "Subscriber disconnected"
        );

        EgressOutcome {
            reason,
            records_sent,
        }
    }
}

/// Send one message unless the hub removes the subscriber first
async fn write<S>(sink: &mut WsSink<S>, subscription: &mut Subscription, message: Message) -> Write
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        biased;

        reason = subscription.removed() => Write::Removed(reason),
        result = sink.send(message) => match result {
            Ok(()) => Write::Sent,
            Err(e) => Write::Failed(e),
        },
    }
}

/// Best-effort close frame, bounded so a stuck socket cannot hold the task
async fn close<S>(sink: &mut WsSink<S>, removal: RemovalReason, timeout: Duration, subscriber_id: u64)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let code = match removal {
        RemovalReason::QueueFull => CloseCode::Again,
        _ => CloseCode::Away,
    };
    let frame = CloseFrame {
        code,
        reason: removal.to_string().into(),
    };

    match tokio::time::timeout(timeout, sink.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(
            subscriber_id = subscriber_id,
            error = %e,
            "Close frame not delivered"
        ),
        Err(_) => tracing::debug!(
            subscriber_id = subscriber_id,
            "Close frame timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;
    use crate::hub::HubConfig;
    use crate::telemetry::TelemetryRecord;

    async fn ws_pair(
        buffer: usize,
    ) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server, client) = tokio::io::duplex(buffer);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        (server, client)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn hub(capacity: usize) -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::with_config(
            HubConfig::default()
                .queue_capacity(capacity)
                .notify_sessions(false),
        ))
    }

    async fn next_message(client: &mut WebSocketStream<DuplexStream>) -> Message {
        tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    async fn next_json(client: &mut WebSocketStream<DuplexStream>) -> Value {
        loop {
            if let Message::Text(text) = next_message(client).await {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_greeting_then_records_in_order() {
        let hub = hub(16);
        let (server, mut client) = ws_pair(64 * 1024).await;
        let subscription = hub.register("test").await;
        let id = subscription.id();

        let egress =
            SubscriberEgress::new(server, subscription, hub.clone(), peer(), &ServerConfig::default());
        let handle = tokio::spawn(egress.run());

        let greeting = next_json(&mut client).await;
        assert_eq!(greeting["type"], "connection_status");
        assert_eq!(greeting["status"], "connected");

        hub.begin_session(1).await;
        hub.publish(1, TelemetryRecord::at(1.0)).await.unwrap();
        hub.publish(1, TelemetryRecord::at(2.0)).await.unwrap();

        assert_eq!(next_json(&mut client).await["simulation_time"], 1.0);
        assert_eq!(next_json(&mut client).await["simulation_time"], 2.0);

        client.close(None).await.unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome.reason, EgressEnd::ClientClosed));
        assert_eq!(outcome.records_sent, 2);
        assert!(!hub.is_registered(id).await);
    }

    #[tokio::test]
    async fn test_subscriber_messages_ignored() {
        let hub = hub(16);
        let (server, mut client) = ws_pair(64 * 1024).await;
        let subscription = hub.register("test").await;

        let egress =
            SubscriberEgress::new(server, subscription, hub.clone(), peer(), &ServerConfig::default());
        let handle = tokio::spawn(egress.run());

        next_json(&mut client).await;
        client.send(Message::text("hello")).await.unwrap();

        hub.begin_session(1).await;
        hub.publish(1, TelemetryRecord::at(5.0)).await.unwrap();
        assert_eq!(next_json(&mut client).await["simulation_time"], 5.0);

        drop(client);
        let outcome = handle.await.unwrap();
        assert!(!matches!(outcome.reason, EgressEnd::Removed(_)));
    }

    #[tokio::test]
    async fn test_stalled_subscriber_evicted() {
        let hub = hub(2);
        // too small for even the greeting, so the first write stalls
        let (server, _client) = ws_pair(64).await;
        let subscription = hub.register("stalled").await;

        let mut config = ServerConfig::default();
        config.close_timeout = Duration::from_millis(50);
        let egress = SubscriberEgress::new(server, subscription, hub.clone(), peer(), &config);
        let handle = tokio::spawn(egress.run());

        hub.begin_session(1).await;
        for i in 0..5 {
            hub.publish(1, TelemetryRecord::at(i as f64)).await.unwrap();
        }

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            outcome.reason,
            EgressEnd::Removed(RemovalReason::QueueFull)
        ));
        assert_eq!(outcome.records_sent, 0);
        assert_eq!(hub.subscriber_count().await, 0);
        assert_eq!(hub.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_hub_shutdown_sends_close() {
        let hub = hub(16);
        let (server, mut client) = ws_pair(64 * 1024).await;
        let subscription = hub.register("test").await;

        let egress =
            SubscriberEgress::new(server, subscription, hub.clone(), peer(), &ServerConfig::default());
        let handle = tokio::spawn(egress.run());

        next_json(&mut client).await;
        hub.close().await;

        match next_message(&mut client).await {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("expected close frame, got {:?}", other),
        }

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome.reason,
            EgressEnd::Removed(RemovalReason::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_ping_sent_when_idle() {
        let hub = hub(16);
        let (server, mut client) = ws_pair(64 * 1024).await;
        let subscription = hub.register("test").await;

        let config = ServerConfig::default().ping_interval(Duration::from_millis(20));
        let egress = SubscriberEgress::new(server, subscription, hub.clone(), peer(), &config);
        let _handle = tokio::spawn(egress.run());

        next_json(&mut client).await;
        assert!(matches!(next_message(&mut client).await, Message::Ping(_)));
    }
}
