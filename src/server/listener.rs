//! Relay server listener
//!
//! Binds the producer (TCP) and subscriber (WebSocket) addresses and runs
//! both accept loops on one task. Each accepted connection gets its own
//! task. At most one producer session is live: a new producer connection
//! stops the previous session before its own begins.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::hub::BroadcastHub;
use crate::server::config::ServerConfig;
use crate::server::egress::SubscriberEgress;
use crate::server::ingress::{ProducerIngress, SessionOutcome};

/// The live producer session
struct ActiveProducer {
    session_id: u64,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<SessionOutcome>,
}

impl ActiveProducer {
    /// Signal the session to stop and wait for it, aborting after `timeout`
    async fn stop(mut self, timeout: Duration) {
        // already finished if the receiver is gone
        let _ = self.shutdown.send(());

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(
                session_id = self.session_id,
                error = %e,
                "Producer session task failed"
            ),
            Err(_) => {
                tracing::warn!(
                    session_id = self.session_id,
                    "Producer session did not stop in time, aborting"
                );
                self.handle.abort();
            }
        }
    }
}

/// Telemetry relay server
pub struct RelayServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    producer_listener: TcpListener,
    subscriber_listener: TcpListener,
    producer_addr: SocketAddr,
    subscriber_addr: SocketAddr,
    next_session_id: AtomicU64,
    active_producer: Mutex<Option<ActiveProducer>>,
    subscriber_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Bind both listeners
    ///
    /// Fails with [`Error::Bind`] if either address is unavailable.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let producer_listener = bind_listener("producer", config.producer_addr).await?;
        let subscriber_listener = bind_listener("subscriber", config.subscriber_addr).await?;

        let producer_addr = producer_listener.local_addr()?;
        let subscriber_addr = subscriber_listener.local_addr()?;

        let subscriber_semaphore = if config.max_subscribers > 0 {
            Some(Arc::new(Semaphore::new(config.max_subscribers)))
        } else {
            None
        };

        Ok(Self {
            hub: Arc::new(BroadcastHub::with_config(config.hub.clone())),
            config,
            producer_listener,
            subscriber_listener,
            producer_addr,
            subscriber_addr,
            next_session_id: AtomicU64::new(1),
            active_producer: Mutex::new(None),
            subscriber_semaphore,
        })
    }

    /// Get a reference to the broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Bound producer address (resolves port 0)
    pub fn producer_addr(&self) -> SocketAddr {
        self.producer_addr
    }

    /// Bound subscriber address (resolves port 0)
    pub fn subscriber_addr(&self) -> SocketAddr {
        self.subscriber_addr
    }

    /// Run the server
    ///
    /// This method blocks until the process is killed.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` completes the producer session is stopped and every
    /// subscriber is removed from the hub.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            producer = %self.producer_addr,
            subscriber = %self.subscriber_addr,
            "Telemetry relay listening"
        );

        tokio::select! {
            _ = shutdown => tracing::info!("Shutdown signal received"),
            _ = self.producer_loop() => {}
            _ = self.subscriber_loop() => {}
        }

        if let Some(active) = self.active_producer.lock().await.take() {
            active.stop(self.config.session_handover_timeout).await;
        }
        self.hub.close().await;

        Ok(())
    }

    async fn producer_loop(&self) {
        loop {
            match self.producer_listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_producer(socket, peer_addr).await,
                Err(e) => tracing::error!(error = %e, "Failed to accept producer connection"),
            }
        }
    }

    async fn subscriber_loop(&self) {
        loop {
            match self.subscriber_listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_subscriber(socket, peer_addr),
                Err(e) => tracing::error!(error = %e, "Failed to accept subscriber connection"),
            }
        }
    }

    async fn handle_producer(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            session_id = session_id,
            peer = %peer_addr,
            "Producer connected"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let mut active = self.active_producer.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!(
                session_id = session_id,
                superseded = previous.session_id,
                "Replacing active producer session"
            );
            previous.stop(self.config.session_handover_timeout).await;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ingress = ProducerIngress::new(
            session_id,
            peer_addr,
            socket,
            Arc::clone(&self.hub),
            &self.config,
        )
        .with_shutdown(shutdown_rx);

        *active = Some(ActiveProducer {
            session_id,
            shutdown: shutdown_tx,
            handle: tokio::spawn(ingress.run()),
        });
    }

    fn handle_subscriber(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = if let Some(ref sem) = self.subscriber_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Subscriber rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);

        tokio::spawn(async move {
            let _permit = permit;

            let ws = match handshake(socket, config.handshake_timeout).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(peer = %peer_addr, error = %e, "Subscriber handshake failed");
                    return;
                }
            };

            let subscription = hub.register(peer_addr.to_string()).await;
            SubscriberEgress::new(ws, subscription, hub, peer_addr, &config)
                .run()
                .await;
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

async fn bind_listener(role: &'static str, addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { role, addr, source })
}

async fn handshake(socket: TcpStream, timeout: Duration) -> Result<WebSocketStream<TcpStream>> {
    match tokio::time::timeout(timeout, tokio_tungstenite::accept_async(socket)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::HandshakeTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        ServerConfig::with_addrs(any, any)
    }

    #[tokio::test]
    async fn test_bind_resolves_ports() {
        let server = RelayServer::bind(local_config()).await.unwrap();

        assert_ne!(server.producer_addr().port(), 0);
        assert_ne!(server.subscriber_addr().port(), 0);
        assert_ne!(server.producer_addr(), server.subscriber_addr());
    }

    #[tokio::test]
    async fn test_bind_conflict_names_listener() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let config = local_config().subscriber_addr(addr);

        match RelayServer::bind(config).await {
            Err(Error::Bind { role, addr: failed, .. }) => {
                assert_eq!(role, "subscriber");
                assert_eq!(failed, addr);
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("bind should fail while the port is taken"),
        }
    }

    #[tokio::test]
    async fn test_run_until_closes_hub() {
        let server = RelayServer::bind(local_config()).await.unwrap();
        let hub = Arc::clone(server.hub());
        let mut subscription = hub.register("test").await;

        server.run_until(async {}).await.unwrap();

        assert!(subscription.is_removed());
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
