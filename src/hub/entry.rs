//! Subscriber entry and subscription handle
//!
//! The hub keeps a [`SubscriberEntry`] per subscriber (the sending half of
//! its queue). The subscriber's own task holds the matching
//! [`Subscription`]: the receiving half plus a removal signal. The task
//! never sees the subscriber set itself.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;

use super::delivery::Delivery;

/// Unique subscriber identifier, never reused within a hub
pub type SubscriberId = u64;

/// Why a subscriber left the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Queue was full during a fan-out pass
    QueueFull,
    /// Receiving half of the queue was dropped
    Closed,
    /// Removed through `deregister`
    Deregistered,
    /// Hub is shutting down
    Shutdown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RemovalReason::QueueFull => "queue full",
            RemovalReason::Closed => "queue closed",
            RemovalReason::Deregistered => "deregistered",
            RemovalReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// Result of offering a delivery to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Offer {
    Queued,
    Full,
    Closed,
}

/// Hub-side state for one subscriber
#[derive(Debug)]
pub(super) struct SubscriberEntry {
    pub label: String,
    tx: mpsc::Sender<Delivery>,
    removal: Option<oneshot::Sender<RemovalReason>>,
    pub joined_at: Instant,
    pub delivered: u64,
}

impl SubscriberEntry {
    pub(super) fn new(
        label: String,
        tx: mpsc::Sender<Delivery>,
        removal: oneshot::Sender<RemovalReason>,
    ) -> Self {
        Self {
            label,
            tx,
            removal: Some(removal),
            joined_at: Instant::now(),
            delivered: 0,
        }
    }

    /// Enqueue without waiting
    pub(super) fn offer(&mut self, delivery: Delivery) -> Offer {
        match self.tx.try_send(delivery) {
            Ok(()) => {
                self.delivered += 1;
                Offer::Queued
            }
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Signal the subscriber task that it has been removed
    pub(super) fn notify_removed(&mut self, reason: RemovalReason) {
        if let Some(tx) = self.removal.take() {
            // receiver may already be gone
            let _ = tx.send(reason);
        }
    }
}

/// What a subscriber task observes next
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// Next item in queue order
    Delivery(Delivery),
    /// The hub dropped this subscriber; stop and release the connection
    Removed(RemovalReason),
}

/// Subscriber-side handle returned by `BroadcastHub::register`
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    queue: mpsc::Receiver<Delivery>,
    removal: oneshot::Receiver<RemovalReason>,
    removed: Option<RemovalReason>,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        queue: mpsc::Receiver<Delivery>,
        removal: oneshot::Receiver<RemovalReason>,
    ) -> Self {
        Self {
            id,
            queue,
            removal,
            removed: None,
        }
    }

    /// Subscriber id
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next delivery or for removal
    ///
    /// Removal wins over pending deliveries: an evicted subscriber does not
    /// drain its backlog. Cancel safe, so it can sit in a `select!`.
    pub async fn next_event(&mut self) -> SubscriptionEvent {
        if let Some(reason) = self.removed {
            return SubscriptionEvent::Removed(reason);
        }

        tokio::select! {
            biased;

            reason = &mut self.removal => {
                // sender dropped without a reason: entry went away with the hub
                let reason = reason.unwrap_or(RemovalReason::Shutdown);
                self.removed = Some(reason);
                SubscriptionEvent::Removed(reason)
            }
            delivery = self.queue.recv() => match delivery {
                Some(delivery) => SubscriptionEvent::Delivery(delivery),
                None => {
                    self.removed = Some(RemovalReason::Shutdown);
                    SubscriptionEvent::Removed(RemovalReason::Shutdown)
                }
            },
        }
    }

    /// Wait only for removal, leaving queued deliveries untouched
    ///
    /// Cancel safe. Used to abandon a socket write that is stuck on a
    /// subscriber the hub has already dropped.
    pub async fn removed(&mut self) -> RemovalReason {
        if let Some(reason) = self.removed {
            return reason;
        }
        let reason = (&mut self.removal)
            .await
            .unwrap_or(RemovalReason::Shutdown);
        self.removed = Some(reason);
        reason
    }

    /// Next queued delivery if one is ready, ignoring removal
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.queue.try_recv().ok()
    }

    /// Whether the hub has signalled removal
    pub fn is_removed(&mut self) -> bool {
        if self.removed.is_some() {
            return true;
        }
        match self.removal.try_recv() {
            Ok(reason) => {
                self.removed = Some(reason);
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.removed = Some(RemovalReason::Shutdown);
                true
            }
        }
    }

    /// Number of deliveries waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
