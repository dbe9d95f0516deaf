//! Broadcast hub implementation
//!
//! All mutable hub state sits behind one `RwLock`. Registration,
//! deregistration, session changes and fan-out take the write lock, so a
//! fan-out pass sees a fixed subscriber set: a subscriber joining or leaving
//! concurrently either gets the whole record or none of it. Nothing awaits
//! while the lock is held.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use super::config::HubConfig;
use super::delivery::{Delivery, SessionEvent};
use super::entry::{Offer, RemovalReason, SubscriberEntry, SubscriberId, Subscription};
use super::error::HubError;
use crate::stats::{HubStats, SubscriberStats};
use crate::telemetry::TelemetryRecord;

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Subscribers the delivery was queued for
    pub delivered: usize,
    /// Subscribers evicted because their queue was full
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct HubState {
    subscribers: BTreeMap<SubscriberId, SubscriberEntry>,
    active_session: Option<u64>,
    records_published: u64,
    evictions: u64,
    sessions_started: u64,
}

/// Central fan-out point between the producer and all subscribers
pub struct BroadcastHub {
    state: RwLock<HubState>,
    next_subscriber_id: AtomicU64,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    ///
    /// A zero `queue_capacity` is raised to 1.
    pub fn with_config(mut config: HubConfig) -> Self {
        config.queue_capacity = config.queue_capacity.max(1);
        Self {
            state: RwLock::new(HubState::default()),
            next_subscriber_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a subscriber
    ///
    /// The subscriber receives everything fanned out after this returns and
    /// nothing from before.
    pub async fn register(&self, label: impl Into<String>) -> Subscription {
        let label = label.into();
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let (removal_tx, removal_rx) = oneshot::channel();

        let mut state = self.state.write().await;
        state
            .subscribers
            .insert(id, SubscriberEntry::new(label.clone(), tx, removal_tx));

        tracing::info!(
            subscriber_id = id,
            label = %label,
            subscribers = state.subscribers.len(),
            "Subscriber registered"
        );

        Subscription::new(id, rx, removal_rx)
    }

    /// Remove a subscriber
    ///
    /// Idempotent: returns `false` if it was already gone (evicted, or
    /// deregistered earlier).
    pub async fn deregister(&self, id: SubscriberId) -> bool {
        let mut state = self.state.write().await;

        match state.subscribers.remove(&id) {
            Some(mut entry) => {
                entry.notify_removed(RemovalReason::Deregistered);
                tracing::info!(
                    subscriber_id = id,
                    label = %entry.label,
                    delivered = entry.delivered,
                    subscribers = state.subscribers.len(),
                    "Subscriber deregistered"
                );
                true
            }
            None => {
                tracing::debug!(subscriber_id = id, "Deregister of unknown subscriber");
                false
            }
        }
    }

    /// Make `session_id` the only session allowed to publish
    ///
    /// Returns the session it superseded, if one was still active.
    pub async fn begin_session(&self, session_id: u64) -> Option<u64> {
        let mut state = self.state.write().await;

        let previous = state.active_session.replace(session_id);
        state.sessions_started += 1;

        match previous {
            Some(old) => tracing::warn!(
                session_id = session_id,
                superseded = old,
                "Producer session superseded"
            ),
            None => tracing::info!(
                session_id = session_id,
                subscribers = state.subscribers.len(),
                "Producer session started"
            ),
        }

        if self.config.notify_sessions {
            if let Some(old) = previous {
                self.fan_out(&mut state, Delivery::Session(SessionEvent::Ended { session_id: old }));
            }
            self.fan_out(&mut state, Delivery::Session(SessionEvent::Started { session_id }));
        }

        previous
    }

    /// End a producer session
    ///
    /// Does nothing (and returns `false`) if `session_id` is not the active
    /// session, e.g. because a newer producer already replaced it.
    pub async fn end_session(&self, session_id: u64) -> bool {
        let mut state = self.state.write().await;

        if state.active_session != Some(session_id) {
            tracing::warn!(
                session_id = session_id,
                active = ?state.active_session,
                "Session end mismatch"
            );
            return false;
        }

        state.active_session = None;
        tracing::info!(session_id = session_id, "Producer session ended");

        if self.config.notify_sessions {
            self.fan_out(&mut state, Delivery::Session(SessionEvent::Ended { session_id }));
        }

        true
    }

    /// Fan a record out to every current subscriber
    ///
    /// Never waits on subscribers. Fails only if `session_id` is not the
    /// active session.
    pub async fn publish(
        &self,
        session_id: u64,
        record: TelemetryRecord,
    ) -> Result<FanOut, HubError> {
        let mut state = self.state.write().await;

        if state.active_session != Some(session_id) {
            return Err(HubError::StaleSession {
                session_id,
                active: state.active_session,
            });
        }

        state.records_published += 1;
        tracing::trace!(
            session_id = session_id,
            simulation_time = record.simulation_time,
            subscribers = state.subscribers.len(),
            "Publishing record"
        );

        Ok(self.fan_out(&mut state, Delivery::Record(Arc::new(record))))
    }

    /// Remove every subscriber, signalling shutdown
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        let count = state.subscribers.len();

        for (_, mut entry) in std::mem::take(&mut state.subscribers) {
            entry.notify_removed(RemovalReason::Shutdown);
        }
        state.active_session = None;

        tracing::info!(subscribers = count, "Hub closed");
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Whether `id` is still registered
    pub async fn is_registered(&self, id: SubscriberId) -> bool {
        self.state.read().await.subscribers.contains_key(&id)
    }

    /// Currently active producer session
    pub async fn active_session(&self) -> Option<u64> {
        self.state.read().await.active_session
    }

    /// Hub-wide counters
    pub async fn stats(&self) -> HubStats {
        let state = self.state.read().await;
        HubStats {
            subscriber_count: state.subscribers.len(),
            active_session: state.active_session,
            records_published: state.records_published,
            evictions: state.evictions,
            sessions_started: state.sessions_started,
        }
    }

    /// Per-subscriber counters
    pub async fn subscriber_stats(&self, id: SubscriberId) -> Option<SubscriberStats> {
        let state = self.state.read().await;
        state.subscribers.get(&id).map(|entry| SubscriberStats {
            label: entry.label.clone(),
            delivered: entry.delivered,
            connected_for: entry.joined_at.elapsed(),
        })
    }

    /// Single pass over the subscriber set; caller holds the write lock
    fn fan_out(&self, state: &mut HubState, delivery: Delivery) -> FanOut {
        let mut outcome = FanOut::default();
        let mut removed = Vec::new();

        for (id, entry) in state.subscribers.iter_mut() {
            match entry.offer(delivery.clone()) {
                Offer::Queued => outcome.delivered += 1,
                Offer::Full => removed.push((*id, RemovalReason::QueueFull)),
                Offer::Closed => removed.push((*id, RemovalReason::Closed)),
            }
        }

        for (id, reason) in removed {
            let Some(mut entry) = state.subscribers.remove(&id) else {
                continue;
            };
            entry.notify_removed(reason);

            if reason == RemovalReason::QueueFull {
                outcome.evicted += 1;
                state.evictions += 1;
                tracing::warn!(
                    subscriber_id = id,
                    label = %entry.label,
                    capacity = self.config.queue_capacity,
                    "Subscriber evicted: queue full"
                );
            } else {
                tracing::debug!(
                    subscriber_id = id,
                    label = %entry.label,
                    "Subscriber dropped: queue closed"
                );
            }
        }

        outcome
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SubscriptionEvent;

    fn quiet_hub() -> BroadcastHub {
        BroadcastHub::with_config(HubConfig::default().notify_sessions(false))
    }

    fn drain_times(sub: &mut Subscription) -> Vec<f64> {
        let mut times = Vec::new();
        while let Some(delivery) = sub.try_recv() {
            if let Some(record) = delivery.record() {
                times.push(record.simulation_time);
            }
        }
        times
    }

    #[tokio::test]
    async fn test_two_subscribers_then_late_joiner() {
        let hub = quiet_hub();
        hub.begin_session(1).await;

        let mut a = hub.register("a").await;
        let mut b = hub.register("b").await;

        for t in [1.0, 2.0, 3.0] {
            let fan_out = hub.publish(1, TelemetryRecord::at(t)).await.unwrap();
            assert_eq!(fan_out.delivered, 2);
        }

        let mut c = hub.register("c").await;
        hub.publish(1, TelemetryRecord::at(4.0)).await.unwrap();

        assert_eq!(drain_times(&mut a), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(drain_times(&mut b), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(drain_times(&mut c), vec![4.0]);
    }

    #[tokio::test]
    async fn test_full_queue_evicts_only_that_subscriber() {
        let hub = BroadcastHub::with_config(
            HubConfig::default()
                .queue_capacity(4)
                .notify_sessions(false),
        );
        hub.begin_session(1).await;

        let mut slow = hub.register("slow").await;
        let mut fast = hub.register("fast").await;

        let mut received = Vec::new();
        let mut evictions = 0;
        for t in 0..10 {
            let fan_out = hub.publish(1, TelemetryRecord::at(t as f64)).await.unwrap();
            evictions += fan_out.evicted;
            received.extend(drain_times(&mut fast));
        }

        assert_eq!(evictions, 1);
        assert_eq!(received, (0..10).map(|t| t as f64).collect::<Vec<_>>());
        assert!(!hub.is_registered(slow.id()).await);
        assert!(hub.is_registered(fast.id()).await);
        assert!(matches!(
            slow.next_event().await,
            SubscriptionEvent::Removed(RemovalReason::QueueFull)
        ));
        assert_eq!(hub.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_field_raised_to_one() {
        let hub = BroadcastHub::with_config(HubConfig {
            queue_capacity: 0,
            notify_sessions: false,
        });
        assert_eq!(hub.config().queue_capacity, 1);

        let mut sub = hub.register("x").await;
        hub.begin_session(1).await;
        let fan_out = hub.publish(1, TelemetryRecord::at(1.0)).await.unwrap();

        assert_eq!(fan_out.delivered, 1);
        assert_eq!(drain_times(&mut sub), vec![1.0]);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let hub = quiet_hub();
        let mut sub = hub.register("a").await;

        assert!(hub.deregister(sub.id()).await);
        assert!(!hub.deregister(sub.id()).await);
        assert_eq!(hub.subscriber_count().await, 0);
        assert!(sub.is_removed());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let hub = quiet_hub();
        hub.begin_session(1).await;

        let sub = hub.register("gone").await;
        drop(sub);

        let fan_out = hub.publish(1, TelemetryRecord::at(1.0)).await.unwrap();
        assert_eq!(fan_out, FanOut::default());
        assert_eq!(hub.subscriber_count().await, 0);
        assert_eq!(hub.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_stale_session_rejected() {
        let hub = quiet_hub();

        let result = hub.publish(1, TelemetryRecord::at(1.0)).await;
        assert_eq!(
            result,
            Err(HubError::StaleSession {
                session_id: 1,
                active: None
            })
        );

        hub.begin_session(1).await;
        assert_eq!(hub.begin_session(2).await, Some(1));

        let result = hub.publish(1, TelemetryRecord::at(2.0)).await;
        assert!(matches!(result, Err(HubError::StaleSession { .. })));
        assert!(hub.publish(2, TelemetryRecord::at(2.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_end_session_mismatch() {
        let hub = quiet_hub();
        hub.begin_session(1).await;
        hub.begin_session(2).await;

        assert!(!hub.end_session(1).await);
        assert_eq!(hub.active_session().await, Some(2));
        assert!(hub.end_session(2).await);
        assert_eq!(hub.active_session().await, None);
    }

    #[tokio::test]
    async fn test_session_notices() {
        let hub = BroadcastHub::new();
        let mut sub = hub.register("a").await;

        hub.begin_session(1).await;
        hub.publish(1, TelemetryRecord::at(1.0)).await.unwrap();
        hub.begin_session(2).await;
        hub.end_session(2).await;

        let mut events = Vec::new();
        while let Some(delivery) = sub.try_recv() {
            events.push(match delivery {
                Delivery::Session(event) => format!("{:?}", event),
                Delivery::Record(record) => format!("record {}", record.simulation_time),
            });
        }

        assert_eq!(
            events,
            vec![
                "Started { session_id: 1 }",
                "record 1",
                "Ended { session_id: 1 }",
                "Started { session_id: 2 }",
                "Ended { session_id: 2 }",
            ]
        );
    }

    #[tokio::test]
    async fn test_close_signals_shutdown() {
        let hub = quiet_hub();
        let mut sub = hub.register("a").await;

        hub.close().await;

        assert!(matches!(
            sub.next_event().await,
            SubscriptionEvent::Removed(RemovalReason::Shutdown)
        ));
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_deregister_during_publish() {
        let hub = Arc::new(quiet_hub());
        hub.begin_session(1).await;

        let mut subs = Vec::new();
        for i in 0..8 {
            subs.push(hub.register(format!("sub-{}", i)).await);
        }
        let ids: Vec<_> = subs.iter().map(|s| s.id()).collect();

        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for t in 0..100 {
                    hub.publish(1, TelemetryRecord::at(t as f64)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let remover = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for id in ids {
                    hub.deregister(id).await;
                    hub.deregister(id).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        publisher.await.unwrap();
        remover.await.unwrap();

        assert_eq!(hub.subscriber_count().await, 0);
        for mut sub in subs {
            // whatever arrived before removal is a gap-free prefix
            let times = drain_times(&mut sub);
            let expected: Vec<f64> = (0..times.len()).map(|t| t as f64).collect();
            assert_eq!(times, expected);
        }
    }

    #[tokio::test]
    async fn test_subscriber_stats() {
        let hub = quiet_hub();
        hub.begin_session(7).await;
        let sub = hub.register("dash").await;

        hub.publish(7, TelemetryRecord::at(1.0)).await.unwrap();
        hub.publish(7, TelemetryRecord::at(2.0)).await.unwrap();

        let stats = hub.subscriber_stats(sub.id()).await.unwrap();
        assert_eq!(stats.label, "dash");
        assert_eq!(stats.delivered, 2);
        assert_eq!(hub.stats().await.records_published, 2);
    }
}
