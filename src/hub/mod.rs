//! Broadcast hub: the coordination core of the relay
//!
//! The hub owns the subscriber set and the identity of the active producer
//! session. Producer ingress publishes records into it; each subscriber gets
//! its own bounded FIFO queue, filled by a single fan-out pass per record.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<BroadcastHub>
//!                 ┌──────────────────────────────┐
//!                 │ RwLock<HubState> {           │
//!                 │   active_session,            │
//!                 │   subscribers: id -> Entry { │
//!                 │     tx: mpsc::Sender,        │
//!                 │     removal: oneshot::Tx,    │
//!                 │   }                          │
//!                 │ }                            │
//!                 └──────────────┬───────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!  [ProducerIngress]       [SubscriberEgress]      [SubscriberEgress]
//!  hub.publish()           subscription.next()     subscription.next()
//!        │                       │                       │
//!        └──► fan-out (try_send) ──► queue ──► encode ──► WebSocket
//! ```
//!
//! # Back-pressure
//!
//! Fan-out never waits on a subscriber. If a queue is full the subscriber is
//! evicted: removed from the set and signalled through its removal channel,
//! after which its egress task closes the connection. Other subscribers and
//! the producer are unaffected.
//!
//! Records are shared behind `Arc`, so a fan-out pass clones pointers only.

pub mod config;
pub mod delivery;
pub mod entry;
pub mod error;
pub mod store;

pub use config::HubConfig;
pub use delivery::{Delivery, SessionEvent};
pub use entry::{RemovalReason, SubscriberId, Subscription, SubscriptionEvent};
pub use error::HubError;
pub use store::{BroadcastHub, FanOut};
