//! Status event surface
//!
//! The engine publishes lifecycle events to registered subscribers instead
//! of writing into an ambient shared-status object, so the protocol state
//! machines can be observed (and tested) without any UI attached.

use super::table_name::TableName;

/// Lifecycle and warning events emitted by the resolver and negotiator.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    ResolveStarted { root: TableName },
    ResolveCompleted { nodes: usize },
    PreviewStarted { max_rows: u64 },
    PreviewCompleted { row_count: u64, max_rows_reached: bool },
    CeilingRaised { max_rows: u64 },
    CommitStarted { max_rows: u64 },
    CommitCompleted { row_count: u64 },
    /// A response arrived for a request that is no longer the latest issued
    /// for its operation and was discarded unapplied.
    StaleResponseDropped { seq: u64 },
    Failed { message: String },
}

type Subscriber = Box<dyn Fn(&StatusEvent) + Send + Sync>;

/// A minimal publish/subscribe bus. Subscribers are called synchronously in
/// registration order.
#[derive(Default)]
pub struct StatusBus {
    subscribers: Vec<Subscriber>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&StatusEvent) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn publish(&self, event: &StatusEvent) {
        log::debug!("status event: {:?}", event);
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }
}

impl std::fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
