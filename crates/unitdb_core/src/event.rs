//! Property change events.
//!
//! Change-notification concerns publish a [`ChangeEvent`] through an
//! injected [`EventPublisher`] after a property mutation succeeded. The
//! core never subscribes; [`ChangeFeed`] is a reference publisher that
//! fans events out to subscribers and keeps a bounded history.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use unitdb_core::ChangeFeed;
//!
//! let feed = Arc::new(ChangeFeed::new());
//! let receiver = feed.subscribe();
//!
//! // Hand `feed.clone()` to `RepositoryBuilder::publisher`; events then
//! // arrive on `receiver` as properties with `notify_changes()` change.
//! assert_eq!(feed.subscriber_count(), 1);
//! # drop(receiver);
//! ```

use crate::entity::EntityId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use unitdb_codec::Value;

/// A property of an entity changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Entity type name.
    pub entity_type: &'static str,
    /// Identity of the changed entity.
    pub entity_id: EntityId,
    /// Property name.
    pub property: String,
    /// Value before the change (`None` = unset).
    pub old: Option<Value>,
    /// Value after the change (`None` = unset).
    pub new: Option<Value>,
}

/// Sink for change events.
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    fn publish(&self, event: ChangeEvent);
}

/// A change event with the position the feed assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    /// Position in the feed, starting at 1.
    pub sequence: u64,
    /// The event.
    pub event: ChangeEvent,
}

/// A publisher that distributes events to subscribers.
///
/// The feed:
/// - Preserves publication order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
/// - Is thread-safe
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<SequencedEvent>>>,
    history: RwLock<Vec<SequencedEvent>>,
    max_history: usize,
    sequence: AtomicU64,
}

impl ChangeFeed {
    /// Creates a new change feed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribes to the feed.
    ///
    /// The receiver gets every event published after this call.
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns events with a sequence greater than `after`, up to `limit`.
    #[must_use]
    pub fn poll(&self, after: u64, limit: usize) -> Vec<SequencedEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > after)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number, or 0 if nothing was published.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for ChangeFeed {
    fn publish(&self, event: ChangeEvent) {
        let entry = {
            let mut history = self.history.write();
            let entry = SequencedEvent {
                sequence: self.sequence.fetch_add(1, Ordering::AcqRel) + 1,
                event,
            };
            history.push(entry.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
            entry
        };

        // Disconnected subscribers are dropped.
        self.subscribers
            .write()
            .retain(|tx| tx.send(entry.clone()).is_ok());
    }
}
