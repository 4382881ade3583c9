//! Lifecycle notifications and their subscribers.
//!
//! The lifecycle publishes to an explicit list of subscribers. Each
//! [`Subscription`] owns its place in the list and leaves it when
//! unsubscribed or dropped.

use crate::error::{ErrorKind, SpeakerError};
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// A notification emitted by the playback lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerEvent {
    /// The device was opened.
    Opened,
    /// The device finished playing out its buffer.
    Flushed,
    /// The device was released. Emitted once per speaker.
    Closed,
    /// An operation failed.
    Error(SpeakerError),
}

impl SpeakerEvent {
    /// Kind and detail of an error notification.
    pub fn as_error(&self) -> Option<(ErrorKind, String)> {
        match self {
            Self::Error(err) => Some((err.kind(), err.to_string())),
            _ => None,
        }
    }
}

/// Identifies one subscriber in an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// The subscriber list a lifecycle publishes to.
#[derive(Debug, Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriberId, mpsc::UnboundedSender<SpeakerEvent>)>>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new subscriber. It receives events emitted from now on.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((id, tx));
        trace!(?id, "subscribed");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    /// Deliver an event to every subscriber, pruning those that went away.
    pub fn emit(&self, event: SpeakerEvent) {
        trace!(?event, "emit");
        self.subscribers
            .lock()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// A registered subscriber's event feed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<SpeakerEvent>,
    bus: Weak<EventBus>,
}

impl Subscription {
    /// This subscriber's id.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once the speaker is gone and every
    /// queued event has been received.
    pub async fn recv(&mut self) -> Option<SpeakerEvent> {
        self.rx.recv().await
    }

    /// Take a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<SpeakerEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every queued event without waiting.
    pub fn drain(&mut self) -> Vec<SpeakerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Leave the subscriber list. Events already queued are discarded.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = SpeakerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
