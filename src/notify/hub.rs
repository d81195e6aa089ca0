use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::models::{Episode, Show};

/// A complete, ordered result set for one library query
pub type Snapshot<T> = Arc<[T]>;

/// Fans committed library snapshots out to every subscriber.
///
/// The store publishes from its writer thread, so every subscriber of a
/// query sees snapshots in commit order. Channels are unbounded: a slow
/// consumer buffers, it never loses a snapshot.
pub struct ChangeHub {
    shows: Topic<Show>,
    episodes: Topic<Episode>,
}

impl ChangeHub {
    pub fn new(shows: Vec<Show>, episodes: Vec<Episode>) -> Self {
        Self {
            shows: Topic::new(shows),
            episodes: Topic::new(episodes),
        }
    }

    pub fn subscribe_shows(&self) -> SnapshotStream<Show> {
        self.shows.subscribe()
    }

    pub fn subscribe_episodes(&self) -> SnapshotStream<Episode> {
        self.episodes.subscribe()
    }

    /// Push freshly recomputed snapshots of both queries
    pub fn publish(&self, shows: Vec<Show>, episodes: Vec<Episode>) {
        self.shows.publish(shows);
        self.episodes.publish(episodes);
    }

    pub fn show_subscribers(&self) -> usize {
        self.shows.subscriber_count()
    }

    pub fn episode_subscribers(&self) -> usize {
        self.episodes.subscriber_count()
    }
}

struct Topic<T> {
    state: Mutex<TopicState<T>>,
}

struct TopicState<T> {
    latest: Snapshot<T>,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot<T>>>,
}

impl<T> Topic<T> {
    fn new(initial: Vec<T>) -> Self {
        Self {
            state: Mutex::new(TopicState {
                latest: initial.into(),
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicState<T>> {
        // Publishing never panics while holding the lock, so poisoned state is still valid
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self) -> SnapshotStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        // Cannot fail: the receiver is still in hand
        let _ = tx.send(Arc::clone(&state.latest));
        state.subscribers.push(tx);
        SnapshotStream { rx }
    }

    fn publish(&self, snapshot: Vec<T>) {
        let snapshot: Snapshot<T> = snapshot.into();
        let mut state = self.lock();
        state.latest = Arc::clone(&snapshot);
        state
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
        tracing::trace!("Published snapshot to {} subscribers", state.subscribers.len());
    }

    fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

/// Push-based stream of full snapshots.
///
/// Yields the snapshot current at subscription time first, then one snapshot
/// per committed change. Dropping the stream unsubscribes it.
pub struct SnapshotStream<T> {
    rx: mpsc::UnboundedReceiver<Snapshot<T>>,
}

impl<T> SnapshotStream<T> {
    /// Snapshot already delivered but not yet consumed, if any
    pub fn try_next(&mut self) -> Option<Snapshot<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for SnapshotStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
