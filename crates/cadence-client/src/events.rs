//! Change-notification fabric.
//!
//! [`Event`] keeps an explicit subscriber list keyed by a [`Subscription`]
//! handle; unsubscribing is an explicit call, not weak-reference decay.
//! Listeners run synchronously on the emitting (single-writer) thread and
//! must not re-enter the service — they get everything they need in the
//! payload.

use cadence_shared::{Chunk, Diff, StreamId};

use crate::backend::SendableChunk;
use crate::stream::SharedStream;

/// Handle returned by [`Event::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

pub struct Event<T> {
    next_id: u64,
    listeners: Vec<(u64, Box<dyn Fn(&T) + Send>)>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&T) + Send + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        Subscription(id)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.listeners.retain(|(id, _)| *id != subscription.0);
    }

    pub fn emit(&self, value: &T) {
        for (_, listener) in &self.listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Snapshot + structural diff for an ordered stream list.
pub struct StreamListChange {
    pub streams: Vec<SharedStream>,
    pub diff: Diff,
}

/// Snapshot + structural diff for the flattened global chunk list.
pub struct ChunkListChange {
    pub chunks: Vec<Chunk>,
    pub diff: Diff,
}

/// Payload for the just-sent-a-chunk event.
pub struct SentChunk {
    pub stream_id: StreamId,
    pub chunk: SendableChunk,
}

/// All events the stream service exposes to UI collaborators.
#[derive(Default)]
pub struct ServiceEvents {
    /// Something changed, either a single stream or the whole list.
    pub changed: Event<()>,
    /// The ordered recents list changed shape.
    pub recents_changed: Event<StreamListChange>,
    /// The set or order of active streams changed.
    pub actives_changed: Event<StreamListChange>,
    /// The flattened global chunk list changed shape.
    pub chunks_changed: Event<ChunkListChange>,
    /// The number of unplayed streams changed.
    pub unplayed_count_changed: Event<i64>,
    /// A chunk was just (optimistically) sent.
    pub sent_chunk: Event<SentChunk>,
    /// Pagination reached the last page of streams.
    pub streams_end_reached: Event<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscribe_emit_unsubscribe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut event: Event<i64> = Event::new();

        let counter = calls.clone();
        let sub = event.subscribe(move |value| {
            assert_eq!(*value, 7);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        event.emit(&7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        event.unsubscribe(sub);
        event.emit(&7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_the_given_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut event: Event<()> = Event::new();

        let a = event.subscribe({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        let _b = event.subscribe({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(10, Ordering::SeqCst);
            }
        });

        event.unsubscribe(a);
        event.emit(&());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
