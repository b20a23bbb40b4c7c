//! The stream registry: owns every materialized stream, keeps the recents
//! ordering and its derived views, and publishes diffs when they change.
//!
//! All mutation funnels through [`StreamService::set_recents`], which diffs
//! the new ordering against the last published one and runs the refresh
//! pipeline: cache save, unplayed recount, active list, flattened chunk
//! list, and finally the recents diff itself. Batching nests; nothing is
//! published until the outermost batch ends, and the eventual diff is
//! computed against the pre-batch state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use cadence_shared::{
    now_ms, Chunk, ChunkId, ChunkPayload, EpochMs, OrderedMap, PlayableChunk, StreamId,
    StreamPayload,
};
use cadence_store::{StreamCache, MAX_CACHED_STREAMS};

use crate::events::{ChunkListChange, ServiceEvents, StreamListChange};
use crate::session::Session;
use crate::stream::{SharedStream, Stream};

/// When a server list replaces the recents, locally-known streams in the
/// top this-many positions that the server no longer mentions are dropped.
/// Streams further down are assumed to be beyond the fetched page and kept.
const PURGE_WINDOW: usize = 10;

/// Locks a stream, recovering the data if a panicking listener poisoned it.
pub(crate) fn lock(stream: &SharedStream) -> MutexGuard<'_, Stream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct StreamService {
    session: Option<Session>,
    cache: Option<StreamCache>,
    /// Every stream materialized during this process, by id. Entries are
    /// never evicted, so a given id always maps to the same shared handle.
    arena: HashMap<StreamId, SharedStream>,
    /// The published ordering, most recently interacted first.
    recents: OrderedMap<StreamId, SharedStream>,
    /// Derived: recents that have content, external share pinned first.
    active: OrderedMap<StreamId, SharedStream>,
    /// Derived: every confirmed chunk across the recents, newest first.
    chunks: OrderedMap<ChunkId, Chunk>,
    /// -1 until first computed, so the initial count always publishes,
    /// including a zero.
    unplayed_count: i64,
    next_page_cursor: Option<String>,
    batch_depth: u32,
    /// Set when some stream's persisted state changed in place, as opposed
    /// to a pure reorder.
    dirty: bool,
    /// The recents as last published, kept while unpublished mutations
    /// accumulate. The eventual diff is computed against this.
    pending_base: Option<OrderedMap<StreamId, SharedStream>>,
    pub events: ServiceEvents,
}

impl StreamService {
    pub fn new(cache: Option<StreamCache>) -> Self {
        Self {
            session: None,
            cache,
            arena: HashMap::new(),
            recents: OrderedMap::new(),
            active: OrderedMap::new(),
            chunks: OrderedMap::new(),
            unplayed_count: -1,
            next_page_cursor: None,
            batch_depth: 0,
            dirty: false,
            pending_base: None,
            events: ServiceEvents::default(),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Installs the session and seeds the recents, preferring the fresh
    /// stream list embedded in the login response over the disk cache.
    pub fn handle_login(&mut self, session: Session) {
        let account = session.id;
        let embedded = session.embedded_streams().cloned();
        self.session = Some(session);

        if let Some(embedded) = embedded {
            self.restore(embedded);
            return;
        }
        let cached = self
            .cache
            .as_ref()
            .map(|cache| cache.load(account))
            .unwrap_or_default();
        if cached.is_empty() {
            tracing::warn!(%account, "login without embedded or cached streams");
            self.set_recents(OrderedMap::new());
        } else {
            self.restore(cached);
        }
    }

    /// Drops all per-account state. The cache file stays on disk for the
    /// next login.
    pub fn handle_logout(&mut self) {
        self.session = None;
        self.next_page_cursor = None;
        self.arena.clear();
        self.unplayed_count = -1;
        self.pending_base = None;
        self.dirty = false;
        self.set_recents(OrderedMap::new());
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Merges a stream payload into the registry.
    ///
    /// For a known stream the payload merges into the existing shared
    /// handle, however partial it is. An unknown stream is materialized
    /// into the arena only if the payload is complete enough, and is *not*
    /// added to the recents; callers decide that separately. Returns `None`
    /// when the payload could neither match nor create a stream.
    pub fn update_with_stream_data(&mut self, data: StreamPayload) -> Option<SharedStream> {
        let id = data.id;
        let stream = self.materialize(data, now_ms())?;
        if self.recents.contains_key(&id) {
            self.update_stream_order();
        }
        Some(stream)
    }

    /// Merges a single chunk payload into a known stream. Unknown stream
    /// ids are ignored, since a chunk alone cannot create a stream.
    pub fn update_with_chunk_data(
        &mut self,
        stream_id: StreamId,
        chunk: ChunkPayload,
    ) -> Option<SharedStream> {
        let Some(stream) = self.arena.get(&stream_id).cloned() else {
            tracing::warn!(%stream_id, "dropping chunk for unknown stream");
            return None;
        };
        let changed = lock(&stream).add_chunk_data(chunk, now_ms());
        if changed && self.recents.contains_key(&stream_id) {
            self.dirty = true;
            self.update_stream_order();
        }
        Some(stream)
    }

    /// Replaces the recents with a server-fetched list. Streams the list
    /// does not mention are kept when they fall outside the purge window,
    /// or when `purge` is off entirely (pagination appends).
    pub fn set_streams_with_list(&mut self, list: Vec<StreamPayload>, purge: bool) {
        let now = now_ms();
        self.batch(|service| {
            let mut recents = OrderedMap::new();
            for data in list {
                let id = data.id;
                if let Some(stream) = service.materialize(data, now) {
                    recents.append(id, stream);
                }
            }
            let threshold = if purge { PURGE_WINDOW } else { 0 };
            let kept: Vec<(StreamId, SharedStream)> = service
                .recents
                .iter()
                .enumerate()
                .filter(|(index, (id, _))| *index >= threshold && !recents.contains_key(id))
                .map(|(_, (id, stream))| (*id, stream.clone()))
                .collect();
            for (id, stream) in kept {
                recents.append(id, stream);
            }
            service.set_recents(recents);
        });
    }

    /// Adds an arena stream to the recents, in sorted position.
    pub fn include_in_recents(&mut self, stream: &SharedStream) {
        let id = lock(stream).id();
        if self.recents.contains_key(&id) {
            return;
        }
        self.stash_base();
        self.recents.append(id, stream.clone());
        self.dirty = true;
        self.update_stream_order();
    }

    /// Removes a stream from the recents. It stays in the arena, so
    /// existing handles remain valid and the stream can come back later.
    pub fn remove_from_recents(&mut self, stream_id: StreamId) {
        if !self.recents.contains_key(&stream_id) {
            return;
        }
        self.stash_base();
        self.recents.remove(&stream_id);
        self.dirty = true;
        self.update_stream_order();
    }

    /// Re-sorts the recents by last interaction, newest first, and runs the
    /// refresh pipeline. No-op inside a batch; the batch end does it once.
    pub fn update_stream_order(&mut self) {
        if self.batch_depth > 0 {
            return;
        }
        let marks: HashMap<StreamId, EpochMs> = self
            .recents
            .iter()
            .map(|(id, stream)| (*id, lock(stream).last_interaction()))
            .collect();
        // Ties break toward the higher (newer) id for a stable total order.
        let sorted = self
            .recents
            .sorted_by(|(a, _), (b, _)| (marks[b], b.0).cmp(&(marks[a], a.0)));
        self.set_recents(sorted);
    }

    /// Runs `f` with publication suspended. Nested batches are fine; events
    /// and the cache save happen once when the outermost batch ends, with a
    /// diff against the pre-batch state.
    pub fn batch<F: FnOnce(&mut Self)>(&mut self, f: F) {
        self.batch_depth += 1;
        self.stash_base();
        f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.update_stream_order();
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn stream_by_id(&self, id: StreamId) -> Option<SharedStream> {
        self.arena.get(&id).cloned()
    }

    /// Looks up a stream by its external service content id.
    pub fn stream_by_service_id(&self, service_content_id: &str) -> Option<SharedStream> {
        self.arena
            .values()
            .find(|stream| lock(stream).service_content_id() == Some(service_content_id))
            .cloned()
    }

    pub fn recent_streams(&self) -> Vec<SharedStream> {
        self.recents.values().cloned().collect()
    }

    pub fn active_streams(&self) -> Vec<SharedStream> {
        self.active.values().cloned().collect()
    }

    /// Every confirmed chunk across the recents, newest first.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.chunks.values().cloned().collect()
    }

    pub fn unplayed_count(&self) -> i64 {
        self.unplayed_count.max(0)
    }

    pub fn next_page_cursor(&self) -> Option<&str> {
        self.next_page_cursor.as_deref()
    }

    /// Stores the pagination cursor from the last list fetch. A `None`
    /// cursor means the server has no further pages.
    pub fn set_next_page_cursor(&mut self, cursor: Option<String>) {
        let end_reached = cursor.is_none();
        self.next_page_cursor = cursor;
        if end_reached {
            self.events.streams_end_reached.emit(&());
        }
    }

    // ------------------------------------------------------------------
    // Private
    // ------------------------------------------------------------------

    /// Decodes and ingests raw stream values, preserving their order, then
    /// publishes them as the recents in one step.
    fn restore(&mut self, raw: Vec<Value>) {
        let now = now_ms();
        self.batch(|service| {
            let mut recents = OrderedMap::new();
            for value in raw {
                let data = match StreamPayload::decode(value) {
                    Ok(data) => data,
                    Err(error) => {
                        tracing::warn!(%error, "skipping undecodable stored stream");
                        continue;
                    }
                };
                let id = data.id;
                if let Some(stream) = service.materialize(data, now) {
                    recents.append(id, stream);
                }
            }
            service.set_recents(recents);
        });
    }

    /// Merges into an existing arena stream or creates one. Marks the
    /// service dirty when a published stream's state actually changed.
    fn materialize(&mut self, data: StreamPayload, now: EpochMs) -> Option<SharedStream> {
        let id = data.id;
        if let Some(existing) = self.arena.get(&id) {
            let changed = lock(existing).add_stream_data(data, now);
            if changed && self.recents.contains_key(&id) {
                self.dirty = true;
            }
            return Some(existing.clone());
        }
        let stream = Arc::new(Mutex::new(Stream::new(data, now)?));
        self.arena.insert(id, stream.clone());
        Some(stream)
    }

    /// Remembers the currently-published recents before the first
    /// unpublished mutation, so the eventual diff spans every change since.
    fn stash_base(&mut self) {
        if self.pending_base.is_none() {
            self.pending_base = Some(self.recents.clone());
        }
    }

    /// Installs a new recents ordering and, outside a batch, publishes it.
    fn set_recents(&mut self, new: OrderedMap<StreamId, SharedStream>) {
        self.stash_base();
        self.recents = new;
        if self.batch_depth == 0 {
            self.publish();
        }
    }

    /// The refresh pipeline: persists, recounts, rebuilds the derived
    /// views, and emits whatever actually changed.
    fn publish(&mut self) {
        let Some(base) = self.pending_base.take() else {
            return;
        };
        let diff = base.diff(&self.recents);

        self.refresh_unplayed_count();
        self.refresh_active_streams();
        // Any effective reassignment signals, not just payload changes.
        if self.dirty || !diff.is_empty() {
            self.events.changed.emit(&());
        }
        self.refresh_chunk_list();
        if self.dirty || !diff.is_empty() {
            self.save_to_cache();
        }
        if !diff.is_empty() {
            self.events.recents_changed.emit(&StreamListChange {
                streams: self.recents.values().cloned().collect(),
                diff,
            });
        }
        self.dirty = false;
    }

    fn refresh_unplayed_count(&mut self) {
        let Some(me) = self.session.as_ref().map(|s| s.id) else {
            return;
        };
        let count = self
            .recents
            .values()
            .filter(|stream| lock(stream).is_unplayed(me))
            .count() as i64;
        if count != self.unplayed_count {
            self.unplayed_count = count;
            self.events.unplayed_count_changed.emit(&count);
        }
    }

    /// Rebuilds the active list: recents with at least one chunk, in
    /// recents order, with the external-share stream pinned to the front.
    fn refresh_active_streams(&mut self) {
        let mut active = OrderedMap::new();
        for (id, stream) in self.recents.iter() {
            let guard = lock(stream);
            if guard.chunks().is_empty() {
                continue;
            }
            let pin_first = guard.is_external_share();
            drop(guard);
            if pin_first {
                active.insert(0, *id, stream.clone());
            } else {
                active.append(*id, stream.clone());
            }
        }
        let diff = self.active.diff(&active);
        self.active = active;
        if !diff.is_empty() {
            self.events.actives_changed.emit(&StreamListChange {
                streams: self.active.values().cloned().collect(),
                diff,
            });
        }
    }

    /// Rebuilds the flattened confirmed-chunk list, newest end first.
    /// Local chunks never appear here; they exist only inside their stream.
    fn refresh_chunk_list(&mut self) {
        let mut all: Vec<Chunk> = Vec::new();
        for stream in self.recents.values() {
            all.extend(
                lock(stream)
                    .chunks()
                    .iter()
                    .filter_map(PlayableChunk::as_remote)
                    .cloned(),
            );
        }
        all.sort_by(|a, b| (b.end, b.id.0).cmp(&(a.end, a.id.0)));

        let chunks: OrderedMap<ChunkId, Chunk> =
            all.into_iter().map(|chunk| (chunk.id, chunk)).collect();
        let diff = self.chunks.diff(&chunks);
        self.chunks = chunks;
        if !diff.is_empty() {
            self.events.chunks_changed.emit(&ChunkListChange {
                chunks: self.chunks.values().cloned().collect(),
                diff,
            });
        }
    }

    fn save_to_cache(&self) {
        let (Some(cache), Some(session)) = (self.cache.as_ref(), self.session.as_ref()) else {
            return;
        };
        let raw: Vec<Value> = self
            .recents
            .values()
            .take(MAX_CACHED_STREAMS)
            .map(|stream| lock(stream).data().to_raw())
            .collect();
        cache.save_in_background(session.id, raw);
    }
}
