//! The stream aggregate: one conversation, its merged payload state, and
//! the derived chunk/participant views.
//!
//! Merging is the heart of eventual consistency here. Payloads arrive
//! partial and out of order, so [`Stream::add_stream_data`] combines old and
//! new field by field: high-water-mark timestamps take the max ever seen,
//! and keys known locally but absent from a partial payload are never
//! dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use cadence_shared::{
    AccountId, ActivityStatus, AttachmentPayload, Chunk, ChunkId, ChunkPayload, EpochMs,
    LocalChunk, Participant, PlayableChunk, StreamId, StreamPayload,
};

use crate::events::Event;

/// Sentinel title marking the pseudo-stream that collects external shares.
pub const EXTERNAL_SHARE_TITLE: &str = "%ShareExternally%";

/// Chunks older than this are excluded from the playable window.
pub const MAX_CHUNK_AGE_SECS: f64 = 7.0 * 86_400.0;

/// How long a participant's transition to idle lingers before taking
/// effect, since another status update usually follows immediately.
const IDLE_LINGER_MS: i64 = 2_000;
/// Padding added to an estimated status duration to absorb lag.
const STATUS_LAG_PAD_MS: i64 = 3_000;
/// Status duration when the sender gave no estimate.
const STATUS_DEFAULT_MS: i64 = 120_000;

/// The canonical in-memory handle to a stream. The registry guarantees at
/// most one per stream id.
pub type SharedStream = Arc<Mutex<Stream>>;

pub struct Stream {
    id: StreamId,
    data: StreamPayload,
    other_participants: Vec<Participant>,
    /// Every chunk currently known, including optimistic local ones at the
    /// tail. Rebuilt from payload data whenever a merge carries chunks,
    /// which is also when stale local chunks get discarded.
    all_chunks: Vec<PlayableChunk>,
    /// Cached recency-window view over `all_chunks`.
    recent_chunks: Vec<PlayableChunk>,
    /// Notifies listeners that this stream changed in some way.
    pub changed: Event<()>,
}

impl Stream {
    /// Builds a stream from a payload. A stream can only come into existence
    /// from a payload carrying both `chunks` and `others`; partial payloads
    /// update existing streams but cannot create them.
    pub fn new(data: StreamPayload, now: EpochMs) -> Option<Self> {
        if data.chunks.is_none() || data.others.is_none() {
            tracing::warn!(stream_id = %data.id, "stream payload too partial to create a stream");
            return None;
        }
        let mut stream = Self {
            id: data.id,
            data,
            other_participants: Vec::new(),
            all_chunks: Vec::new(),
            recent_chunks: Vec::new(),
            changed: Event::new(),
        };
        stream.rebuild_chunks(now);
        stream.rebuild_participants();
        Some(stream)
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn data(&self) -> &StreamPayload {
        &self.data
    }

    // ------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------

    /// Merges a single chunk payload into the stream: bumps
    /// `last_interaction` to cover the chunk's end and re-merges the chunk
    /// list. Participants are untouched. Returns whether state changed.
    pub fn add_chunk_data(&mut self, chunk: ChunkPayload, now: EpochMs) -> bool {
        let old = self.data.clone();
        let last = self.data.last_interaction.unwrap_or(0);
        if chunk.end > last {
            self.data.last_interaction = Some(chunk.end);
        }
        let existing = self.data.chunks.take().unwrap_or_default();
        self.data.chunks = Some(merge_chunks(existing, vec![chunk]));

        let changed = self.data != old;
        if changed {
            self.rebuild_chunks(now);
            self.changed.emit(&());
        }
        changed
    }

    /// Merges a full or partial stream payload into the current state.
    /// Returns whether state actually changed; an idempotent re-ingest of
    /// identical data changes nothing and emits nothing.
    pub fn add_stream_data(&mut self, data: StreamPayload, now: EpochMs) -> bool {
        let old = self.data.clone();
        let mut new = data;

        // High-water marks: a stale or delayed response must never regress
        // a newer local value.
        new.last_interaction = max_option(self.data.last_interaction, new.last_interaction);
        new.last_played_from = max_option(self.data.last_played_from, new.last_played_from);
        new.played_until = max_option(self.data.played_until, new.played_until);

        let chunks_updated = new.chunks.is_some();
        let participants_updated = new.others.is_some();

        match (self.data.chunks.take(), new.chunks.take()) {
            (Some(old), Some(incoming)) => new.chunks = Some(merge_chunks(old, incoming)),
            (old, incoming) => new.chunks = incoming.or(old),
        }
        if new.others.is_none() {
            new.others = self.data.others.take();
        }

        // A partial payload never erases locally-known fields.
        if new.title.is_none() {
            new.title = self.data.title.take();
        }
        if new.image_url.is_none() {
            new.image_url = self.data.image_url.take();
        }
        if new.visible.is_none() {
            new.visible = self.data.visible;
        }
        if new.shareable.is_none() {
            new.shareable = self.data.shareable;
        }
        if new.total_duration.is_none() {
            new.total_duration = self.data.total_duration;
        }
        if new.service_content_id.is_none() {
            new.service_content_id = self.data.service_content_id.take();
        }
        if new.service_member_count.is_none() {
            new.service_member_count = self.data.service_member_count;
        }
        if new.attachments.is_none() {
            new.attachments = self.data.attachments.take();
        }
        for (key, value) in std::mem::take(&mut self.data.extra) {
            new.extra.entry(key).or_insert(value);
        }

        let changed = new != old;
        self.data = new;
        if !changed {
            return false;
        }
        if chunks_updated {
            self.rebuild_chunks(now);
        }
        if participants_updated {
            self.rebuild_participants();
        }
        self.changed.emit(&());
        true
    }

    /// Appends an optimistic local chunk. It lives at the tail of the chunk
    /// list until the next merge that carries chunks replaces it with the
    /// server-confirmed version.
    pub fn append_local_chunk(&mut self, chunk: LocalChunk, now: EpochMs) {
        self.all_chunks.push(PlayableChunk::Local(chunk));
        self.rebuild_window(now);
        self.changed.emit(&());
    }

    /// Writes an attachment slot locally (set or clear), ahead of server
    /// confirmation.
    pub fn update_with_attachment_data(
        &mut self,
        attachment_id: &str,
        attachment: Option<AttachmentPayload>,
    ) {
        let attachments = self.data.attachments.get_or_insert_with(BTreeMap::new);
        match attachment {
            Some(attachment) => {
                attachments.insert(attachment_id.to_owned(), attachment);
            }
            None => {
                attachments.remove(attachment_id);
            }
        }
        self.changed.emit(&());
    }

    /// Replaces a participant wholesale, keeping its position.
    pub fn update_participant(&mut self, participant: Participant) {
        let Some(index) = self
            .other_participants
            .iter()
            .position(|p| p.id == participant.id)
        else {
            return;
        };
        self.other_participants[index] = participant;
        self.changed.emit(&());
    }

    // ------------------------------------------------------------------
    // Activity status
    // ------------------------------------------------------------------

    /// Updates the transient activity status for a participant.
    ///
    /// A transition from playing/recording to idle lingers briefly because
    /// another update usually arrives right behind it. Returns the chosen
    /// status duration in ms when the stream's visible status is non-idle;
    /// the caller is expected to schedule [`Stream::expire_statuses`] after
    /// that long.
    pub fn set_status_for_participant(
        &mut self,
        participant_id: AccountId,
        status: ActivityStatus,
        estimated_duration: Option<i64>,
        now: EpochMs,
    ) -> Option<i64> {
        let index = self
            .other_participants
            .iter()
            .position(|p| p.id == participant_id)?;

        let current = self.other_participants[index].activity_status();
        let duration = if status == ActivityStatus::Idle && current != ActivityStatus::Idle {
            self.other_participants[index].set_activity_status(current, IDLE_LINGER_MS, now);
            IDLE_LINGER_MS
        } else {
            let duration = estimated_duration
                .map(|d| d + STATUS_LAG_PAD_MS)
                .unwrap_or(STATUS_DEFAULT_MS);
            self.other_participants[index].set_activity_status(status, duration, now);
            if current != status {
                self.changed.emit(&());
            }
            duration
        };

        (self.status() != ActivityStatus::Idle).then_some(duration)
    }

    /// Reverts expired activity statuses to idle. Returns whether anything
    /// changed (and emits `changed` if so).
    pub fn expire_statuses(&mut self, now: EpochMs) -> bool {
        let mut something_changed = false;
        for participant in &mut self.other_participants {
            if participant.expire_activity_status(now) {
                something_changed = true;
            }
        }
        if something_changed {
            self.changed.emit(&());
        }
        something_changed
    }

    /// The participant with the most prominent activity status, or `None`
    /// when everyone is idle.
    pub fn non_idle_participant(&self) -> Option<&Participant> {
        let most_active = self
            .other_participants
            .iter()
            .max_by_key(|p| p.activity_status())?;
        (most_active.activity_status() != ActivityStatus::Idle).then_some(most_active)
    }

    /// The stream's visible status: the most prominent participant activity.
    pub fn status(&self) -> ActivityStatus {
        self.non_idle_participant()
            .map(|p| p.activity_status())
            .unwrap_or(ActivityStatus::Idle)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The recency-windowed chunk list, ascending by start time.
    pub fn chunks(&self) -> &[PlayableChunk] {
        &self.recent_chunks
    }

    pub fn other_participants(&self) -> &[Participant] {
        &self.other_participants
    }

    pub fn participant(&self, id: AccountId) -> Option<&Participant> {
        self.other_participants.iter().find(|p| p.id == id)
    }

    pub fn attachments(&self) -> Option<&BTreeMap<String, AttachmentPayload>> {
        self.data.attachments.as_ref()
    }

    /// The raw chunk payload for a chunk id, if the stream knows it.
    pub fn chunk_payload(&self, chunk_id: ChunkId) -> Option<&ChunkPayload> {
        self.data.chunks.as_ref()?.iter().find(|c| c.id == chunk_id)
    }

    pub fn custom_title(&self) -> Option<&str> {
        self.data.title.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.data.image_url.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.data.visible.unwrap_or(true)
    }

    pub fn is_group(&self) -> bool {
        self.data.title.is_some()
    }

    pub fn is_duo(&self) -> bool {
        !self.is_group() && self.other_participants.len() == 1
    }

    pub fn is_solo(&self) -> bool {
        !self.is_group() && self.other_participants.is_empty()
    }

    pub fn is_external_share(&self) -> bool {
        self.other_participants.is_empty() && self.custom_title() == Some(EXTERNAL_SHARE_TITLE)
    }

    /// Whether the stream is still in the invitation stage: one other
    /// participant who has never become active.
    pub fn is_invitation(&self) -> bool {
        if self.data.service_content_id.is_some() {
            return false;
        }
        self.other_participants.len() == 1 && !self.has_active_participants()
    }

    pub fn has_active_participants(&self) -> bool {
        self.other_participants.iter().any(|p| p.is_active())
    }

    /// Epoch ms of the last interaction with this stream. Monotonic
    /// non-decreasing under merge.
    pub fn last_interaction(&self) -> EpochMs {
        self.data.last_interaction.unwrap_or(0)
    }

    pub fn last_interaction_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_interaction())
            .single()
            .unwrap_or_default()
    }

    /// Epoch ms up to which the current user has played this stream.
    pub fn played_until(&self) -> EpochMs {
        self.data.played_until.unwrap_or(0)
    }

    /// Where the user's last play session began, in epoch ms.
    pub fn last_played_from(&self) -> EpochMs {
        self.data.last_played_from.unwrap_or(0)
    }

    pub fn last_chunk_time(&self) -> Option<DateTime<Utc>> {
        let chunk = self.recent_chunks.last()?;
        Utc.timestamp_millis_opt(chunk.end()).single()
    }

    /// Total duration of content in this stream, in seconds.
    pub fn total_duration_secs(&self) -> Option<f64> {
        self.data.total_duration.map(|ms| ms / 1000.0)
    }

    pub fn service_content_id(&self) -> Option<&str> {
        self.data.service_content_id.as_deref()
    }

    pub fn service_member_count(&self) -> Option<i64> {
        self.data.service_member_count
    }

    /// Whether `me` should see this chunk as played: own chunks count as
    /// played outside the solo stream, otherwise the played-until mark
    /// decides.
    pub fn is_chunk_played(&self, chunk: &PlayableChunk, me: AccountId) -> bool {
        (chunk.is_by(me) && !self.is_solo()) || self.played_until() >= chunk.end()
    }

    /// The trailing run of chunks `me` has not played, oldest first. The
    /// scan walks back from the tail, skipping own chunks and stopping at
    /// the first played one.
    pub fn unplayed_chunks(&self, me: AccountId) -> Vec<&PlayableChunk> {
        let mut unplayed = Vec::new();
        for chunk in self.recent_chunks.iter().rev() {
            if chunk.is_by(me) {
                continue;
            }
            if self.is_chunk_played(chunk, me) {
                break;
            }
            unplayed.insert(0, chunk);
        }
        unplayed
    }

    pub fn is_unplayed(&self, me: AccountId) -> bool {
        !self.unplayed_chunks(me).is_empty()
    }

    /// Everyone who has played the given chunk, including the sender and,
    /// when applicable, the current user.
    pub fn participants_played(&self, chunk: &PlayableChunk, me: AccountId) -> Vec<AccountId> {
        let mut played = Vec::new();
        let sender = chunk.sender_id();
        if sender == me {
            played.push(me);
        } else {
            if self.participant(sender).is_some() {
                played.push(sender);
            }
            if self.played_until() >= chunk.end() {
                played.push(me);
            }
        }
        played.extend(
            self.other_participants
                .iter()
                .filter(|p| p.id != sender && p.played_until() >= chunk.end())
                .map(|p| p.id),
        );
        played
    }

    /// Whether the current user was the last to post.
    pub fn has_current_user_replied(&self, me: AccountId) -> bool {
        self.recent_chunks
            .last()
            .map(|chunk| chunk.is_by(me))
            .unwrap_or(false)
    }

    /// The display title: the custom title when set, otherwise the
    /// participants' names, with fallbacks for empty and external-share
    /// streams.
    pub fn title(&self, session_display_name: Option<&str>) -> String {
        if self.is_external_share() {
            return "Shared Videos".to_owned();
        }
        if let Some(title) = self.custom_title() {
            return title.to_owned();
        }
        let names: Vec<String> = if self.other_participants.len() > 1 {
            self.other_participants
                .iter()
                .map(|p| short_name(p.display_name()).to_owned())
                .collect()
        } else {
            self.other_participants
                .iter()
                .map(|p| p.display_name().to_owned())
                .collect()
        };
        if names.is_empty() {
            return match session_display_name {
                Some(name) => format!("{name} (you)"),
                None => "New Conversation".to_owned(),
            };
        }
        names.join(", ")
    }

    /// Abbreviated title, e.g. a first name plus a participant count.
    pub fn short_title(&self, session_display_name: Option<&str>) -> String {
        let title = self.title(session_display_name);
        if self.custom_title().is_some() || self.other_participants.len() <= 1 {
            return short_name(&title).to_owned();
        }
        format!(
            "{} + {}",
            short_name(&title),
            self.other_participants.len() - 1
        )
    }

    pub fn initials(&self, session_display_name: Option<&str>) -> String {
        self.title(session_display_name)
            .split_whitespace()
            .take(2)
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    // ------------------------------------------------------------------
    // Private
    // ------------------------------------------------------------------

    /// Rebuilds the chunk entities from payload data. Local chunks are
    /// intentionally dropped here: by the time a merge carries chunks, the
    /// confirmed version of anything pending is expected to be in it.
    fn rebuild_chunks(&mut self, now: EpochMs) {
        self.all_chunks = self
            .data
            .chunks
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|payload| PlayableChunk::Remote(Chunk::from_payload(self.id, payload)))
            .collect();
        self.rebuild_window(now);
    }

    fn rebuild_window(&mut self, now: EpochMs) {
        self.recent_chunks = self
            .all_chunks
            .iter()
            .filter(|chunk| chunk.age_secs(now) < MAX_CHUNK_AGE_SECS)
            .cloned()
            .collect();
    }

    fn rebuild_participants(&mut self) {
        self.other_participants = self
            .data
            .others
            .as_deref()
            .unwrap_or_default()
            .iter()
            .cloned()
            .map(Participant::from_payload)
            .collect();
    }
}

/// Merges new chunk payloads into an existing list: matching ids replace in
/// place, new ids append, and the list is re-sorted ascending by start time
/// only if something was actually added.
pub fn merge_chunks(
    mut chunks: Vec<ChunkPayload>,
    incoming: Vec<ChunkPayload>,
) -> Vec<ChunkPayload> {
    let mut appended = false;
    for chunk in incoming {
        if let Some(index) = chunks.iter().position(|c| c.id == chunk.id) {
            chunks[index] = chunk;
            continue;
        }
        chunks.push(chunk);
        appended = true;
    }
    if appended {
        chunks.sort_by_key(|c| c.start);
    }
    chunks
}

fn max_option(a: Option<EpochMs>, b: Option<EpochMs>) -> Option<EpochMs> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (value, None) | (None, value) => value,
    }
}

/// First whitespace-separated word of a display name, without any
/// trailing comma left over from a joined participant list.
fn short_name(name: &str) -> &str {
    name.split_whitespace()
        .next()
        .unwrap_or(name)
        .trim_end_matches(',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: EpochMs = 1_000_000;

    fn chunk_payload(id: i64, start: EpochMs, end: EpochMs, sender: i64) -> ChunkPayload {
        ChunkPayload::decode(json!({
            "id": id,
            "url": format!("chunk-{id}"),
            "sender_id": sender,
            "start": start,
            "end": end,
            "duration": end - start
        }))
        .unwrap()
    }

    fn stream_with(chunks: Vec<ChunkPayload>, others: serde_json::Value) -> Stream {
        let mut payload = StreamPayload::decode(json!({
            "id": 1,
            "last_interaction": 0,
            "others": others,
            "chunks": []
        }))
        .unwrap();
        payload.chunks = Some(chunks);
        Stream::new(payload, NOW).unwrap()
    }

    #[test]
    fn creation_requires_chunks_and_others() {
        let partial = StreamPayload::decode(json!({"id": 5, "title": "t"})).unwrap();
        assert!(Stream::new(partial, NOW).is_none());
    }

    #[test]
    fn merge_chunks_replaces_by_id_without_sorting() {
        let old = vec![chunk_payload(1, 100, 200, 9), chunk_payload(2, 300, 400, 9)];
        let replacement = chunk_payload(1, 100, 250, 9);
        let merged = merge_chunks(old, vec![replacement.clone()]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], replacement);
    }

    #[test]
    fn merge_chunks_appends_and_sorts_ascending_by_start() {
        let old = vec![chunk_payload(2, 300, 400, 9)];
        let merged = merge_chunks(old, vec![chunk_payload(1, 100, 200, 9)]);
        let ids: Vec<i64> = merged.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn merge_chunks_never_duplicates_ids() {
        let mut chunks = Vec::new();
        for batch in [
            vec![chunk_payload(1, 100, 200, 9)],
            vec![chunk_payload(2, 300, 400, 9), chunk_payload(1, 100, 200, 9)],
            vec![chunk_payload(1, 100, 220, 9)],
        ] {
            chunks = merge_chunks(chunks, batch);
        }
        assert_eq!(chunks.len(), 2);
        let starts: Vec<EpochMs> = chunks.iter().map(|c| c.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn high_water_marks_never_regress() {
        let mut stream = stream_with(vec![], json!([]));
        for value in [500, 900, 200, 900, 100] {
            let payload = StreamPayload::decode(json!({
                "id": 1,
                "last_interaction": value,
                "played_until": value,
            }))
            .unwrap();
            stream.add_stream_data(payload, NOW);
        }
        assert_eq!(stream.last_interaction(), 900);
        assert_eq!(stream.played_until(), 900);
    }

    #[test]
    fn partial_payload_preserves_existing_fields() {
        let mut payload = StreamPayload::decode(json!({
            "id": 1,
            "title": "Trip",
            "image_url": "http://img",
            "mood": "good",
            "others": [],
            "chunks": []
        }))
        .unwrap();
        payload.chunks = Some(vec![chunk_payload(1, 100, 200, 9)]);
        let mut stream = Stream::new(payload, NOW).unwrap();

        let partial = StreamPayload::decode(json!({"id": 1, "last_interaction": 777})).unwrap();
        stream.add_stream_data(partial, NOW);

        assert_eq!(stream.custom_title(), Some("Trip"));
        assert_eq!(stream.image_url(), Some("http://img"));
        assert_eq!(stream.data().extra.get("mood"), Some(&json!("good")));
        assert_eq!(stream.chunks().len(), 1);
        assert_eq!(stream.last_interaction(), 777);
    }

    #[test]
    fn idempotent_merge_reports_no_change() {
        let mut stream = stream_with(vec![chunk_payload(1, 100, 200, 9)], json!([{"id": 9}]));
        let payload = StreamPayload::decode(json!({
            "id": 1,
            "last_interaction": 200,
            "chunks": [{"id": 1, "url": "chunk-1", "sender_id": 9, "start": 100, "end": 200, "duration": 100}],
        }))
        .unwrap();

        assert!(stream.add_stream_data(payload.clone(), NOW));
        assert!(!stream.add_stream_data(payload, NOW));
    }

    #[test]
    fn add_chunk_data_bumps_last_interaction_to_chunk_end() {
        let mut stream = stream_with(vec![], json!([]));
        stream.add_chunk_data(chunk_payload(1, 100, 5000, 9), NOW);
        assert_eq!(stream.last_interaction(), 5000);

        // A chunk ending earlier does not regress the mark.
        stream.add_chunk_data(chunk_payload(2, 100, 300, 9), NOW);
        assert_eq!(stream.last_interaction(), 5000);
        assert_eq!(stream.chunks().len(), 2);
    }

    #[test]
    fn old_chunks_fall_out_of_the_window() {
        let now = 100 * 86_400_000;
        let fresh = chunk_payload(2, now - 1000, now - 500, 9);
        let stale_end = now - (8 * 86_400_000);
        let stale = chunk_payload(1, stale_end - 1000, stale_end, 9);
        let mut payload = StreamPayload::decode(json!({
            "id": 1, "others": [], "chunks": []
        }))
        .unwrap();
        payload.chunks = Some(vec![stale, fresh]);
        let stream = Stream::new(payload, now).unwrap();
        assert_eq!(stream.chunks().len(), 1);
    }

    #[test]
    fn unplayed_scan_stops_at_first_played() {
        let me = AccountId(1);
        let mut stream = stream_with(
            vec![
                chunk_payload(1, 100, 200, 9),
                chunk_payload(2, 300, 400, 9),
                chunk_payload(3, 500, 600, 9),
            ],
            json!([{"id": 9, "display_name": "Bo"}]),
        );
        let played = StreamPayload::decode(json!({"id": 1, "played_until": 200})).unwrap();
        stream.add_stream_data(played, NOW);

        let unplayed: Vec<i64> = stream
            .unplayed_chunks(me)
            .iter()
            .map(|c| c.as_remote().unwrap().id.0)
            .collect();
        assert_eq!(unplayed, vec![2, 3]);
        assert!(stream.is_unplayed(me));
    }

    #[test]
    fn own_chunks_never_count_as_unplayed() {
        let me = AccountId(1);
        let stream = stream_with(
            vec![chunk_payload(1, 100, 200, 1)],
            json!([{"id": 9, "display_name": "Bo"}]),
        );
        assert!(!stream.is_unplayed(me));

        // The unplayed scan skips the user's own chunks in solo streams
        // too; only incoming chunks can leave a stream unplayed.
        let solo = stream_with(vec![chunk_payload(1, 100, 200, 1)], json!([]));
        assert!(!solo.is_unplayed(me));
        assert!(solo.unplayed_chunks(me).is_empty());
    }

    #[test]
    fn titles_fall_back_sensibly() {
        let duo = stream_with(vec![], json!([{"id": 9, "display_name": "Bo Berg"}]));
        assert_eq!(duo.title(Some("Me")), "Bo Berg");

        let group = stream_with(
            vec![],
            json!([
                {"id": 9, "display_name": "Bo Berg"},
                {"id": 10, "display_name": "Ana Lund"}
            ]),
        );
        assert_eq!(group.title(None), "Bo, Ana");
        assert_eq!(group.short_title(None), "Bo + 1");
        assert_eq!(group.initials(None), "BA");

        let solo = stream_with(vec![], json!([]));
        assert_eq!(solo.title(Some("Kim")), "Kim (you)");
        assert_eq!(solo.title(None), "New Conversation");
    }

    #[test]
    fn external_share_stream_is_detected() {
        let mut payload = StreamPayload::decode(json!({
            "id": 1,
            "title": EXTERNAL_SHARE_TITLE,
            "others": [],
            "chunks": []
        }))
        .unwrap();
        payload.chunks = Some(vec![]);
        let stream = Stream::new(payload, NOW).unwrap();
        assert!(stream.is_external_share());
        assert_eq!(stream.title(None), "Shared Videos");
    }

    #[test]
    fn status_transitions_and_expiry() {
        let mut stream = stream_with(vec![], json!([{"id": 9, "display_name": "Bo"}]));

        let duration = stream.set_status_for_participant(
            AccountId(9),
            ActivityStatus::Recording,
            Some(4000),
            NOW,
        );
        // Estimated duration plus the lag pad.
        assert_eq!(duration, Some(7000));
        assert_eq!(stream.status(), ActivityStatus::Recording);

        // Idle transition lingers instead of applying immediately.
        let linger =
            stream.set_status_for_participant(AccountId(9), ActivityStatus::Idle, None, NOW);
        assert_eq!(linger, Some(2000));
        assert_eq!(stream.status(), ActivityStatus::Recording);

        assert!(stream.expire_statuses(NOW + 2001));
        assert_eq!(stream.status(), ActivityStatus::Idle);
    }

    #[test]
    fn participants_played_includes_sender_and_watchers() {
        let me = AccountId(1);
        let mut stream = stream_with(
            vec![chunk_payload(1, 100, 200, 9)],
            json!([
                {"id": 9, "display_name": "Bo", "played_until": 0},
                {"id": 10, "display_name": "Ana", "played_until": 500}
            ]),
        );
        let update = StreamPayload::decode(json!({"id": 1, "played_until": 300})).unwrap();
        stream.add_stream_data(update, NOW);

        let chunk = stream.chunks()[0].clone();
        let played = stream.participants_played(&chunk, me);
        assert!(played.contains(&AccountId(9))); // sender
        assert!(played.contains(&me)); // current user played past end
        assert!(played.contains(&AccountId(10))); // watcher
        assert_eq!(played.len(), 3);
    }
}
