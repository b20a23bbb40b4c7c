//! Chunk entities: the server-confirmed [`Chunk`], the optimistic
//! [`LocalChunk`], and the [`PlayableChunk`] view over either.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::payload::{ChunkAttachmentPayload, ChunkPayload};
use crate::types::{AccountId, ChunkId, EpochMs, StreamId};

pub const LIKE_REACTION: &str = "👍";
pub const DISLIKE_REACTION: &str = "👎";

/// One piece of a chunk's transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Offset from the start of the chunk, in milliseconds.
    pub start: i64,
    /// Length of the segment, in milliseconds.
    pub duration: i64,
    pub text: String,
}

impl TextSegment {
    /// Decodes the packed wire format: a flat `[gap, duration, text, …]`
    /// array where each gap is measured from the previous segment's end.
    pub fn decode_packed(list: &[Value]) -> Vec<TextSegment> {
        let mut segments = Vec::with_capacity(list.len() / 3);
        let mut cursor: i64 = 0;
        for triple in list.chunks_exact(3) {
            let (Some(gap), Some(duration), Some(text)) =
                (triple[0].as_i64(), triple[1].as_i64(), triple[2].as_str())
            else {
                tracing::warn!("malformed transcript triple, dropping remainder");
                break;
            };
            cursor += gap;
            segments.push(TextSegment {
                start: cursor,
                duration,
                text: text.to_owned(),
            });
            cursor += duration;
        }
        segments
    }
}

/// A file attached to a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAttachment {
    pub title: String,
    pub url: String,
}

impl From<&ChunkAttachmentPayload> for ChunkAttachment {
    fn from(payload: &ChunkAttachmentPayload) -> Self {
        Self {
            title: payload
                .title
                .clone()
                .unwrap_or_else(|| "untitled_file".to_owned()),
            url: payload.url.clone(),
        }
    }
}

/// A server-confirmed chunk. Immutable: an updated version arriving from the
/// backend replaces the whole value by id inside the stream's chunk list.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub stream_id: StreamId,
    pub id: ChunkId,
    pub url: String,
    pub attachments: Vec<ChunkAttachment>,
    pub duration: i64,
    pub external_content_id: Option<String>,
    pub external_plays: i64,
    pub reactions: HashMap<AccountId, String>,
    pub sender_id: AccountId,
    pub start: EpochMs,
    pub end: EpochMs,
    pub text_segments: Option<Vec<TextSegment>>,
}

impl Chunk {
    pub fn from_payload(stream_id: StreamId, payload: &ChunkPayload) -> Self {
        let reactions = payload
            .reactions
            .iter()
            .filter_map(|(account, reaction)| {
                // Reaction keys are stringified account ids on the wire.
                let id = account.parse::<i64>().ok()?;
                Some((AccountId(id), reaction.clone()))
            })
            .collect();
        Self {
            stream_id,
            id: payload.id,
            url: payload.url.clone(),
            attachments: payload.attachments.iter().map(Into::into).collect(),
            duration: payload.duration,
            external_content_id: payload.external_content_id.clone(),
            external_plays: payload.external_plays,
            reactions,
            sender_id: payload.sender_id,
            start: payload.start,
            end: payload.end,
            text_segments: payload
                .text
                .as_deref()
                .map(TextSegment::decode_packed),
        }
    }
}

/// A chunk recorded locally and not yet confirmed by the backend. It has no
/// server id, only a local token, and lives at the tail of the stream's
/// chunk list until the confirmed chunk arrives through the merge path.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalChunk {
    pub token: Uuid,
    pub url: String,
    pub attachments: Vec<ChunkAttachment>,
    pub duration: i64,
    pub external_content_id: Option<String>,
    pub sender_id: AccountId,
    pub start: EpochMs,
    pub end: EpochMs,
    pub text_segments: Option<Vec<TextSegment>>,
}

impl LocalChunk {
    /// Synthesizes an optimistic chunk ending now.
    pub fn new(
        sender_id: AccountId,
        url: String,
        duration: i64,
        attachments: Vec<ChunkAttachment>,
        external_content_id: Option<String>,
        text_segments: Option<Vec<TextSegment>>,
        now: EpochMs,
    ) -> Self {
        Self {
            token: Uuid::new_v4(),
            url,
            attachments,
            duration,
            external_content_id,
            sender_id,
            start: now - duration,
            end: now,
            text_segments,
        }
    }
}

/// Either a confirmed or an optimistic chunk, as the playback surface sees
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableChunk {
    Remote(Chunk),
    Local(LocalChunk),
}

impl PlayableChunk {
    pub fn start(&self) -> EpochMs {
        match self {
            PlayableChunk::Remote(c) => c.start,
            PlayableChunk::Local(c) => c.start,
        }
    }

    pub fn end(&self) -> EpochMs {
        match self {
            PlayableChunk::Remote(c) => c.end,
            PlayableChunk::Local(c) => c.end,
        }
    }

    pub fn sender_id(&self) -> AccountId {
        match self {
            PlayableChunk::Remote(c) => c.sender_id,
            PlayableChunk::Local(c) => c.sender_id,
        }
    }

    pub fn duration(&self) -> i64 {
        match self {
            PlayableChunk::Remote(c) => c.duration,
            PlayableChunk::Local(c) => c.duration,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PlayableChunk::Remote(c) => &c.url,
            PlayableChunk::Local(c) => &c.url,
        }
    }

    pub fn as_remote(&self) -> Option<&Chunk> {
        match self {
            PlayableChunk::Remote(c) => Some(c),
            PlayableChunk::Local(_) => None,
        }
    }

    /// Age in seconds relative to `now`.
    pub fn age_secs(&self, now: EpochMs) -> f64 {
        (now - self.end()) as f64 / 1000.0
    }

    pub fn is_by(&self, account: AccountId) -> bool {
        self.sender_id() == account
    }

    pub fn reaction_of(&self, account: AccountId) -> Option<&str> {
        match self {
            PlayableChunk::Remote(c) => c.reactions.get(&account).map(String::as_str),
            PlayableChunk::Local(_) => None,
        }
    }

    /// The transcript, or `None` when there is no non-empty segment.
    pub fn transcript(&self) -> Option<String> {
        let segments = match self {
            PlayableChunk::Remote(c) => c.text_segments.as_deref()?,
            PlayableChunk::Local(c) => c.text_segments.as_deref()?,
        };
        let texts: Vec<&str> = segments
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| s.text.as_str())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packed_transcript_accumulates_offsets() {
        let list = vec![
            json!(100),
            json!(500),
            json!("hello"),
            json!(50),
            json!(300),
            json!("there"),
        ];
        let segments = TextSegment::decode_packed(&list);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 100);
        assert_eq!(segments[0].duration, 500);
        // 100 + 500 + 50
        assert_eq!(segments[1].start, 650);
        assert_eq!(segments[1].text, "there");
    }

    #[test]
    fn transcript_skips_empty_segments() {
        let chunk = PlayableChunk::Remote(Chunk {
            stream_id: StreamId(1),
            id: ChunkId(1),
            url: "u".into(),
            attachments: vec![],
            duration: 0,
            external_content_id: None,
            external_plays: 0,
            reactions: HashMap::new(),
            sender_id: AccountId(1),
            start: 0,
            end: 0,
            text_segments: Some(vec![
                TextSegment { start: 0, duration: 1, text: "a".into() },
                TextSegment { start: 1, duration: 1, text: "".into() },
                TextSegment { start: 2, duration: 1, text: "b".into() },
            ]),
        });
        assert_eq!(chunk.transcript().as_deref(), Some("a b"));
    }

    #[test]
    fn reactions_parse_stringified_account_ids() {
        let payload = ChunkPayload::decode(json!({
            "id": 5, "url": "u", "sender_id": 1, "start": 0, "end": 10,
            "reactions": {"9": "👍", "not-a-number": "👎"}
        }))
        .unwrap();
        let chunk = Chunk::from_payload(StreamId(1), &payload);
        assert_eq!(chunk.reactions.get(&AccountId(9)).map(String::as_str), Some(LIKE_REACTION));
        assert_eq!(chunk.reactions.len(), 1);
    }

    #[test]
    fn local_chunk_spans_back_from_now() {
        let local = LocalChunk::new(AccountId(1), "file".into(), 4000, vec![], None, None, 10_000);
        assert_eq!(local.start, 6000);
        assert_eq!(local.end, 10_000);
    }
}
