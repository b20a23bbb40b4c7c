//! Typed decoding of backend payloads.
//!
//! Everything the backend sends arrives as loosely-typed JSON. This module is
//! the boundary where that JSON becomes typed payload structs; nothing past
//! it handles raw maps. Keys the engine does not model are retained in a
//! flattened `extra` map so a partial merge can never erase fields the
//! backend knows about but this client does not.
//!
//! Decode failures are per-entity: a chunk or participant missing a required
//! field is logged and skipped without aborting the surrounding update.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::types::{AccountId, AccountStatus, ChunkId, EpochMs, StreamId};

/// A single recorded chunk as the backend describes it.
///
/// `id`, `url`, `sender_id`, `start`, and `end` are required; a payload
/// missing any of them indicates a backend/client contract mismatch and
/// fails decode for this one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub id: ChunkId,
    pub url: String,
    pub sender_id: AccountId,
    pub start: EpochMs,
    pub end: EpochMs,
    #[serde(default)]
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ChunkAttachmentPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_content_id: Option<String>,
    #[serde(default)]
    pub external_plays: i64,
    /// Account id (stringified on the wire) to reaction symbol.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, String>,
    /// Packed transcript: `[gap, duration, text, gap, duration, text, …]`
    /// where each gap is relative to the previous segment's end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkPayload {
    pub fn decode(value: Value) -> Result<Self, DecodeError> {
        let payload: ChunkPayload = serde_json::from_value(value)?;
        if payload.end < payload.start {
            return Err(DecodeError::InvertedRange {
                start: payload.start,
                end: payload.end,
            });
        }
        Ok(payload)
    }
}

/// A file attached to a chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkAttachmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
}

/// A non-current-user member of a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantPayload {
    pub id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_until: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_until_changed: Option<EpochMs>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParticipantPayload {
    /// A minimal participant known only by account id. Older cache versions
    /// stored `others` entries as bare ids in exactly this shape.
    pub fn from_id(id: AccountId) -> Self {
        Self {
            id,
            display_name: None,
            image_url: None,
            location: None,
            timezone: None,
            username: None,
            owner_id: None,
            status: None,
            played_until: None,
            played_until_changed: None,
            extra: Map::new(),
        }
    }
}

/// A stream attachment (sync schedule, transcription settings, and so on).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A full or partial stream description.
///
/// Only `id` is required: push notifications and field-update responses
/// routinely carry a handful of keys. A payload can only *create* a stream
/// when both `chunks` and `others` are present (see the registry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamPayload {
    pub id: StreamId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played_from: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_until: Option<EpochMs>,
    /// Total duration of content in the stream, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_member_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<BTreeMap<String, AttachmentPayload>>,
    #[serde(skip)]
    pub chunks: Option<Vec<ChunkPayload>>,
    #[serde(skip)]
    pub others: Option<Vec<ParticipantPayload>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamPayload {
    /// An empty payload carrying only the stream id. The starting point for
    /// locally synthesized partial updates.
    pub fn partial(id: StreamId) -> Self {
        Self {
            id,
            title: None,
            image_url: None,
            visible: None,
            shareable: None,
            last_interaction: None,
            last_played_from: None,
            played_until: None,
            total_duration: None,
            service_content_id: None,
            service_member_count: None,
            attachments: None,
            chunks: None,
            others: None,
            extra: Map::new(),
        }
    }

    /// Decodes a raw stream payload, leniently handling the entity lists:
    /// chunks and participants that fail to decode are skipped one by one.
    pub fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(DecodeError::WrongType {
                    field: "stream",
                    detail: format!("expected object, got {other}"),
                })
            }
        };
        let chunks = object.remove("chunks");
        let others = object.remove("others");

        let mut payload: StreamPayload = serde_json::from_value(Value::Object(object))?;
        payload.chunks = chunks.map(decode_chunk_list).transpose()?;
        payload.others = others.map(decode_participant_list).transpose()?;
        Ok(payload)
    }

    /// Serializes back to the raw JSON shape, including the entity lists.
    /// This is the form the disk cache persists.
    pub fn to_raw(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(object) = &mut value {
            if let Some(chunks) = &self.chunks {
                object.insert(
                    "chunks".into(),
                    Value::Array(
                        chunks
                            .iter()
                            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                            .collect(),
                    ),
                );
            }
            if let Some(others) = &self.others {
                object.insert(
                    "others".into(),
                    Value::Array(
                        others
                            .iter()
                            .map(|p| serde_json::to_value(p).unwrap_or(Value::Null))
                            .collect(),
                    ),
                );
            }
        }
        value
    }
}

fn decode_chunk_list(value: Value) -> Result<Vec<ChunkPayload>, DecodeError> {
    let list = as_list(value, "chunks")?;
    Ok(list
        .into_iter()
        .filter_map(|entry| match ChunkPayload::decode(entry) {
            Ok(chunk) => Some(chunk),
            Err(error) => {
                tracing::warn!(%error, "skipping undecodable chunk payload");
                None
            }
        })
        .collect())
}

fn decode_participant_list(value: Value) -> Result<Vec<ParticipantPayload>, DecodeError> {
    let list = as_list(value, "others")?;
    Ok(list
        .into_iter()
        .filter_map(|entry| match entry {
            // Legacy shape: a bare account id.
            Value::Number(n) => n
                .as_i64()
                .map(|id| ParticipantPayload::from_id(AccountId(id))),
            other => match serde_json::from_value::<ParticipantPayload>(other) {
                Ok(participant) => Some(participant),
                Err(error) => {
                    tracing::warn!(%error, "skipping undecodable participant payload");
                    None
                }
            },
        })
        .collect())
}

fn as_list(value: Value, field: &'static str) -> Result<Vec<Value>, DecodeError> {
    match value {
        Value::Array(list) => Ok(list),
        other => Err(DecodeError::WrongType {
            field,
            detail: format!("expected array, got {other}"),
        }),
    }
}
