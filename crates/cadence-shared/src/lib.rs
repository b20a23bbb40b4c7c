//! # cadence-shared
//!
//! Types shared across the cadence workspace: the typed payload decode
//! boundary, the chunk and participant entity models, the ordered mapping
//! with structural diffing, and the id newtypes.

pub mod chunk;
pub mod ordered;
pub mod participant;
pub mod payload;
pub mod types;

mod error;

pub use chunk::{Chunk, ChunkAttachment, LocalChunk, PlayableChunk, TextSegment};
pub use error::DecodeError;
pub use ordered::{Diff, OrderedMap};
pub use participant::Participant;
pub use payload::{
    AttachmentPayload, ChunkAttachmentPayload, ChunkPayload, ParticipantPayload, StreamPayload,
};
pub use types::{now_ms, AccountId, AccountStatus, ActivityStatus, ChunkId, EpochMs, StreamId};
