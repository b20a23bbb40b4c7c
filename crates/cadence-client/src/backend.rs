//! The abstract request-execution boundary.
//!
//! The engine never talks to the network itself: it describes requests as
//! [`Intent`] values and hands them to an injected [`Backend`]. Results come
//! back as a success flag, an optional JSON payload, an optional error
//! message, and an HTTP-like status code. Retry orchestration lives outside
//! this core; [`Intent::is_retryable`] only classifies.

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use cadence_shared::{
    AccountId, ActivityStatus, AttachmentPayload, ChunkAttachment, ChunkId, EpochMs, StreamId,
    TextSegment,
};

/// A participant reference as requests express it: one or more identifiers
/// (account id, phone number, email).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentParticipant {
    pub identifiers: Vec<String>,
}

impl IntentParticipant {
    pub fn from_account(id: AccountId) -> Self {
        Self {
            identifiers: vec![id.to_string()],
        }
    }

    pub fn matches_account(&self, id: AccountId) -> bool {
        let id = id.to_string();
        self.identifiers.iter().any(|identifier| *identifier == id)
    }
}

/// An image to upload alongside a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: String,
    pub data: Vec<u8>,
}

/// A locally recorded chunk as the send request describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct SendableChunk {
    /// Local media location to upload.
    pub url: String,
    /// Duration in milliseconds.
    pub duration: i64,
    pub attachments: Vec<ChunkAttachment>,
    pub external_content_id: Option<String>,
    pub text_segments: Option<Vec<TextSegment>>,
    /// Local token correlating the optimistic chunk with its confirmation.
    pub token: Option<Uuid>,
}

/// Everything this engine asks of the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Requests the most recently interacted-with streams (paginated).
    GetStreams { cursor: Option<String> },
    /// Requests all chunks (up to 100) for a stream.
    GetStreamChunks { stream_id: StreamId },
    /// Creates a new titled stream with the provided participants.
    CreateStream {
        participants: Vec<IntentParticipant>,
        title: Option<String>,
        image: Option<Image>,
    },
    /// Gets or creates an untitled stream with the given participants.
    GetOrCreateStream {
        participants: Vec<IntentParticipant>,
        show_in_recents: bool,
        solo: bool,
    },
    /// Joins a stream using an invite token.
    JoinStream { invite_token: String },
    /// Joins a stream by external service content identifier.
    JoinServiceGroup {
        identifier: String,
        autocreate: bool,
    },
    /// Leaves a stream.
    LeaveStream { stream_id: StreamId },
    /// Uploads a chunk to a stream.
    SendChunk {
        stream_id: StreamId,
        chunk: SendableChunk,
        persist: Option<bool>,
        show_in_recents: Option<bool>,
        duplicate: bool,
    },
    /// Sets (or clears) the current user's reaction on a chunk.
    SetChunkReaction {
        stream_id: StreamId,
        chunk_id: ChunkId,
        reaction: Option<String>,
    },
    /// Advances the current user's played-until mark in a stream.
    SetPlayedUntil {
        stream_id: StreamId,
        played_until: EpochMs,
    },
    /// Changes (or clears) the stream title.
    ChangeStreamTitle {
        stream_id: StreamId,
        title: Option<String>,
    },
    /// Changes (or clears) the stream image.
    ChangeStreamImage {
        stream_id: StreamId,
        image: Option<Image>,
    },
    /// Changes whether the stream is shareable via invite link.
    ChangeStreamShareable {
        stream_id: StreamId,
        shareable: bool,
    },
    /// Adds or replaces a stream attachment.
    AddAttachment {
        stream_id: StreamId,
        attachment_id: String,
        attachment: AttachmentPayload,
    },
    /// Removes a stream attachment.
    RemoveAttachment {
        stream_id: StreamId,
        attachment_id: String,
    },
    /// Adds participants to an existing stream.
    AddParticipants {
        stream_id: StreamId,
        participants: Vec<IntentParticipant>,
    },
    /// Removes participants from an existing stream.
    RemoveParticipants {
        stream_id: StreamId,
        participants: Vec<IntentParticipant>,
    },
    /// Reports the current user's activity ("playing", "recording") in a
    /// stream.
    SetStreamStatus {
        stream_id: StreamId,
        status: ActivityStatus,
        estimated_duration: Option<i64>,
    },
}

impl Intent {
    /// Whether re-issuing this request verbatim is safe. Orchestrating the
    /// retry is the transport layer's job.
    pub fn is_retryable(&self) -> bool {
        match self {
            Intent::GetStreams { .. }
            | Intent::GetStreamChunks { .. }
            | Intent::SetPlayedUntil { .. }
            | Intent::SetChunkReaction { .. }
            | Intent::SetStreamStatus { .. } => true,
            Intent::CreateStream { .. }
            | Intent::GetOrCreateStream { .. }
            | Intent::JoinStream { .. }
            | Intent::JoinServiceGroup { .. }
            | Intent::LeaveStream { .. }
            | Intent::SendChunk { .. }
            | Intent::ChangeStreamTitle { .. }
            | Intent::ChangeStreamImage { .. }
            | Intent::ChangeStreamShareable { .. }
            | Intent::AddAttachment { .. }
            | Intent::RemoveAttachment { .. }
            | Intent::AddParticipants { .. }
            | Intent::RemoveParticipants { .. } => false,
        }
    }
}

/// Outcome of one performed request.
#[derive(Debug, Clone, Default)]
pub struct IntentResult {
    pub successful: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub status_code: u16,
}

impl IntentResult {
    pub fn ok(data: Value) -> Self {
        Self {
            successful: true,
            data: Some(data),
            error: None,
            status_code: 200,
        }
    }

    pub fn failed(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            successful: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }
}

/// The injected request executor. Implementations run the request off the
/// mutation thread and resolve the future when the response is in.
pub trait Backend: Send + Sync {
    fn perform(&self, intent: Intent) -> BoxFuture<'static, IntentResult>;
}
