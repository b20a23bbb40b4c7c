//! Chunk-level commands: sending, reacting, and play-position updates.

use cadence_shared::{now_ms, ChunkId, ChunkPayload, EpochMs, LocalChunk, StreamId, StreamPayload};

use crate::backend::{Intent, IntentParticipant, SendableChunk};
use crate::error::{ClientError, Result};
use crate::events::SentChunk;
use crate::service::lock;
use crate::state::ClientContext;

use super::{check, ingest_optional_stream};

/// Sends a recorded chunk to a stream.
///
/// The chunk appears locally at once: an optimistic local chunk goes to the
/// tail of the stream's list and the interaction mark is bumped so the
/// stream surfaces immediately. When the upload succeeds, the response's
/// confirmed chunk replaces the local one through the ordinary merge path.
/// A failed upload leaves the local chunk in place; the recording is not
/// discarded, and the next full refresh reconciles the list.
pub async fn send_chunk(
    ctx: &ClientContext,
    stream_id: StreamId,
    chunk: SendableChunk,
    persist: Option<bool>,
    show_in_recents: Option<bool>,
) -> Result<()> {
    send_chunk_inner(ctx, stream_id, chunk, persist, show_in_recents, false).await
}

/// Sends one recording to several streams and/or direct recipients. Streams
/// for bare recipients are resolved through the get-or-create path first.
/// Targets past the first are flagged as duplicates so the backend reuses
/// the uploaded media. Failures are logged per target; the first one is
/// returned after every target was attempted.
pub async fn broadcast_chunk(
    ctx: &ClientContext,
    stream_ids: Vec<StreamId>,
    recipients: Vec<IntentParticipant>,
    chunk: SendableChunk,
) -> Result<()> {
    let mut targets = stream_ids;
    for recipient in recipients {
        let stream =
            super::streams::get_or_create_stream(ctx, vec![recipient], true, false).await?;
        let id = lock(&stream).id();
        if !targets.contains(&id) {
            targets.push(id);
        }
    }

    let mut first_error = None;
    for (index, stream_id) in targets.into_iter().enumerate() {
        let outcome =
            send_chunk_inner(ctx, stream_id, chunk.clone(), None, None, index > 0).await;
        if let Err(error) = outcome {
            tracing::warn!(%stream_id, %error, "broadcast target failed");
            first_error.get_or_insert(error);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

async fn send_chunk_inner(
    ctx: &ClientContext,
    stream_id: StreamId,
    mut chunk: SendableChunk,
    persist: Option<bool>,
    show_in_recents: Option<bool>,
    duplicate: bool,
) -> Result<()> {
    let now = now_ms();
    {
        let mut service = ctx.service();
        let sender = service
            .session()
            .map(|session| session.id)
            .ok_or(ClientError::NoSession)?;
        let stream = service
            .stream_by_id(stream_id)
            .ok_or(ClientError::UnknownStream(stream_id))?;

        let local = LocalChunk::new(
            sender,
            chunk.url.clone(),
            chunk.duration,
            chunk.attachments.clone(),
            chunk.external_content_id.clone(),
            chunk.text_segments.clone(),
            now,
        );
        chunk.token = Some(local.token);
        lock(&stream).append_local_chunk(local, now);

        let mut bump = StreamPayload::partial(stream_id);
        bump.last_interaction = Some(now);
        service.update_with_stream_data(bump);
        // Sending surfaces a hidden stream unless the caller opted out.
        if show_in_recents != Some(false) {
            service.include_in_recents(&stream);
        }

        service.events.sent_chunk.emit(&SentChunk {
            stream_id,
            chunk: chunk.clone(),
        });
    }

    let result = ctx
        .perform(Intent::SendChunk {
            stream_id,
            chunk,
            persist,
            show_in_recents,
            duplicate,
        })
        .await;
    if !result.successful {
        let error = result
            .error
            .unwrap_or_else(|| format!("status {}", result.status_code));
        tracing::warn!(%stream_id, %error, "chunk upload failed");
        return Err(ClientError::Backend(error));
    }
    ingest_optional_stream(ctx, result.data)
}

/// Sets or clears the current user's reaction on a chunk. The reaction is
/// written locally first; the updated chunk in the response merges in by
/// id and confirms it.
pub async fn set_chunk_reaction(
    ctx: &ClientContext,
    stream_id: StreamId,
    chunk_id: ChunkId,
    reaction: Option<String>,
) -> Result<()> {
    {
        let mut service = ctx.service();
        let me = service.session().map(|s| s.id).ok_or(ClientError::NoSession)?;
        let updated = service.stream_by_id(stream_id).and_then(|stream| {
            let guard = lock(&stream);
            guard.chunk_payload(chunk_id).map(|payload| {
                let mut payload = payload.clone();
                match &reaction {
                    Some(symbol) => {
                        payload.reactions.insert(me.to_string(), symbol.clone());
                    }
                    None => {
                        payload.reactions.remove(&me.to_string());
                    }
                }
                payload
            })
        });
        if let Some(payload) = updated {
            service.update_with_chunk_data(stream_id, payload);
        }
    }

    let result = ctx
        .perform(Intent::SetChunkReaction {
            stream_id,
            chunk_id,
            reaction,
        })
        .await;
    if let Some(data) = check(result)? {
        let chunk = ChunkPayload::decode(data)?;
        ctx.service().update_with_chunk_data(stream_id, chunk);
    }
    Ok(())
}

/// Advances the current user's played-until mark, remembering where the
/// play session started. Applied locally first; the high-water merge makes
/// a stale server echo harmless.
pub async fn set_played_until(
    ctx: &ClientContext,
    stream_id: StreamId,
    played_until: EpochMs,
) -> Result<()> {
    {
        let mut service = ctx.service();
        let played_from = service
            .stream_by_id(stream_id)
            .map(|stream| lock(&stream).played_until());
        let mut update = StreamPayload::partial(stream_id);
        update.played_until = Some(played_until);
        update.last_played_from = played_from;
        service.update_with_stream_data(update);
    }
    let result = ctx
        .perform(Intent::SetPlayedUntil {
            stream_id,
            played_until,
        })
        .await;
    ingest_optional_stream(ctx, check(result)?)
}
