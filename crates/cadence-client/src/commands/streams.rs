//! Stream-level commands: fetching and paging the stream list, creating
//! and joining streams, membership and metadata changes, and activity
//! status plumbing.

use std::time::Duration;

use cadence_shared::{now_ms, AccountId, ActivityStatus, AttachmentPayload, StreamId, StreamPayload};

use crate::backend::{Image, Intent, IntentParticipant};
use crate::error::{ClientError, Result};
use crate::service::lock;
use crate::state::ClientContext;
use crate::stream::SharedStream;

use super::{check, decode_stream_list, expect_data, ingest_optional_stream};

/// Fetches the first page of streams and replaces the recents with it.
/// Streams the server no longer lists near the top are purged.
pub async fn refresh_streams(ctx: &ClientContext) -> Result<()> {
    let result = ctx.perform(Intent::GetStreams { cursor: None }).await;
    let (streams, cursor) = decode_stream_list(expect_data(result)?)?;

    let mut service = ctx.service();
    service.set_streams_with_list(streams, true);
    service.set_next_page_cursor(cursor);
    Ok(())
}

/// Fetches the next page, if the last response said there is one, and
/// merges it into the recents without purging.
pub async fn load_more_streams(ctx: &ClientContext) -> Result<()> {
    let Some(cursor) = ctx.service().next_page_cursor().map(str::to_owned) else {
        return Ok(());
    };
    let result = ctx
        .perform(Intent::GetStreams {
            cursor: Some(cursor),
        })
        .await;
    let (streams, cursor) = decode_stream_list(expect_data(result)?)?;

    let mut service = ctx.service();
    service.set_streams_with_list(streams, false);
    service.set_next_page_cursor(cursor);
    Ok(())
}

/// Re-fetches one stream with its full chunk list.
pub async fn refresh_stream_chunks(ctx: &ClientContext, stream_id: StreamId) -> Result<()> {
    let result = ctx.perform(Intent::GetStreamChunks { stream_id }).await;
    let payload = StreamPayload::decode(expect_data(result)?)?;
    ctx.service().update_with_stream_data(payload);
    Ok(())
}

/// Creates a new titled stream and surfaces it in the recents.
pub async fn create_stream(
    ctx: &ClientContext,
    participants: Vec<IntentParticipant>,
    title: Option<String>,
    image: Option<Image>,
) -> Result<SharedStream> {
    ingest_created(
        ctx,
        Intent::CreateStream {
            participants,
            title,
            image,
        },
        true,
    )
    .await
}

/// Gets or creates the untitled stream with exactly these participants.
pub async fn get_or_create_stream(
    ctx: &ClientContext,
    participants: Vec<IntentParticipant>,
    show_in_recents: bool,
    solo: bool,
) -> Result<SharedStream> {
    ingest_created(
        ctx,
        Intent::GetOrCreateStream {
            participants,
            show_in_recents,
            solo,
        },
        show_in_recents,
    )
    .await
}

/// Joins a stream via an invite token.
pub async fn join_stream(ctx: &ClientContext, invite_token: String) -> Result<SharedStream> {
    ingest_created(ctx, Intent::JoinStream { invite_token }, true).await
}

/// Joins (or creates) the stream backing an external service group.
pub async fn join_service_group(
    ctx: &ClientContext,
    identifier: String,
    autocreate: bool,
) -> Result<SharedStream> {
    ingest_created(
        ctx,
        Intent::JoinServiceGroup {
            identifier,
            autocreate,
        },
        true,
    )
    .await
}

/// Finds the stream backing an external service group, checking local
/// state before asking the backend. Never creates the group.
pub async fn find_service_stream(ctx: &ClientContext, identifier: &str) -> Result<SharedStream> {
    if let Some(stream) = ctx.service().stream_by_service_id(identifier) {
        return Ok(stream);
    }
    join_service_group(ctx, identifier.to_owned(), false).await
}

/// Leaves a stream and drops it from the recents. The arena keeps it, so
/// late responses referencing it still merge somewhere.
pub async fn leave_stream(ctx: &ClientContext, stream_id: StreamId) -> Result<()> {
    let result = ctx.perform(Intent::LeaveStream { stream_id }).await;
    check(result)?;
    ctx.service().remove_from_recents(stream_id);
    Ok(())
}

/// Renames a stream, or clears its custom title with `None`.
pub async fn change_stream_title(
    ctx: &ClientContext,
    stream_id: StreamId,
    title: Option<String>,
) -> Result<()> {
    let result = ctx
        .perform(Intent::ChangeStreamTitle {
            stream_id,
            title: title.clone(),
        })
        .await;
    let data = check(result)?;
    if data.is_none() {
        // No response body: apply the rename locally. Clearing cannot be
        // expressed as a partial payload and waits for the next refresh.
        if let Some(title) = title {
            let mut update = StreamPayload::partial(stream_id);
            update.title = Some(title);
            ctx.service().update_with_stream_data(update);
        }
        return Ok(());
    }
    ingest_optional_stream(ctx, data)
}

pub async fn change_stream_image(
    ctx: &ClientContext,
    stream_id: StreamId,
    image: Option<Image>,
) -> Result<()> {
    let result = ctx
        .perform(Intent::ChangeStreamImage { stream_id, image })
        .await;
    ingest_optional_stream(ctx, check(result)?)
}

/// Turns invite-link sharing on or off for a stream.
pub async fn set_stream_shareable(
    ctx: &ClientContext,
    stream_id: StreamId,
    shareable: bool,
) -> Result<()> {
    let result = ctx
        .perform(Intent::ChangeStreamShareable {
            stream_id,
            shareable,
        })
        .await;
    let data = check(result)?;
    if data.is_none() {
        let mut update = StreamPayload::partial(stream_id);
        update.shareable = Some(shareable);
        ctx.service().update_with_stream_data(update);
        return Ok(());
    }
    ingest_optional_stream(ctx, data)
}

/// Sets or clears a stream attachment. The attachment slot is written
/// locally first so the UI reflects it immediately.
pub async fn set_attachment(
    ctx: &ClientContext,
    stream_id: StreamId,
    attachment_id: &str,
    attachment: Option<AttachmentPayload>,
) -> Result<()> {
    {
        let service = ctx.service();
        let stream = service
            .stream_by_id(stream_id)
            .ok_or(ClientError::UnknownStream(stream_id))?;
        lock(&stream).update_with_attachment_data(attachment_id, attachment.clone());
    }
    let intent = match attachment {
        Some(attachment) => Intent::AddAttachment {
            stream_id,
            attachment_id: attachment_id.to_owned(),
            attachment,
        },
        None => Intent::RemoveAttachment {
            stream_id,
            attachment_id: attachment_id.to_owned(),
        },
    };
    let result = ctx.perform(intent).await;
    ingest_optional_stream(ctx, check(result)?)
}

pub async fn add_participants(
    ctx: &ClientContext,
    stream_id: StreamId,
    participants: Vec<IntentParticipant>,
) -> Result<()> {
    let result = ctx
        .perform(Intent::AddParticipants {
            stream_id,
            participants,
        })
        .await;
    ingest_optional_stream(ctx, check(result)?)
}

pub async fn remove_participants(
    ctx: &ClientContext,
    stream_id: StreamId,
    participants: Vec<IntentParticipant>,
) -> Result<()> {
    let result = ctx
        .perform(Intent::RemoveParticipants {
            stream_id,
            participants,
        })
        .await;
    ingest_optional_stream(ctx, check(result)?)
}

/// Reports the current user's activity in a stream so other members can
/// show it.
pub async fn report_status(
    ctx: &ClientContext,
    stream_id: StreamId,
    status: ActivityStatus,
    estimated_duration: Option<i64>,
) -> Result<()> {
    let result = ctx
        .perform(Intent::SetStreamStatus {
            stream_id,
            status,
            estimated_duration,
        })
        .await;
    check(result)?;
    Ok(())
}

/// Applies a push-delivered activity status for another participant and
/// schedules its expiry. Must run inside the async runtime.
pub fn apply_participant_status(
    ctx: &ClientContext,
    stream_id: StreamId,
    participant_id: AccountId,
    status: ActivityStatus,
    estimated_duration: Option<i64>,
) {
    let Some(stream) = ctx.service().stream_by_id(stream_id) else {
        tracing::debug!(%stream_id, "activity status for unknown stream");
        return;
    };
    let scheduled =
        lock(&stream).set_status_for_participant(participant_id, status, estimated_duration, now_ms());
    let Some(duration) = scheduled else {
        return;
    };
    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(duration.max(0) as u64 + 100)).await;
        if let Some(stream) = ctx.service().stream_by_id(stream_id) {
            lock(&stream).expire_statuses(now_ms());
        }
    });
}

async fn ingest_created(
    ctx: &ClientContext,
    intent: Intent,
    show_in_recents: bool,
) -> Result<SharedStream> {
    let result = ctx.perform(intent).await;
    let payload = StreamPayload::decode(expect_data(result)?)?;

    let mut service = ctx.service();
    let stream = service
        .update_with_stream_data(payload)
        .ok_or(ClientError::BadStreamPayload)?;
    if show_in_recents {
        service.include_in_recents(&stream);
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::IntentResult;
    use crate::commands::testing::{context_with, raw_stream, stream_payload, MockBackend};
    use serde_json::json;

    #[tokio::test]
    async fn refresh_populates_recents_and_cursor() {
        let backend = MockBackend::scripted(vec![IntentResult::ok(json!({
            "streams": [raw_stream(1, 500), raw_stream(2, 900)],
            "cursor": "page-2"
        }))]);
        let ctx = context_with(backend.clone());

        refresh_streams(&ctx).await.unwrap();

        let service = ctx.service();
        assert_eq!(service.recent_streams().len(), 2);
        assert_eq!(service.next_page_cursor(), Some("page-2"));
        assert_eq!(
            backend.seen.lock().unwrap()[0],
            Intent::GetStreams { cursor: None }
        );
    }

    #[tokio::test]
    async fn load_more_appends_and_signals_end() {
        let backend = MockBackend::scripted(vec![
            IntentResult::ok(json!({"streams": [raw_stream(1, 900)], "cursor": "p2"})),
            IntentResult::ok(json!({"streams": [raw_stream(2, 500)]})),
        ]);
        let ctx = context_with(backend.clone());

        refresh_streams(&ctx).await.unwrap();
        load_more_streams(&ctx).await.unwrap();

        let service = ctx.service();
        assert_eq!(service.recent_streams().len(), 2);
        assert!(service.next_page_cursor().is_none());
        assert_eq!(
            backend.seen.lock().unwrap()[1],
            Intent::GetStreams {
                cursor: Some("p2".into())
            }
        );

        // Cursor exhausted: another load-more never hits the backend.
        drop(service);
        load_more_streams(&ctx).await.unwrap();
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_backend_error() {
        let backend = MockBackend::scripted(vec![IntentResult::failed(503, "maintenance")]);
        let ctx = context_with(backend);

        let error = refresh_streams(&ctx).await.unwrap_err();
        assert!(matches!(error, ClientError::Backend(message) if message == "maintenance"));
        assert!(ctx.service().recent_streams().is_empty());
    }

    #[tokio::test]
    async fn create_stream_surfaces_in_recents() {
        let backend = MockBackend::scripted(vec![IntentResult::ok(raw_stream(5, 100))]);
        let ctx = context_with(backend);

        let stream = create_stream(
            &ctx,
            vec![IntentParticipant::from_account(AccountId(905))],
            Some("Trip".into()),
            None,
        )
        .await
        .unwrap();

        assert_eq!(lock(&stream).id(), StreamId(5));
        assert_eq!(ctx.service().recent_streams().len(), 1);
    }

    #[tokio::test]
    async fn get_or_create_can_stay_out_of_recents() {
        let backend = MockBackend::scripted(vec![IntentResult::ok(raw_stream(6, 100))]);
        let ctx = context_with(backend);

        let stream = get_or_create_stream(
            &ctx,
            vec![IntentParticipant::from_account(AccountId(906))],
            false,
            false,
        )
        .await
        .unwrap();

        assert_eq!(lock(&stream).id(), StreamId(6));
        assert!(ctx.service().recent_streams().is_empty());
        assert!(ctx.service().stream_by_id(StreamId(6)).is_some());
    }

    #[tokio::test]
    async fn find_service_stream_prefers_the_local_hit() {
        let backend = MockBackend::scripted(vec![]);
        let ctx = context_with(backend.clone());
        {
            let mut service = ctx.service();
            let mut payload = stream_payload(1, 500);
            payload.service_content_id = Some("svc-abc".into());
            let stream = service.update_with_stream_data(payload).unwrap();
            service.include_in_recents(&stream);
        }

        let stream = find_service_stream(&ctx, "svc-abc").await.unwrap();
        assert_eq!(lock(&stream).id(), StreamId(1));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn leave_removes_from_recents_but_not_arena() {
        let backend = MockBackend::scripted(vec![IntentResult::ok(json!({}))]);
        let ctx = context_with(backend);
        {
            let mut service = ctx.service();
            let stream = service
                .update_with_stream_data(stream_payload(3, 100))
                .unwrap();
            service.include_in_recents(&stream);
        }

        leave_stream(&ctx, StreamId(3)).await.unwrap();

        let service = ctx.service();
        assert!(service.recent_streams().is_empty());
        assert!(service.stream_by_id(StreamId(3)).is_some());
    }

    #[tokio::test]
    async fn rename_applies_locally_when_response_is_empty() {
        let backend = MockBackend::scripted(vec![IntentResult {
            successful: true,
            data: None,
            error: None,
            status_code: 204,
        }]);
        let ctx = context_with(backend);
        {
            let mut service = ctx.service();
            let stream = service
                .update_with_stream_data(stream_payload(4, 100))
                .unwrap();
            service.include_in_recents(&stream);
        }

        change_stream_title(&ctx, StreamId(4), Some("Renamed".into()))
            .await
            .unwrap();

        let stream = ctx.service().stream_by_id(StreamId(4)).unwrap();
        assert_eq!(lock(&stream).custom_title(), Some("Renamed"));
    }

    #[tokio::test]
    async fn attachment_set_is_optimistic() {
        // Backend fails, yet the local attachment write sticks.
        let backend = MockBackend::scripted(vec![IntentResult::failed(500, "nope")]);
        let ctx = context_with(backend);
        {
            let mut service = ctx.service();
            service.update_with_stream_data(stream_payload(7, 100));
        }

        let attachment = AttachmentPayload {
            kind: Some("sync_schedule".into()),
            extra: Default::default(),
        };
        let result = set_attachment(&ctx, StreamId(7), "sched", Some(attachment)).await;
        assert!(result.is_err());

        let stream = ctx.service().stream_by_id(StreamId(7)).unwrap();
        let guard = lock(&stream);
        assert!(guard.attachments().unwrap().contains_key("sched"));
    }

    #[tokio::test]
    async fn participant_status_applies_and_expires() {
        let backend = MockBackend::scripted(vec![]);
        let ctx = context_with(backend);
        {
            let mut service = ctx.service();
            let stream = service
                .update_with_stream_data(stream_payload(8, 100))
                .unwrap();
            service.include_in_recents(&stream);
        }

        apply_participant_status(
            &ctx,
            StreamId(8),
            AccountId(908),
            ActivityStatus::Recording,
            Some(50),
        );
        let stream = ctx.service().stream_by_id(StreamId(8)).unwrap();
        assert_eq!(
            lock(&stream).status(),
            cadence_shared::ActivityStatus::Recording
        );

        // Past the estimated duration, the lag pad, and the timer slack.
        tokio::time::sleep(Duration::from_millis(3400)).await;
        assert_eq!(lock(&stream).status(), cadence_shared::ActivityStatus::Idle);
    }
}
