//! The async command layer: everything the embedding application can ask
//! the engine to do against the backend.
//!
//! Commands follow one shape: lock the service, apply any optimistic local
//! mutation, drop the lock, await the backend, then re-lock to ingest the
//! response. The service lock is never held across an await.

pub mod chunks;
pub mod streams;

use serde_json::Value;

use cadence_shared::{ChunkPayload, StreamId, StreamPayload};

use crate::backend::IntentResult;
use crate::error::{ClientError, Result};
use crate::state::ClientContext;
use crate::stream::SharedStream;

/// Ingests a push-delivered stream payload. Returns the affected stream,
/// or `None` when the payload could neither match nor create one.
pub fn ingest_stream_update(ctx: &ClientContext, data: Value) -> Result<Option<SharedStream>> {
    let payload = StreamPayload::decode(data)?;
    Ok(ctx.service().update_with_stream_data(payload))
}

/// Ingests a push-delivered chunk payload for a known stream.
pub fn ingest_chunk_update(
    ctx: &ClientContext,
    stream_id: StreamId,
    data: Value,
) -> Result<Option<SharedStream>> {
    let chunk = ChunkPayload::decode(data)?;
    Ok(ctx.service().update_with_chunk_data(stream_id, chunk))
}

/// Maps a failed result to an error, passing through any response payload.
fn check(result: IntentResult) -> Result<Option<Value>> {
    if result.successful {
        return Ok(result.data);
    }
    Err(ClientError::Backend(result.error.unwrap_or_else(|| {
        format!("status {}", result.status_code)
    })))
}

/// Like [`check`], but a successful response without a payload is also an
/// error.
fn expect_data(result: IntentResult) -> Result<Value> {
    check(result)?.ok_or(ClientError::EmptyResponse)
}

/// Decodes a stream-list response: either a bare array of streams or an
/// object with a `streams` array and an optional pagination `cursor`.
/// Undecodable entries are skipped, matching the lenient per-entity policy.
fn decode_stream_list(data: Value) -> Result<(Vec<StreamPayload>, Option<String>)> {
    let (raw, cursor) = match data {
        Value::Array(list) => (list, None),
        Value::Object(mut object) => {
            let cursor = object
                .remove("cursor")
                .and_then(|value| value.as_str().map(str::to_owned));
            match object.remove("streams") {
                Some(Value::Array(list)) => (list, cursor),
                _ => return Err(ClientError::BadStreamPayload),
            }
        }
        _ => return Err(ClientError::BadStreamPayload),
    };
    let streams = raw
        .into_iter()
        .filter_map(|value| match StreamPayload::decode(value) {
            Ok(payload) => Some(payload),
            Err(error) => {
                tracing::warn!(%error, "skipping undecodable stream in list response");
                None
            }
        })
        .collect();
    Ok((streams, cursor))
}

/// Ingests an optional stream payload from a mutation response.
fn ingest_optional_stream(ctx: &ClientContext, data: Option<Value>) -> Result<()> {
    if let Some(data) = data {
        let payload = StreamPayload::decode(data)?;
        ctx.service().update_with_stream_data(payload);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, OnceLock};

    use futures::future::BoxFuture;
    use serde_json::json;

    use cadence_shared::{now_ms, AccountId, StreamPayload};

    use crate::backend::{Backend, Intent, IntentResult};
    use crate::service::StreamService;
    use crate::session::Session;
    use crate::state::ClientContext;

    /// A backend that replays scripted results and records every intent.
    pub struct MockBackend {
        responses: Mutex<VecDeque<IntentResult>>,
        pub seen: Mutex<Vec<Intent>>,
    }

    impl MockBackend {
        pub fn scripted(responses: Vec<IntentResult>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Backend for MockBackend {
        fn perform(&self, intent: Intent) -> BoxFuture<'static, IntentResult> {
            self.seen.lock().unwrap().push(intent);
            let result = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| IntentResult::failed(500, "unscripted request"));
            Box::pin(async move { result })
        }
    }

    /// A context with a logged-in session, no disk cache, and the given
    /// backend.
    pub fn context_with(backend: Arc<MockBackend>) -> ClientContext {
        let mut service = StreamService::new(None);
        service.handle_login(Session::new(AccountId(1), "Me", json!({})));
        ClientContext::new(service, backend)
    }

    /// Test timestamps sit just behind the wall clock so chunks stay inside
    /// the recency window; relative ordering between values is preserved.
    pub fn ts(offset: i64) -> i64 {
        static BASE: OnceLock<i64> = OnceLock::new();
        BASE.get_or_init(|| now_ms() - 1_000_000) + offset
    }

    /// A complete raw stream payload suitable for list responses.
    pub fn raw_stream(id: i64, last_interaction: i64) -> serde_json::Value {
        json!({
            "id": id,
            "last_interaction": ts(last_interaction),
            "others": [{"id": 900 + id, "display_name": format!("P{id}")}],
            "chunks": [{
                "id": id * 10,
                "url": format!("chunk-{id}"),
                "sender_id": 900 + id,
                "start": ts(last_interaction) - 1000,
                "end": ts(last_interaction),
                "duration": 1000
            }]
        })
    }

    pub fn stream_payload(id: i64, last_interaction: i64) -> StreamPayload {
        StreamPayload::decode(raw_stream(id, last_interaction)).unwrap()
    }
}
