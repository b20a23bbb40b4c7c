//! Upgrade shims for the two cache versions old enough to still be in the
//! field. Anything older is deleted outright by the loader.
//!
//! Each shim transforms the raw stream payloads of version N into the shape
//! of version N+1; the loader chains them until the payloads reach
//! [`crate::cache::CACHE_VERSION`].

use serde_json::{json, Value};

/// Oldest cache version that can still be upgraded in place.
pub const OLDEST_UPGRADABLE_VERSION: u32 = 10;

/// Chains the shims from `from` up to the current version. Returns `None`
/// when `from` is too old to upgrade.
pub fn upgrade(from: u32, mut streams: Vec<Value>) -> Option<Vec<Value>> {
    if from < OLDEST_UPGRADABLE_VERSION {
        return None;
    }
    if from <= 10 {
        tracing::info!("upgrading cached streams from v10");
        streams = v10_expand_bare_participant_ids(streams);
    }
    if from <= 11 {
        tracing::info!("upgrading cached streams from v11");
        streams = v11_pack_transcript_segments(streams);
    }
    Some(streams)
}

/// v10 stored `others` entries as bare account ids. v11 made every entry a
/// participant object.
fn v10_expand_bare_participant_ids(streams: Vec<Value>) -> Vec<Value> {
    streams
        .into_iter()
        .map(|mut stream| {
            if let Some(Value::Array(others)) = stream.get_mut("others") {
                for entry in others.iter_mut() {
                    if let Some(id) = entry.as_i64() {
                        *entry = json!({ "id": id });
                    }
                }
            }
            stream
        })
        .collect()
}

/// v11 stored transcripts as arrays of `{start, duration, text}` objects
/// with absolute offsets. v12 packs them as `[gap, duration, text, …]`
/// triples with gaps relative to the previous segment's end.
fn v11_pack_transcript_segments(streams: Vec<Value>) -> Vec<Value> {
    streams
        .into_iter()
        .map(|mut stream| {
            let Some(Value::Array(chunks)) = stream.get_mut("chunks") else {
                return stream;
            };
            for chunk in chunks.iter_mut() {
                let Some(Value::Array(segments)) = chunk.get("text") else {
                    continue;
                };
                if !segments.iter().all(Value::is_object) {
                    // Already packed.
                    continue;
                }
                let mut packed = Vec::with_capacity(segments.len() * 3);
                let mut cursor: i64 = 0;
                for segment in segments {
                    let start = segment.get("start").and_then(Value::as_i64).unwrap_or(0);
                    let duration = segment
                        .get("duration")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    let text = segment
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    packed.push(json!(start - cursor));
                    packed.push(json!(duration));
                    packed.push(json!(text));
                    cursor = start + duration;
                }
                chunk["text"] = Value::Array(packed);
            }
            stream
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_old_versions_are_rejected() {
        assert!(upgrade(9, vec![]).is_none());
        assert!(upgrade(10, vec![]).is_some());
    }

    #[test]
    fn v10_bare_ids_become_participant_objects() {
        let streams = vec![json!({
            "id": 1,
            "others": [7, {"id": 8, "display_name": "Ana"}],
            "chunks": []
        })];
        let upgraded = upgrade(10, streams).unwrap();
        assert_eq!(upgraded[0]["others"][0], json!({"id": 7}));
        assert_eq!(upgraded[0]["others"][1]["display_name"], json!("Ana"));
    }

    #[test]
    fn v11_segment_objects_are_packed_into_triples() {
        let streams = vec![json!({
            "id": 1,
            "others": [],
            "chunks": [{
                "id": 1, "url": "u", "sender_id": 2, "start": 0, "end": 10,
                "text": [
                    {"start": 100, "duration": 500, "text": "hello"},
                    {"start": 650, "duration": 300, "text": "there"}
                ]
            }]
        })];
        let upgraded = upgrade(11, streams).unwrap();
        assert_eq!(
            upgraded[0]["chunks"][0]["text"],
            json!([100, 500, "hello", 50, 300, "there"])
        );
    }

    #[test]
    fn already_packed_transcripts_pass_through() {
        let streams = vec![json!({
            "id": 1,
            "chunks": [{"id": 1, "text": [0, 100, "hi"]}]
        })];
        let upgraded = upgrade(11, streams).unwrap();
        assert_eq!(upgraded[0]["chunks"][0]["text"], json!([0, 100, "hi"]));
    }
}
