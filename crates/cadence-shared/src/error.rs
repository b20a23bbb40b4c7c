use thiserror::Error;

/// Failure to turn a raw backend payload into a typed entity.
///
/// Decode failures are scoped to one entity: the merge pipeline logs them
/// and skips the entity rather than aborting the whole update.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type: {detail}")]
    WrongType { field: &'static str, detail: String },

    #[error("chunk end {end} precedes start {start}")]
    InvertedRange { start: i64, end: i64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
