use thiserror::Error;

use cadence_shared::{DecodeError, StreamId};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no active session")]
    NoSession,

    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("backend response carried no payload")]
    EmptyResponse,

    #[error("backend returned an unusable stream payload")]
    BadStreamPayload,

    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}
