//! Streaming request bodies: a chunked byte stream carrying a sequence of
//! messages, each terminated by [`STREAM_JSON_SEPARATOR`](crate::codec::STREAM_JSON_SEPARATOR).

pub mod framing;
pub mod reader;

pub use framing::{FrameDecoder, Utf8ChunkDecoder};
pub use reader::{MessageStream, StreamEvent, StreamMessageReader};

use crate::codec::CodecError;
use crate::domain::error::ApiError;
use axum::http::StatusCode;
use std::time::Duration;

/// Boxed error produced by a body source
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stream reading failures
#[derive(Debug, thiserror::Error)]
pub enum StreamReadError {
    /// A completed frame is not a valid message
    #[error("unable to decode stream frame ({frame_len} bytes): {source}")]
    Decode {
        frame_len: usize,
        #[source]
        source: CodecError,
    },

    /// The underlying body failed
    #[error("stream source error: {0}")]
    Source(#[source] BoxError),

    /// No chunk arrived within the idle timeout
    #[error("no chunk received within {0:?}")]
    Timeout(Duration),

    /// The reader task stopped before end of stream
    #[error("stream reader stopped before end of stream")]
    Aborted,
}

impl From<StreamReadError> for ApiError {
    fn from(e: StreamReadError) -> Self {
        match e {
            StreamReadError::Timeout(_) => ApiError::new(StatusCode::REQUEST_TIMEOUT, e.to_string()),
            StreamReadError::Aborted => ApiError::internal(e.to_string()),
            _ => ApiError::bad_request(e.to_string()),
        }
    }
}
