//! Message codec used for bodies, metadata, session payloads and stream frames.
//!
//! Messages are any `serde` types; the wire form is JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Separator placed after every message of a streaming body
pub const STREAM_JSON_SEPARATOR: &str = ";";

/// Content type of serialized message bodies
pub const MESSAGE_CONTENT_TYPE: &str = "application/json";

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize message: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Serialize a message into body bytes.
pub fn serialize_message<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::Serialize)
}

/// Deserialize a message from body bytes.
pub fn deserialize_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Deserialize)
}

/// Stringify a message for use in a header, query parameter or session payload.
pub fn stringify_message<T: Serialize>(message: &T) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Serialize)
}

/// Inverse of [`stringify_message`].
pub fn destringify_message<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Deserialize)
}

/// Convert an already-parsed JSON value into a typed message.
pub fn parse_message<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(CodecError::Deserialize)
}

/// Parse JSON text, then convert it into a typed message.
pub fn parse_json_text<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(CodecError::Deserialize)?;
    parse_message(value)
}
