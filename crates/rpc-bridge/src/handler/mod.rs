//! Remote call handlers and the request/response shapes they see.
//!
//! A handler declares its message types through associated types; the
//! [`RemoteCallDispatcher`] decodes the HTTP request into a
//! [`HandlerRequest`] accordingly, runs the handler and encodes the result.

pub mod dispatch;

pub use dispatch::RemoteCallDispatcher;

use crate::domain::descriptor::RemoteCallDescriptor;
use crate::domain::error::{ApiError, ApiResult};
use crate::stream::StreamMessageReader;
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Server-side implementation of one remote call.
///
/// Calls without metadata or auth can use `()` for the unused types; they are
/// never decoded.
#[async_trait]
pub trait RemoteCallHandler: Send + Sync + 'static {
    /// Request message (or stream element) type
    type Body: DeserializeOwned + Send + 'static;
    /// Metadata message carried in the query string
    type Metadata: DeserializeOwned + Send + 'static;
    /// Payload of the signed session
    type Session: DeserializeOwned + Send + 'static;
    /// Response message type
    type Response: Serialize + Send + 'static;

    fn descriptor(&self) -> &RemoteCallDescriptor;

    async fn handle(
        &self,
        request: HandlerRequest<Self::Body, Self::Metadata, Self::Session>,
    ) -> ApiResult<ResponseBody<Self::Response>>;
}

/// Decoded request handed to a handler
pub struct HandlerRequest<B, M, S> {
    /// `<epoch secs>-<random>` identifier, also present on the request span
    pub request_id: String,
    pub body: RequestBody<B>,
    /// Present iff the descriptor declares metadata
    pub metadata: Option<M>,
    /// Present iff the descriptor declares auth
    pub session: Option<S>,
}

/// Request body in the form the descriptor asked for
pub enum RequestBody<T> {
    Message(T),
    /// Not started; the handler decides when to read
    Stream(StreamMessageReader<T>),
    Bytes(Body),
}

impl<T> RequestBody<T> {
    pub fn into_message(self) -> ApiResult<T> {
        match self {
            RequestBody::Message(message) => Ok(message),
            _ => Err(ApiError::internal("request body is not a message")),
        }
    }

    pub fn into_stream(self) -> ApiResult<StreamMessageReader<T>> {
        match self {
            RequestBody::Stream(reader) => Ok(reader),
            _ => Err(ApiError::internal("request body is not a stream")),
        }
    }

    pub fn into_bytes(self) -> ApiResult<Body> {
        match self {
            RequestBody::Bytes(body) => Ok(body),
            _ => Err(ApiError::internal("request body is not raw bytes")),
        }
    }
}

/// Response produced by a handler; the variant must match the descriptor's
/// `ResponseKind`.
#[derive(Debug)]
pub enum ResponseBody<T> {
    /// Serialized as `application/json`
    Message(T),
    /// Sent as `application/octet-stream`
    Bytes(Bytes),
}
