//! Per-request glue between HTTP and a [`RemoteCallHandler`].
//!
//! ```text
//! POST <full path>
//!   │
//!   ├─ body      Message → buffer (≤ max_body_size) + deserialize
//!   │            Stream  → StreamMessageReader (not started)
//!   │            Bytes   → raw body
//!   ├─ metadata  ?<key>=<stringified message>
//!   ├─ session   <key>: <signed session>
//!   ├─ handler
//!   └─ response  Message → application/json, Bytes → application/octet-stream
//!                (must match the descriptor's response kind)
//! ```
//!
//! Every failure is logged with the request id and answered with a bare
//! status code. Successful and failed responses both carry the CORS allow
//! headers.

use super::{HandlerRequest, RemoteCallHandler, RequestBody, ResponseBody};
use crate::codec::{deserialize_message, destringify_message, serialize_message, MESSAGE_CONTENT_TYPE};
use crate::domain::config::ServiceConfig;
use crate::domain::descriptor::{BodyKind, ResponseKind};
use crate::domain::error::{ApiError, ApiResult};
use crate::middleware::cors::CallCorsHeaders;
use crate::middleware::metrics::{CallMetrics, CallTimer};
use crate::session::{now_millis, SessionExtractor};
use crate::stream::StreamMessageReader;
use axum::body::Body;
use axum::extract::Query;
use axum::http::{header, HeaderMap, Request, Uri};
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};

/// Content type of raw byte responses
const BYTES_CONTENT_TYPE: &str = "application/octet-stream";

/// Runs one handler for every request routed to it.
pub struct RemoteCallDispatcher<H> {
    handler: H,
    path: String,
    extractor: SessionExtractor,
    max_body_size: usize,
    idle_timeout: Option<Duration>,
    cors: CallCorsHeaders,
    metrics: Arc<CallMetrics>,
}

impl<H: RemoteCallHandler> RemoteCallDispatcher<H> {
    pub fn new(
        handler: H,
        path: impl Into<String>,
        extractor: SessionExtractor,
        config: &ServiceConfig,
        metrics: Arc<CallMetrics>,
    ) -> Self {
        Self {
            handler,
            path: path.into(),
            extractor,
            max_body_size: config.limits.max_body_size,
            idle_timeout: config.stream.idle_timeout,
            cors: CallCorsHeaders::new(&config.cors),
            metrics,
        }
    }

    /// Route path this dispatcher serves
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Handle one HTTP request end to end.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let request_id = next_request_id();
        let span = info_span!(
            "remote_call",
            request_id = %request_id,
            call = %self.handler.descriptor().name,
        );

        async move {
            let timer = CallTimer::start(Arc::clone(&self.metrics), self.path.as_str());
            info!(uri = %request.uri(), "Handling remote call");
            let origin = request.headers().get(header::ORIGIN).cloned();

            let mut response = match self.process(request_id, request).await {
                Ok(response) => {
                    timer.finish(None);
                    response
                }
                Err(e) => {
                    error!(status = e.status.as_u16(), error = %e.message, "Remote call failed");
                    timer.finish(Some(e.status.as_u16()));
                    e.into_response()
                }
            };

            self.cors.apply(origin.as_ref(), response.headers_mut());
            response
        }
        .instrument(span)
        .await
    }

    async fn process(&self, request_id: String, request: Request<Body>) -> ApiResult<Response> {
        let descriptor = self.handler.descriptor();
        let (parts, body) = request.into_parts();

        let body = self.read_body(descriptor.body, body).await?;

        let metadata = match &descriptor.metadata {
            Some(metadata) => Some(read_metadata(&parts.uri, &metadata.key)?),
            None => None,
        };

        let session = match &descriptor.auth {
            Some(auth) => Some(self.read_session(&parts.headers, &auth.key)?),
            None => None,
        };

        let response = self
            .handler
            .handle(HandlerRequest {
                request_id,
                body,
                metadata,
                session,
            })
            .await?;

        encode_response(descriptor.response, response)
    }

    async fn read_body(&self, kind: BodyKind, body: Body) -> ApiResult<RequestBody<H::Body>> {
        match kind {
            BodyKind::Message => {
                let bytes = buffer_body(body, self.max_body_size).await?;
                let message = deserialize_message(&bytes)
                    .map_err(|e| ApiError::bad_request(format!("Unable to deserialize body: {e}")))?;
                Ok(RequestBody::Message(message))
            }
            BodyKind::Stream => Ok(RequestBody::Stream(
                StreamMessageReader::from_body(body).with_idle_timeout(self.idle_timeout),
            )),
            BodyKind::Bytes => Ok(RequestBody::Bytes(body)),
        }
    }

    fn read_session(&self, headers: &HeaderMap, key: &str) -> ApiResult<H::Session> {
        let signed = headers.get(key).and_then(|v| v.to_str().ok());
        let session = self.extractor.extract_message(signed)?;
        debug!("Session verified");
        Ok(session)
    }
}

/// `<epoch secs>-<random 0..10000>`
fn next_request_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}", now_millis() / 1000, suffix)
}

/// Collect the body, failing with 413 once it exceeds `limit` bytes.
async fn buffer_body(body: Body, limit: usize) -> ApiResult<BytesMut> {
    let mut buffered = BytesMut::new();
    let mut chunks = body.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ApiError::bad_request(format!("Unable to read body: {e}")))?;
        if buffered.len() + chunk.len() > limit {
            return Err(ApiError::payload_too_large(limit));
        }
        buffered.extend_from_slice(&chunk);
    }

    Ok(buffered)
}

fn read_metadata<M: serde::de::DeserializeOwned>(uri: &Uri, key: &str) -> ApiResult<M> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri)
        .map_err(|e| ApiError::bad_request(format!("Unable to parse query: {e}")))?;

    let raw = params
        .get(key)
        .ok_or_else(|| ApiError::bad_request(format!("Metadata {key} is missing")))?;

    destringify_message(raw)
        .map_err(|e| ApiError::bad_request(format!("Unable to deserialize metadata: {e}")))
}

/// Encode `response` as the descriptor's `kind`; a handler returning the
/// other kind is an internal error.
fn encode_response<T: serde::Serialize>(
    kind: ResponseKind,
    response: ResponseBody<T>,
) -> ApiResult<Response> {
    match (kind, response) {
        (ResponseKind::Message, ResponseBody::Message(message)) => {
            let bytes = serialize_message(&message)?;
            Ok(([(header::CONTENT_TYPE, MESSAGE_CONTENT_TYPE)], bytes).into_response())
        }
        (ResponseKind::Bytes, ResponseBody::Bytes(bytes)) => {
            Ok(([(header::CONTENT_TYPE, BYTES_CONTENT_TYPE)], bytes).into_response())
        }
        (kind, _) => Err(ApiError::internal(format!(
            "Handler response does not match declared response kind {kind:?}"
        ))),
    }
}
