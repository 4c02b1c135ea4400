//! # Service End-to-End Tests
//!
//! Starts a real server on an ephemeral port and drives it over HTTP:
//! login → authenticated call, metadata, streaming and raw byte bodies, CORS,
//! health and metrics routes.

use async_trait::async_trait;
use bytes::Bytes;
use rpc_bridge::{
    ApiError, ApiResult, BodyKind, HandlerRequest, RemoteCallDescriptor, RemoteCallHandler,
    ResponseBody, ResponseKind, RunningService, ServiceConfig, ServiceDescriptor, ServiceHandler,
    SessionBuilder,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetCommentsRequestBody {
    video_id: String,
}

#[derive(Deserialize)]
struct ClientMetadata {
    platform: String,
}

#[derive(Serialize)]
struct GetCommentsResponse {
    comments: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequestBody {
    user_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSession {
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    signed_session: String,
}

#[derive(Deserialize)]
struct PostCommentRequestBody {
    text: String,
}

#[derive(Deserialize)]
struct HeartBeat {
    rnd: u32,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct GetCommentsHandler(RemoteCallDescriptor);

#[async_trait]
impl RemoteCallHandler for GetCommentsHandler {
    type Body = GetCommentsRequestBody;
    type Metadata = ClientMetadata;
    type Session = ();
    type Response = GetCommentsResponse;

    fn descriptor(&self) -> &RemoteCallDescriptor {
        &self.0
    }

    async fn handle(
        &self,
        request: HandlerRequest<Self::Body, Self::Metadata, ()>,
    ) -> ApiResult<ResponseBody<Self::Response>> {
        let body = request.body.into_message()?;
        let platform = request
            .metadata
            .map(|m| m.platform)
            .ok_or_else(|| ApiError::internal("metadata missing"))?;
        Ok(ResponseBody::Message(GetCommentsResponse {
            comments: vec![format!("{}@{}", body.video_id, platform)],
        }))
    }
}

struct LoginHandler {
    descriptor: RemoteCallDescriptor,
    sessions: SessionBuilder,
}

#[async_trait]
impl RemoteCallHandler for LoginHandler {
    type Body = LoginRequestBody;
    type Metadata = ();
    type Session = ();
    type Response = LoginResponse;

    fn descriptor(&self) -> &RemoteCallDescriptor {
        &self.descriptor
    }

    async fn handle(
        &self,
        request: HandlerRequest<Self::Body, (), ()>,
    ) -> ApiResult<ResponseBody<Self::Response>> {
        let body = request.body.into_message()?;
        let signed_session = self.sessions.build_message(&UserSession {
            user_id: body.user_id,
        })?;
        Ok(ResponseBody::Message(LoginResponse { signed_session }))
    }
}

struct PostCommentHandler(RemoteCallDescriptor);

#[async_trait]
impl RemoteCallHandler for PostCommentHandler {
    type Body = PostCommentRequestBody;
    type Metadata = ();
    type Session = UserSession;
    type Response = Value;

    fn descriptor(&self) -> &RemoteCallDescriptor {
        &self.0
    }

    async fn handle(
        &self,
        request: HandlerRequest<Self::Body, (), Self::Session>,
    ) -> ApiResult<ResponseBody<Self::Response>> {
        let body = request.body.into_message()?;
        let session = request
            .session
            .ok_or_else(|| ApiError::internal("session missing"))?;
        Ok(ResponseBody::Message(json!({
            "by": session.user_id,
            "text": body.text,
        })))
    }
}

struct UploadHeartBeatsHandler(RemoteCallDescriptor);

#[async_trait]
impl RemoteCallHandler for UploadHeartBeatsHandler {
    type Body = HeartBeat;
    type Metadata = ();
    type Session = ();
    type Response = Value;

    fn descriptor(&self) -> &RemoteCallDescriptor {
        &self.0
    }

    async fn handle(
        &self,
        request: HandlerRequest<Self::Body, (), ()>,
    ) -> ApiResult<ResponseBody<Self::Response>> {
        let beats = request.body.into_stream()?.start().collect_messages().await?;
        let sum: u32 = beats.iter().map(|b| b.rnd).sum();
        Ok(ResponseBody::Message(json!({ "count": beats.len(), "sum": sum })))
    }
}

struct EchoBytesHandler(RemoteCallDescriptor);

#[async_trait]
impl RemoteCallHandler for EchoBytesHandler {
    type Body = ();
    type Metadata = ();
    type Session = ();
    type Response = ();

    fn descriptor(&self) -> &RemoteCallDescriptor {
        &self.0
    }

    async fn handle(
        &self,
        request: HandlerRequest<(), (), ()>,
    ) -> ApiResult<ResponseBody<()>> {
        let body = request.body.into_bytes()?;
        let bytes = axum::body::to_bytes(body, 1 << 16)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let mut reversed = bytes.to_vec();
        reversed.reverse();
        Ok(ResponseBody::Bytes(Bytes::from(reversed)))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn start_node_service() -> RunningService {
    let service = ServiceDescriptor::new("NodeService", "");

    let mut config = ServiceConfig::default();
    config.session.secret = "some secrets".to_string();
    config.http.host = "127.0.0.1".parse().unwrap();
    config.http.port = 0;

    let handler = ServiceHandler::new(service.clone(), config).unwrap();
    let sessions = handler.session_builder();

    handler
        .add(GetCommentsHandler(
            RemoteCallDescriptor::new(&service, "GetComments", "/GetComments").with_metadata("md"),
        ))
        .unwrap()
        .add(LoginHandler {
            descriptor: RemoteCallDescriptor::new(&service, "Login", "/Login"),
            sessions,
        })
        .unwrap()
        .add(PostCommentHandler(
            RemoteCallDescriptor::new(&service, "PostComment", "/PostComment").with_auth("u"),
        ))
        .unwrap()
        .add(UploadHeartBeatsHandler(
            RemoteCallDescriptor::new(&service, "UploadHeartBeats", "/UploadHeartBeats")
                .with_body(BodyKind::Stream),
        ))
        .unwrap()
        .add(EchoBytesHandler(
            RemoteCallDescriptor::new(&service, "EchoBytes", "/EchoBytes")
                .with_body(BodyKind::Bytes)
                .with_response(ResponseKind::Bytes),
        ))
        .unwrap()
        .add_cors_preflight_handler()
        .add_health_check_handler()
        .add_metrics_handler()
        .start()
        .await
        .unwrap()
}

fn url(running: &RunningService, path: &str) -> String {
    format!("http://{}{}", running.local_addr(), path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_message_call_with_metadata() {
    let running = start_node_service().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(&running, "/GetComments"))
        .query(&[("md", r#"{"platform":"web"}"#)])
        .json(&json!({ "videoId": "v1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/json"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["comments"][0], "v1@web");

    let missing_metadata = client
        .post(url(&running, "/GetComments"))
        .json(&json!({ "videoId": "v1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_metadata.status(), 400);

    let bad_body = client
        .post(url(&running, "/GetComments"))
        .query(&[("md", r#"{"platform":"web"}"#)])
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_body.status(), 400);
    assert!(bad_body.text().await.unwrap().is_empty());

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_login_then_authenticated_call() {
    let running = start_node_service().await;
    let client = reqwest::Client::new();

    let login: Value = client
        .post(url(&running, "/Login"))
        .json(&json!({ "userId": "u1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["signedSession"].as_str().unwrap().to_string();
    assert!(token.starts_with(r#"{"userId":"u1"}|"#));

    let posted: Value = client
        .post(url(&running, "/PostComment"))
        .header("u", &token)
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(posted, json!({ "by": "u1", "text": "hello" }));

    let anonymous = client
        .post(url(&running, "/PostComment"))
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let forged = client
        .post(url(&running, "/PostComment"))
        .header("u", format!("{}A", token))
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_streaming_body() {
    let running = start_node_service().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(url(&running, "/UploadHeartBeats"))
        .body(r#"{"rnd":1};{"rnd":2};{"rnd":3}"#)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "count": 3, "sum": 6 }));

    let broken = client
        .post(url(&running, "/UploadHeartBeats"))
        .body(r#"{"rnd":1};{"rnd":"#)
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), 400);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_bytes_body_and_response() {
    let running = start_node_service().await;

    let response = reqwest::Client::new()
        .post(url(&running, "/EchoBytes"))
        .body(vec![1u8, 2, 3, 255])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/octet-stream"
    );
    assert_eq!(response.bytes().await.unwrap().to_vec(), vec![255u8, 3, 2, 1]);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_cors_health_and_metrics() {
    let running = start_node_service().await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, url(&running, "/PostComment"))
        .header("origin", "https://example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,u")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");

    let health = client.get(url(&running, "/healthz")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");

    let anonymous = client
        .post(url(&running, "/PostComment"))
        .header("origin", "https://example.com")
        .json(&json!({ "text": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
    assert_eq!(anonymous.headers()["access-control-allow-origin"], "*");

    let metrics = client.get(url(&running, "/metricsz")).send().await.unwrap();
    assert_eq!(metrics.headers()["content-type"], "text/plain");
    let text = metrics.text().await.unwrap();
    assert!(text.contains(r#"remote_calls_total{path="/PostComment"} 1"#));
    assert!(text.contains(r#"remote_calls_failure{errorCode="401",path="/PostComment"} 1"#));
    assert_eq!(running.metrics().failures_for("/PostComment", 401), 1);

    running.stop().await.unwrap();
}
