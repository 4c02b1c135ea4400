//! Request spans and subscriber setup.

use axum::{body::Body, http::Request, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Subscriber installation failure
#[derive(Debug, thiserror::Error)]
#[error("failed to initialize tracing: {0}")]
pub struct TracingInitError(String);

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info,rpc_bridge=debug"`).
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), TracingInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| TracingInitError(e.to_string()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TracingInitError(e.to_string()))
}

/// Layer that opens an `http_request` span around each request
#[derive(Clone, Default)]
pub struct RequestSpanLayer;

impl RequestSpanLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestSpanLayer {
    type Service = RequestSpanService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestSpanService { inner }
    }
}

/// Service produced by [`RequestSpanLayer`]
#[derive(Clone)]
pub struct RequestSpanService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestSpanService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let span = info_span!(
            "http_request",
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status = tracing::field::Empty,
        );
        let recorder = span.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                if let Ok(response) = &result {
                    recorder.record("http.status", response.status().as_u16());
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_layer_passes_response_through() {
        let app = Router::new()
            .route("/healthz", get(|| async { "OK" }))
            .layer(RequestSpanLayer::new());

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        // RUST_LOG would take precedence; only assert when it is unset
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_tracing("rpc_bridge=loud").is_err());
        }
    }
}
