//! Service handler: one HTTP server exposing the remote calls of one service.
//!
//! ```text
//! ServiceHandler::new(descriptor, config)?
//!     .add(GetCommentsHandler)?
//!     .add(PostCommentHandler)?
//!     .add_cors_preflight_handler()
//!     .add_health_check_handler()
//!     .add_metrics_handler()
//!     .start().await?          ──▶ RunningService { local_addr, stop() }
//! ```

use crate::domain::config::ServiceConfig;
use crate::domain::descriptor::ServiceDescriptor;
use crate::domain::error::ServiceError;
use crate::handler::{RemoteCallDispatcher, RemoteCallHandler};
use crate::middleware::{
    create_cors_layer, CallMetrics, RequestSpanLayer, TaskMetrics, METRICS_CONTENT_TYPE,
};
use crate::session::{SessionBuilder, SessionExtractor, SessionSigner};
use crate::task::{BackoffPolicy, ProcessTaskWrapper};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{error, info};

/// Builder and owner of one service's HTTP routes
pub struct ServiceHandler {
    descriptor: ServiceDescriptor,
    config: ServiceConfig,
    signer: Arc<SessionSigner>,
    extractor: SessionExtractor,
    metrics: Arc<CallMetrics>,
    task_metrics: Arc<TaskMetrics>,
    routes: Vec<(String, MethodRouter)>,
    paths: HashSet<String>,
    cors: bool,
    health_check: bool,
    metrics_route: bool,
}

impl ServiceHandler {
    /// Create a handler for `descriptor`; fails on invalid configuration.
    pub fn new(descriptor: ServiceDescriptor, config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let signer = Arc::new(SessionSigner::new(config.session.secret.as_bytes()));
        let extractor = SessionExtractor::with_system_clock(Arc::clone(&signer))
            .with_longevity(config.session.longevity_secs);

        let metrics = CallMetrics::new()?;
        let task_metrics = TaskMetrics::register(metrics.registry())?;

        Ok(Self {
            descriptor,
            config,
            signer,
            extractor,
            metrics: Arc::new(metrics),
            task_metrics: Arc::new(task_metrics),
            routes: Vec::new(),
            paths: HashSet::new(),
            cors: false,
            health_check: false,
            metrics_route: false,
        })
    }

    /// Register a remote call handler at its full path.
    pub fn add<H: RemoteCallHandler>(mut self, handler: H) -> Result<Self, ServiceError> {
        let call = handler.descriptor();
        if call.service != self.descriptor {
            return Err(ServiceError::ServiceMismatch {
                call: call.name.clone(),
                expected: call.service.name.clone(),
                actual: self.descriptor.name.clone(),
            });
        }

        let path = call.full_path();
        if !self.paths.insert(path.clone()) {
            return Err(ServiceError::DuplicatePath(path));
        }
        info!(service = %self.descriptor.name, call = %call.name, path = %path, "Registering remote call");

        let dispatcher = Arc::new(RemoteCallDispatcher::new(
            handler,
            path.clone(),
            self.extractor.clone(),
            &self.config,
            Arc::clone(&self.metrics),
        ));
        let route = post(move |request: Request<Body>| async move {
            dispatcher.dispatch(request).await
        });

        self.routes.push((path, route));
        Ok(self)
    }

    /// Answer `OPTIONS` preflights for every path. Call responses carry the
    /// allow headers with or without it.
    pub fn add_cors_preflight_handler(mut self) -> Self {
        self.cors = true;
        self
    }

    /// `GET /healthz` → `OK`
    pub fn add_health_check_handler(mut self) -> Self {
        self.health_check = true;
        self
    }

    /// `GET /metricsz` → Prometheus text exposition
    pub fn add_metrics_handler(mut self) -> Self {
        self.metrics_route = true;
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn metrics(&self) -> Arc<CallMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Task wrapper using `task` backoff settings, counted on this
    /// service's `/metricsz`.
    pub fn task_wrapper(&self) -> ProcessTaskWrapper {
        ProcessTaskWrapper::new(
            BackoffPolicy::from_config(&self.config.task),
            Arc::clone(&self.task_metrics),
        )
    }

    /// Builder for tokens this service accepts
    pub fn session_builder(&self) -> SessionBuilder {
        SessionBuilder::with_system_clock(Arc::clone(&self.signer))
    }

    /// Build the router with every registered route and the middleware stack.
    pub fn router(&self) -> Router {
        let mut router = Router::new();

        for (path, route) in &self.routes {
            router = router.route(path, route.clone());
        }

        if self.health_check {
            router = router.route("/healthz", get(health_check));
        }

        if self.metrics_route {
            let metrics = Arc::clone(&self.metrics);
            router = router.route(
                "/metricsz",
                get(move || async move { render_metrics(&metrics) }),
            );
        }

        let middleware = ServiceBuilder::new()
            .option_layer(self.cors.then(|| create_cors_layer(&self.config.cors)))
            .layer(RequestSpanLayer::new());

        router.layer(middleware)
    }

    /// Bind `http.host:http.port` and serve until stopped.
    pub async fn start(self) -> Result<RunningService, ServiceError> {
        let router = self.router();
        let addr = self.config.http_addr();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ServiceError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServiceError::Bind)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let name = self.descriptor.name.clone();
        info!(service = %name, addr = %local_addr, routes = self.routes.len(), "Starting HTTP server");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(RunningService {
            name,
            local_addr,
            metrics: self.metrics,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// A started service
pub struct RunningService {
    name: String,
    local_addr: SocketAddr,
    metrics: Arc<CallMetrics>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningService {
    /// Bound address (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> Arc<CallMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Trigger graceful shutdown and wait for in-flight requests.
    pub async fn stop(mut self) -> Result<(), ServiceError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match (&mut self.handle).await {
            Ok(result) => result.map_err(ServiceError::Serve),
            Err(e) => Err(ServiceError::Serve(std::io::Error::other(e.to_string()))),
        };

        match &result {
            Ok(()) => info!(service = %self.name, "HTTP server stopped"),
            Err(e) => error!(service = %self.name, error = %e, "HTTP server error"),
        }
        result
    }
}

async fn health_check() -> &'static str {
    "OK"
}

fn render_metrics(metrics: &CallMetrics) -> Response {
    match metrics.encode() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
