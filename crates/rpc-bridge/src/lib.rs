// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! rpc-bridge - RPC-over-HTTP dispatch with signed sessions and streaming bodies.
//!
//! A service is a set of remote calls, each described by a
//! [`RemoteCallDescriptor`] and implemented by a [`RemoteCallHandler`].
//! Requests are HTTP POSTs whose body, metadata and session are decoded into
//! typed messages before the handler runs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         ServiceHandler                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────┐                   │
//! │  │              Middleware Stack                │                   │
//! │  │         [Cors] → RequestSpan → Router        │                   │
//! │  └────────────────────┬─────────────────────────┘                   │
//! │                       │ POST <prefix><path>                         │
//! │  ┌────────────────────┴─────────────────────────┐                   │
//! │  │           RemoteCallDispatcher               │                   │
//! │  │  body ─ Message | Stream | Bytes             │◀── CallMetrics    │
//! │  │  metadata ─ ?<key>=<json>                    │                   │
//! │  │  session ─ <key>: <signed session>           │◀── SessionExtractor
//! │  └────────────────────┬─────────────────────────┘                   │
//! │                       │                                             │
//! │  ┌────────────────────┴─────────────────────────┐                   │
//! │  │            RemoteCallHandler                 │                   │
//! │  └──────────────────────────────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Signed sessions
//!
//! `<payload>|<base36 seconds>|<base64 HMAC-SHA256>`, valid for 30 days by
//! default. See [`session`].
//!
//! # Streaming bodies
//!
//! Messages separated by `;`, decoded incrementally by
//! [`StreamMessageReader`]. See [`stream`].
//!
//! # Background tasks
//!
//! [`ProcessTaskWrapper`] claims a task inside the request and processes it
//! on a spawned task, with capped exponential backoff for retries.
//!
//! # Usage
//!
//! ```ignore
//! use rpc_bridge::{ServiceConfig, ServiceDescriptor, ServiceHandler};
//!
//! let service = ServiceDescriptor::new("NodeService", "");
//! let running = ServiceHandler::new(service.clone(), ServiceConfig::from_env())?
//!     .add(GetCommentsHandler::new(&service))?
//!     .add_cors_preflight_handler()
//!     .add_health_check_handler()
//!     .start()
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod codec;
pub mod domain;
pub mod handler;
pub mod middleware;
pub mod service;
pub mod session;
pub mod stream;
pub mod task;

// Re-exports for public API
pub use codec::{CodecError, STREAM_JSON_SEPARATOR};
pub use domain::config::ServiceConfig;
pub use domain::descriptor::{BodyKind, RemoteCallDescriptor, ResponseKind, ServiceDescriptor};
pub use domain::error::{ApiError, ApiResult, ErrorKind, ServiceError};
pub use handler::{HandlerRequest, RemoteCallHandler, RequestBody, ResponseBody};
pub use middleware::{init_tracing, CallMetrics, TaskMetrics};
pub use service::{RunningService, ServiceHandler};
pub use session::{
    SessionBuilder, SessionError, SessionExtractor, SessionSigner, SystemTimeSource, TimeSource,
};
pub use stream::{MessageStream, StreamEvent, StreamMessageReader, StreamReadError};
pub use task::{BackoffPolicy, ProcessTaskWrapper, TaskDone};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_separator() {
        assert_eq!(STREAM_JSON_SEPARATOR, ";");
    }
}
