//! HTTP middleware shared by every service.
//!
//! Layer order: Request → Cors → RequestSpan → Router → Handler
//!
//! CORS sits outermost so preflight requests are answered without reaching
//! the router. It is only installed when preflight handling is enabled; the
//! dispatcher sets the allow headers on call responses itself.

pub mod cors;
pub mod metrics;
pub mod tracing;

pub use cors::{create_cors_layer, CallCorsHeaders};
pub use metrics::{CallMetrics, CallTimer, TaskMetrics, METRICS_CONTENT_TYPE};
pub use tracing::{init_tracing, RequestSpanLayer, TracingInitError};
