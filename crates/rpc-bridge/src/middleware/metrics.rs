//! Prometheus counters for remote calls and background tasks.
//!
//! Both sets live in one [`Registry`] per service and are served as the
//! Prometheus text exposition on `/metricsz`.
//!
//! | Metric                      | Labels              |
//! |-----------------------------|---------------------|
//! | `remote_calls_total`        | `path`              |
//! | `remote_calls_failure`      | `path`, `errorCode` |
//! | `remote_calls_duration_seconds` | -               |
//! | `processing_tasks_total`    | `path`              |
//! | `processing_tasks_failure`  | `path`, `errorCode` |

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Content type of the `/metricsz` response
pub const METRICS_CONTENT_TYPE: &str = "text/plain";

fn register_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Per-service call metrics
pub struct CallMetrics {
    registry: Registry,
    calls: IntCounterVec,
    failures: IntCounterVec,
    latency: Histogram,
}

impl CallMetrics {
    /// Call metrics in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register the call metrics in `registry`.
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let calls = register_counter_vec(
            &registry,
            "remote_calls_total",
            "The total number of calls received.",
            &["path"],
        )?;
        let failures = register_counter_vec(
            &registry,
            "remote_calls_failure",
            "The number of failed calls.",
            &["path", "errorCode"],
        )?;

        let latency = Histogram::with_opts(HistogramOpts::new(
            "remote_calls_duration_seconds",
            "Time spent handling remote calls.",
        ))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            calls,
            failures,
            latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count an incoming call to `path`
    pub fn record_call(&self, path: &str) {
        self.calls.with_label_values(&[path]).inc();
    }

    /// Record how a call finished; `status` is `None` on success.
    pub fn record_outcome(&self, path: &str, status: Option<u16>, elapsed: Duration) {
        if let Some(status) = status {
            self.failures
                .with_label_values(&[path, status.to_string().as_str()])
                .inc();
        }
        self.latency.observe(elapsed.as_secs_f64());
    }

    /// Calls seen for `path`
    pub fn calls_for(&self, path: &str) -> u64 {
        self.calls.with_label_values(&[path]).get()
    }

    /// Failures for `path` answered with `status`
    pub fn failures_for(&self, path: &str, status: u16) -> u64 {
        self.failures
            .with_label_values(&[path, status.to_string().as_str()])
            .get()
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let count = self.latency.get_sample_count();
        if count == 0 {
            0.0
        } else {
            self.latency.get_sample_sum() * 1000.0 / count as f64
        }
    }

    /// Encode every metric in the registry in the Prometheus text format.
    pub fn encode(&self) -> prometheus::Result<String> {
        encode_registry(&self.registry)
    }
}

/// Text exposition of everything registered in `registry`
pub fn encode_registry(registry: &Registry) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Background task counters
pub struct TaskMetrics {
    tasks: IntCounterVec,
    failures: IntCounterVec,
}

impl TaskMetrics {
    /// Register the task metrics in `registry`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            tasks: register_counter_vec(
                registry,
                "processing_tasks_total",
                "The total number of tasks being processed.",
                &["path"],
            )?,
            failures: register_counter_vec(
                registry,
                "processing_tasks_failure",
                "The number of task failed processing.",
                &["path", "errorCode"],
            )?,
        })
    }

    pub fn record_task(&self, path: &str) {
        self.tasks.with_label_values(&[path]).inc();
    }

    pub fn record_failure(&self, path: &str, status: u16) {
        self.failures
            .with_label_values(&[path, status.to_string().as_str()])
            .inc();
    }

    pub fn tasks_for(&self, path: &str) -> u64 {
        self.tasks.with_label_values(&[path]).get()
    }

    pub fn failures_for(&self, path: &str, status: u16) -> u64 {
        self.failures
            .with_label_values(&[path, status.to_string().as_str()])
            .get()
    }
}

/// Request timing helper
pub struct CallTimer {
    start: Instant,
    metrics: Arc<CallMetrics>,
    path: String,
}

impl CallTimer {
    /// Count the call and start timing it.
    pub fn start(metrics: Arc<CallMetrics>, path: impl Into<String>) -> Self {
        let path = path.into();
        metrics.record_call(&path);
        Self {
            start: Instant::now(),
            metrics,
            path,
        }
    }

    /// `failure_status` is `None` for a successful call.
    pub fn finish(self, failure_status: Option<u16>) {
        self.metrics
            .record_outcome(&self.path, failure_status, self.start.elapsed());
    }
}
