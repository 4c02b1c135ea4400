//! CORS support.
//!
//! Every remote call response carries the allow headers through
//! [`CallCorsHeaders`]. The tower-http layer from [`create_cors_layer`] is
//! added only when preflight handling is enabled, and answers `OPTIONS`
//! requests before routing.

use crate::domain::config::CorsConfig;
use axum::http::{header, HeaderMap, HeaderValue};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer as TowerCorsLayer};

/// Parsed `allow_origin`: `None` for any origin
fn parse_origins(config: &CorsConfig) -> Option<Vec<HeaderValue>> {
    if config.allow_origin.trim() == "*" {
        return None;
    }

    Some(
        config
            .allow_origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| o.parse().ok())
            .collect(),
    )
}

/// Create CORS layer from service config
pub fn create_cors_layer(config: &CorsConfig) -> TowerCorsLayer {
    let mut cors = TowerCorsLayer::new().allow_methods(Any).allow_headers(Any);

    // Configure origins
    cors = match parse_origins(config) {
        None => cors.allow_origin(Any),
        Some(origins) => cors.allow_origin(origins),
    };

    if let Some(max_age) = config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    cors
}

/// Allow headers set on every remote call response.
#[derive(Debug, Clone)]
pub struct CallCorsHeaders {
    origins: Option<Vec<HeaderValue>>,
}

impl CallCorsHeaders {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            origins: parse_origins(config),
        }
    }

    /// Set `Access-Control-Allow-{Origin,Methods,Headers}` on `response`.
    ///
    /// A single configured origin is sent as is. With several, the request's
    /// `Origin` is echoed when it is one of them.
    pub fn apply(&self, request_origin: Option<&HeaderValue>, response: &mut HeaderMap) {
        let origin = match self.origins.as_deref() {
            None => Some(HeaderValue::from_static("*")),
            Some([only]) => Some(only.clone()),
            Some(origins) => {
                response.append(header::VARY, HeaderValue::from_static("origin"));
                request_origin.filter(|o| origins.contains(o)).cloned()
            }
        };

        if let Some(origin) = origin {
            response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        response.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
        response.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    }
}
