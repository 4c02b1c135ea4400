//! Domain layer: configuration, descriptors and error types.

pub mod config;
pub mod descriptor;
pub mod error;

pub use config::{ConfigError, CorsConfig, HttpConfig, LimitsConfig, ServiceConfig, SessionConfig, StreamConfig};
pub use descriptor::{
    AuthDescriptor, BodyKind, MetadataDescriptor, RemoteCallDescriptor, ResponseKind,
    ServiceDescriptor,
};
pub use error::{ApiError, ApiResult, ErrorKind, ServiceError};
