//! Signed sessions: opaque, tamper-evident, time-limited tokens.
//!
//! ## Token format
//!
//! ```text
//! <payload>|<timestamp, base 36>|<base64 HMAC-SHA256(secret, "<payload>/<timestamp, decimal>")>
//! ```
//!
//! The payload is readable by anyone holding the token. Only integrity and
//! freshness are protected, and nothing is stored server-side.

pub mod builder;
pub mod extractor;
pub mod radix;
pub mod signer;

pub use builder::SessionBuilder;
pub use extractor::SessionExtractor;
pub use signer::SessionSigner;

use crate::codec::CodecError;
use crate::domain::error::{ApiError, ErrorKind};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between the three token pieces
pub const TOKEN_SEPARATOR: char = '|';

/// Source of "now" in epoch milliseconds
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub u64);

impl TimeSource for FixedTimeSource {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

/// Shared time source of a builder or extractor
pub type Clock = Arc<dyn TimeSource>;

/// Clock backed by the system time
pub fn system_clock() -> Clock {
    Arc::new(SystemTimeSource)
}

/// Returns the current Unix time in milliseconds, or 0 if the system clock
/// is before the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Session extraction failures
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("signed session is missing or is not a string")]
    Missing,

    #[error("invalid signed session string")]
    Malformed,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("session expired {age_secs}s after signing")]
    Expired { age_secs: u64 },

    /// Signature was valid but the payload does not match the session type
    #[error("unable to decode session payload: {0}")]
    Decode(#[source] CodecError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Decode(_) => ErrorKind::BadRequest,
            _ => ErrorKind::Unauthorized,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::from_kind(e.kind(), e.to_string())
    }
}
