//! Validates signed session tokens and unwraps their payload.

use super::radix::from_base36;
use super::{system_clock, Clock, SessionError, SessionSigner, TOKEN_SEPARATOR};
use crate::codec::destringify_message;
use crate::domain::config::DEFAULT_SESSION_LONGEVITY_SECS;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Stateless token validator.
#[derive(Clone)]
pub struct SessionExtractor {
    signer: Arc<SessionSigner>,
    clock: Clock,
    longevity_secs: u64,
}

impl SessionExtractor {
    pub fn new(signer: Arc<SessionSigner>, clock: Clock) -> Self {
        Self {
            signer,
            clock,
            longevity_secs: DEFAULT_SESSION_LONGEVITY_SECS,
        }
    }

    pub fn with_system_clock(signer: Arc<SessionSigner>) -> Self {
        Self::new(signer, system_clock())
    }

    /// Override the maximum token age.
    pub fn with_longevity(mut self, longevity_secs: u64) -> Self {
        self.longevity_secs = longevity_secs;
        self
    }

    pub fn longevity_secs(&self) -> u64 {
        self.longevity_secs
    }

    /// Verify `signed` and return its raw payload.
    ///
    /// Checks, in order: presence, shape (three `|`-separated pieces with a
    /// base-36 timestamp), signature, then age. Timestamps in the future are
    /// accepted.
    pub fn extract(&self, signed: Option<&str>) -> Result<String, SessionError> {
        let signed = match signed {
            Some(s) if !s.is_empty() => s,
            _ => return Err(SessionError::Missing),
        };

        let pieces: Vec<&str> = signed.split(TOKEN_SEPARATOR).collect();
        let &[payload, timestamp, signature] = pieces.as_slice() else {
            return Err(SessionError::Malformed);
        };
        let timestamp = from_base36(timestamp).ok_or(SessionError::Malformed)?;

        if !self.signer.verify(payload, timestamp, signature) {
            return Err(SessionError::InvalidSignature);
        }

        let now_secs = self.clock.now_millis() / 1000;
        let age_secs = now_secs.saturating_sub(timestamp);
        if age_secs > self.longevity_secs {
            debug!(age_secs, longevity_secs = self.longevity_secs, "Session expired");
            return Err(SessionError::Expired { age_secs });
        }

        Ok(payload.to_string())
    }

    /// Verify `signed` and decode its payload into a typed session.
    pub fn extract_message<T: DeserializeOwned>(
        &self,
        signed: Option<&str>,
    ) -> Result<T, SessionError> {
        let payload = self.extract(signed)?;
        destringify_message(&payload).map_err(SessionError::Decode)
    }
}
