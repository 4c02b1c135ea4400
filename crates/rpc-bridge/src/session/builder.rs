//! Builds signed session tokens.

use super::radix::to_base36;
use super::{system_clock, Clock, SessionSigner, TOKEN_SEPARATOR};
use crate::codec::{stringify_message, CodecError};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Stateless token builder.
#[derive(Clone)]
pub struct SessionBuilder {
    signer: Arc<SessionSigner>,
    clock: Clock,
}

impl SessionBuilder {
    pub fn new(signer: Arc<SessionSigner>, clock: Clock) -> Self {
        Self { signer, clock }
    }

    pub fn with_system_clock(signer: Arc<SessionSigner>) -> Self {
        Self::new(signer, system_clock())
    }

    /// Sign `payload` with the current time.
    ///
    /// The payload must not contain `|`, otherwise the token cannot be
    /// extracted again.
    pub fn build(&self, payload: &str) -> String {
        if payload.contains(TOKEN_SEPARATOR) {
            warn!("Session payload contains '{}'; token will not extract", TOKEN_SEPARATOR);
        }

        let timestamp = self.clock.now_millis() / 1000;
        let signature = self.signer.sign(payload, timestamp);
        format!(
            "{payload}{sep}{ts}{sep}{signature}",
            sep = TOKEN_SEPARATOR,
            ts = to_base36(timestamp)
        )
    }

    /// Stringify a typed session, then sign it.
    pub fn build_message<T: Serialize>(&self, session: &T) -> Result<String, CodecError> {
        Ok(self.build(&stringify_message(session)?))
    }
}
