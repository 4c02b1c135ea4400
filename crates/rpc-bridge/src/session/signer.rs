//! HMAC-SHA256 session signer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks session signatures with a shared secret.
pub struct SessionSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Zeroizing::new(secret.as_ref().to_vec()),
        }
    }

    fn mac(&self, payload: &str, timestamp: u64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");

        mac.update(payload.as_bytes());
        mac.update(b"/");
        mac.update(timestamp.to_string().as_bytes());
        mac
    }

    /// Base64 HMAC-SHA256 over `"<payload>/<timestamp>"`, timestamp in decimal.
    pub fn sign(&self, payload: &str, timestamp: u64) -> String {
        STANDARD.encode(self.mac(payload, timestamp).finalize().into_bytes())
    }

    /// Check `signature` against the expected MAC.
    ///
    /// The signature must be canonical base64; the decoded tag is compared
    /// in constant time by `Mac::verify_slice`.
    pub fn verify(&self, payload: &str, timestamp: u64, signature: &str) -> bool {
        let Ok(tag) = STANDARD.decode(signature) else {
            return false;
        };
        self.mac(payload, timestamp).verify_slice(&tag).is_ok()
    }
}

impl fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}
