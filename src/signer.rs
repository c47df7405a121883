//! Presigned-URL signing and verification.
//!
//! A presigned URL carries `expiration` (UNIX seconds) and `signature`
//! (lowercase-hex HMAC-SHA256) query parameters.  The string to sign is the
//! exact byte concatenation `<expiration>:<bucket>:<key>` keyed with the
//! service's shared secret.  Signing is deterministic and stateless; the
//! secret never leaves this module.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Stateless HMAC signer bound to the shared secret.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    /// Create a signer from the configured shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the lowercase-hex signature for `<expiration>:<bucket>:<key>`.
    pub fn sign(&self, expiration: i64, bucket: &str, key: &str) -> String {
        let string_to_sign = format!("{expiration}:{bucket}:{key}");
        hex::encode(hmac_sha256(&self.secret, string_to_sign.as_bytes()))
    }

    /// Verify a presented signature against the expected one.
    ///
    /// The comparison is constant-time over the hex strings; unequal lengths
    /// fail before the comparison.  Expiry is the caller's check — this
    /// method answers only "was this URL signed with our secret".
    pub fn verify(&self, expiration: i64, bucket: &str, key: &str, signature: &str) -> bool {
        let expected = self.sign(expiration, bucket, key);
        constant_time_eq(&expected, signature)
    }
}

/// HMAC-SHA256 of `data` under `key`.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compare two strings in constant time.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── Tests ───────────────────────────────────────────────────────────
