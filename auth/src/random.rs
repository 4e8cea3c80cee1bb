//! Opaque single-use tokens.
//!
//! Tokens are drawn from a cryptographically secure source and handed to
//! the user in plaintext. Only their SHA-256 digest is ever stored.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;

/// Default token size in bytes (32 bytes = 256 bits of entropy)
pub const TOKEN_BYTES: usize = 32;

/// Source of cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync + 'static {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Generate an opaque token.
///
/// # Returns
/// A base64 URL-safe encoded string without padding (43 characters)
pub fn generate_token(random: &dyn SecureRandom) -> String {
    let mut buffer = [0u8; TOKEN_BYTES];
    random.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// SHA-256 digest of a token, lowercase hex.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
