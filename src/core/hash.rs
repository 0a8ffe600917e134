//! Digest Helpers
//!
//! SHA-256 primitives shared by the fairness and transparency paths:
//! - Commitment hashing over seed material
//! - Lowercase hex encoding for the wire
//! - Strict hex decoding for byte-for-byte comparison

use sha2::{Sha256, Digest};

/// Digest output type (256 bits / 32 bytes).
pub type Digest32 = [u8; 32];

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Incremental SHA-256 hasher over string parts.
///
/// Parts are concatenated with no separator, so
/// `["ab", "c"]` and `["a", "bc"]` hash identically.
pub struct SeedHasher {
    hasher: Sha256,
}

impl SeedHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Update with the UTF-8 bytes of a string.
    #[inline]
    pub fn update_str(&mut self, part: &str) {
        self.hasher.update(part.as_bytes());
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest32 {
        self.hasher.finalize().into()
    }

    /// Finalize and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

impl Default for SeedHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Decode a 64-character hex digest (either case).
///
/// Returns `None` for the wrong length or any non-hex character.
pub fn decode_digest(hex_digest: &str) -> Option<Digest32> {
    if hex_digest.len() != DIGEST_HEX_LEN {
        return None;
    }
    let bytes = hex::decode(hex_digest).ok()?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Some(digest)
}

/// Short form of a hex digest for log lines.
pub fn short_hex(hex_digest: &str) -> &str {
    hex_digest.get(..8).unwrap_or(hex_digest)
}
