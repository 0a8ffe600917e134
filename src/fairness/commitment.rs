//! Draw Commitment Protocol
//!
//! The draw authority commits to `sha256(server_seed ‖ client_seed)` before
//! the draw is revealed. The server seed is disclosed afterwards so anyone
//! can recompute the hash.

use serde::{Serialize, Deserialize};

use crate::core::hash::{decode_digest, SeedHasher};
use crate::fairness::verify::FairnessError;

/// Digest used for commitments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 over the UTF-8 concatenation of both seeds.
    #[default]
    Sha256,
}

/// Commitment to one draw.
///
/// `server_seed` stays `None` until disclosure; the hash is public from
/// the moment the payment is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCommitment {
    /// Lowercase hex SHA-256 of `server_seed ‖ client_seed`.
    pub commitment_hash: String,

    /// Server seed (secret until disclosure).
    pub server_seed: Option<String>,

    /// Client seed (public).
    pub client_seed: String,

    /// Digest algorithm.
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

impl DrawCommitment {
    /// Commit to a seed pair. The server seed is not retained.
    pub fn commit(server_seed: &str, client_seed: &str) -> Self {
        Self {
            commitment_hash: compute_hash(server_seed, client_seed),
            server_seed: None,
            client_seed: client_seed.to_string(),
            algorithm: HashAlgorithm::Sha256,
        }
    }

    /// Commit to a seed pair and disclose the server seed immediately.
    pub fn disclosed(server_seed: &str, client_seed: &str) -> Self {
        Self::commit(server_seed, client_seed).disclose(server_seed)
    }

    /// Attach the disclosed server seed.
    pub fn disclose(mut self, server_seed: impl Into<String>) -> Self {
        self.server_seed = Some(server_seed.into());
        self
    }

    /// Copy with the server seed withheld.
    pub fn sealed(&self) -> Self {
        Self {
            server_seed: None,
            ..self.clone()
        }
    }

    /// Has the server seed been disclosed?
    pub fn is_disclosed(&self) -> bool {
        self.server_seed.is_some()
    }

    /// Recompute the hash from the disclosed seeds.
    pub fn check(&self) -> Result<(), FairnessError> {
        let server_seed = self.server_seed.as_deref().ok_or(FairnessError::SeedNotDisclosed)?;

        if verify(&self.commitment_hash, server_seed, &self.client_seed) {
            Ok(())
        } else {
            Err(FairnessError::CommitmentMismatch {
                expected: self.commitment_hash.clone(),
                computed: compute_hash(server_seed, &self.client_seed),
            })
        }
    }
}

/// Lowercase hex SHA-256 of `server_seed + client_seed`.
pub fn compute_hash(server_seed: &str, client_seed: &str) -> String {
    let mut hasher = SeedHasher::new();
    hasher.update_str(server_seed);
    hasher.update_str(client_seed);
    hasher.finalize_hex()
}

/// Check a commitment hash against a seed pair.
///
/// Compares decoded bytes, so hex case does not matter. A malformed
/// commitment hash never verifies.
pub fn verify(commitment_hash: &str, server_seed: &str, client_seed: &str) -> bool {
    let Some(expected) = decode_digest(commitment_hash) else {
        return false;
    };

    let mut hasher = SeedHasher::new();
    hasher.update_str(server_seed);
    hasher.update_str(client_seed);
    hasher.finalize() == expected
}

/// Case-insensitive digest equality; malformed input is never equal.
pub fn same_digest(a: &str, b: &str) -> bool {
    match (decode_digest(a), decode_digest(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
