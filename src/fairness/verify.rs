//! Draw Verification
//!
//! Recomputes a disclosed draw from its seeds and the box's weight table.
//! Any difference is an integrity failure and is reported as such; nothing
//! here ever "repairs" a draw.

use serde::{Serialize, Deserialize};

use crate::fairness::commitment::same_digest;
use crate::fairness::weights::{derive_item, WeightTable};
use crate::purchase::types::{DrawResult, ItemId, PaymentId};

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedDraw {
    /// Payment the draw belongs to.
    pub payment_id: PaymentId,
    /// Commitment hash that was recomputed.
    pub commitment_hash: String,
    /// Re-derived table index.
    pub derived_index: usize,
    /// Re-derived item.
    pub item_id: ItemId,
}

/// Errors that can occur while verifying a draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FairnessError {
    /// Server seed has not been disclosed yet.
    SeedNotDisclosed,

    /// Recomputed hash differs from the commitment.
    CommitmentMismatch {
        /// Committed hash.
        expected: String,
        /// Hash recomputed from the seeds.
        computed: String,
    },

    /// Draw hash differs from the hash published at payment creation.
    PreCommitmentMismatch {
        /// Hash published before the draw.
        published: String,
        /// Hash presented with the draw.
        presented: String,
    },

    /// Hash is not 64 hex characters.
    MalformedHash(String),

    /// Weight table has no items.
    EmptyTable,

    /// Weight table entry with zero weight.
    ZeroWeight(ItemId),

    /// Item listed twice in a weight table.
    DuplicateItem(ItemId),

    /// Claimed index differs from the re-derived index.
    IndexMismatch {
        /// Index claimed by the draw.
        claimed: usize,
        /// Index derived from the hash.
        derived: usize,
    },

    /// Claimed item differs from the item at the derived index.
    ItemMismatch {
        /// Item claimed by the draw.
        claimed: ItemId,
        /// Item derived from the hash.
        derived: ItemId,
    },
}

impl std::fmt::Display for FairnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SeedNotDisclosed => write!(f, "Server seed not disclosed"),
            Self::CommitmentMismatch { expected, computed } => {
                write!(f, "Commitment mismatch: expected {}, computed {}", expected, computed)
            }
            Self::PreCommitmentMismatch { published, presented } => {
                write!(f, "Pre-commitment mismatch: published {}, presented {}", published, presented)
            }
            Self::MalformedHash(hash) => write!(f, "Malformed hash: {:?}", hash),
            Self::EmptyTable => write!(f, "Weight table is empty"),
            Self::ZeroWeight(item) => write!(f, "Item {} has zero weight", item),
            Self::DuplicateItem(item) => write!(f, "Item {} listed twice", item),
            Self::IndexMismatch { claimed, derived } => {
                write!(f, "Index mismatch: claimed {}, derived {}", claimed, derived)
            }
            Self::ItemMismatch { claimed, derived } => {
                write!(f, "Item mismatch: claimed {}, derived {}", claimed, derived)
            }
        }
    }
}

impl std::error::Error for FairnessError {}

/// Verify a disclosed draw against its box's weight table.
///
/// Checks, in order: the server seed is disclosed, the hash recomputes,
/// the index re-derives, and the item at that index is the claimed item.
pub fn verify_draw(draw: &DrawResult, table: &WeightTable) -> Result<VerifiedDraw, FairnessError> {
    // 1. Seeds reproduce the committed hash
    draw.commitment.check()?;

    // 2. Hash selects the claimed index and item
    let (derived_index, derived_item) = derive_item(&draw.commitment.commitment_hash, table)?;

    if derived_index != draw.derived_index {
        return Err(FairnessError::IndexMismatch {
            claimed: draw.derived_index,
            derived: derived_index,
        });
    }

    if *derived_item != draw.item_id {
        return Err(FairnessError::ItemMismatch {
            claimed: draw.item_id.clone(),
            derived: derived_item.clone(),
        });
    }

    Ok(VerifiedDraw {
        payment_id: draw.payment_id.clone(),
        commitment_hash: draw.commitment.commitment_hash.to_ascii_lowercase(),
        derived_index,
        item_id: derived_item.clone(),
    })
}

/// Check a draw against the hash published when the payment was created.
///
/// When the server seed is already disclosed the hash is recomputed too.
pub fn check_pre_commitment(published: &str, draw: &DrawResult) -> Result<(), FairnessError> {
    if !same_digest(published, &draw.commitment.commitment_hash) {
        return Err(FairnessError::PreCommitmentMismatch {
            published: published.to_string(),
            presented: draw.commitment.commitment_hash.clone(),
        });
    }

    if draw.commitment.is_disclosed() {
        draw.commitment.check()?;
    }

    Ok(())
}
