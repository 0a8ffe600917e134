//! Provably Fair Draws
//!
//! Pure functions only: no state, no I/O beyond digesting bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FAIRNESS                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - sha256(server_seed ‖ client_seed)        │
//! │  weights.rs      - Hash prefix → cumulative weight table    │
//! │  verify.rs       - Full re-derivation of a disclosed draw   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod verify;
pub mod weights;

// Re-export key types
pub use commitment::{compute_hash, verify, DrawCommitment, HashAlgorithm};
pub use verify::{check_pre_commitment, verify_draw, FairnessError, VerifiedDraw};
pub use weights::{derive_index, derive_item, WeightTable, WeightedItem};
