//! # Loot Box Purchase-to-Reveal Pipeline
//!
//! Buys a loot box, waits for the payment to settle, reveals the drawn item
//! and lets anyone verify afterwards that the draw was fair.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LOOTBOX REVEAL                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                               │
//! │  ├── hash.rs     - SHA-256 digests and hex helpers          │
//! │  ├── clock.rs    - Wall clock (system / tokio-driven)       │
//! │  └── liveness.rs - Session generation tokens                │
//! │                                                             │
//! │  fairness/       - Provably fair draws (pure)               │
//! │  ├── commitment.rs - sha256(server_seed ‖ client_seed)      │
//! │  ├── weights.rs  - Hash prefix → weighted item              │
//! │  └── verify.rs   - Full draw re-derivation                  │
//! │                                                             │
//! │  settlement/     - Payment status polling + deadline        │
//! │  reveal/         - Idle → Opening → Revealed → Closed       │
//! │  purchase/       - Orchestrator, ledger, errors, model      │
//! │  transparency/   - Public draw queries and audit            │
//! │  external/       - Gateway, catalog, accounts, archive      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness Guarantee
//!
//! The commitment hash is published when the payment is created, before
//! the draw exists. The item index is derived from that hash alone, so
//! once the server seed is disclosed anyone can recompute both and catch
//! a substituted draw.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod external;
pub mod fairness;
pub mod purchase;
pub mod reveal;
pub mod settlement;
pub mod transparency;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use fairness::{compute_hash, derive_index, verify, verify_draw, FairnessError, WeightTable};
pub use purchase::{
    PurchaseError, PurchaseHandle, PurchaseOrchestrator, PurchaseState,
};
pub use reveal::{RevealEvent, RevealPhase, RevealStateMachine};
pub use settlement::{ExpiryReason, SettlementOutcome, SettlementPoller};
pub use transparency::{AuditReport, TransparencyQueryService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
