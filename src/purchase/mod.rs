//! Purchases.
//!
//! Data model, the orchestrator that runs a purchase end to end, its error
//! taxonomy and the one-shot settlement ledger.

pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod types;

pub use error::PurchaseError;
pub use ledger::{ClaimResult, SettlementEntry, SettlementLedger};
pub use orchestrator::{PurchaseHandle, PurchaseOrchestrator, PurchaseState};
pub use types::{
    Amount, BoxId, DrawResult, ItemId, Payment, PaymentError, PaymentId, PaymentStatus,
    PurchaseId, PurchaseIntent, UserId,
};
