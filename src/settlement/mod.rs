//! Payment settlement.
//!
//! ```text
//!   SettlementPoller::start
//!        │
//!        ├── status task ──── every poll_interval ───▶ PaymentGateway
//!        │                                               │
//!        │                          approved + draw / expired / cancelled
//!        │                                               ▼
//!        ├── countdown task ── remaining ──▶ watch   terminate() ──▶ oneshot outcome
//!        │         │                                     ▲
//!        │         └── deadline reached ─────────────────┘
//!        │
//!        └── PollerCancel::cancel() ── terminate(no outcome) + abort
//! ```

pub mod poller;

pub use poller::{ExpiryReason, PollerCancel, PollerConfig, SettlementOutcome, SettlementPoller};
