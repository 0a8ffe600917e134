//! External collaborators.
//!
//! Traits for everything the pipeline talks to but does not own: payment
//! gateway, catalog, account store, notifier and draw archive. In-memory
//! implementations back the demo binary and the tests.

pub mod account;
pub mod archive;
pub mod catalog;
pub mod gateway;
pub mod memory;
pub mod notifier;
pub mod scripted;

pub use account::{AccountError, AccountStore};
pub use archive::{ArchiveError, ArchivedDraw, DrawArchive, DrawOutcome};
pub use catalog::{BoxListing, CatalogError, CatalogSource};
pub use gateway::{GatewayError, PaymentGateway, StatusReport};
pub use memory::{MemoryAccounts, MemoryArchive, MemoryCatalog, MemoryNotifier};
pub use notifier::{Notice, NoticeKind, Notifier, TracingNotifier};
pub use scripted::{DrawAuthority, MemoryGateway, MemoryGatewayConfig, StatusStep};
