//! In-Memory Collaborators
//!
//! Catalog, account store, notifier and draw archive backed by process
//! memory. Used by the demo binary and the test suites.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::core::sync::{lock, read, write};
use crate::external::account::{AccountError, AccountStore};
use crate::external::archive::{ArchiveError, ArchivedDraw, DrawArchive, DrawOutcome};
use crate::external::catalog::{BoxListing, CatalogError, CatalogSource};
use crate::external::notifier::{Notice, Notifier};
use crate::purchase::types::{Amount, BoxId, PaymentId, UserId};

// =============================================================================
// CATALOG
// =============================================================================

/// Catalog held in a map.
#[derive(Default)]
pub struct MemoryCatalog {
    listings: RwLock<BTreeMap<BoxId, BoxListing>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing.
    pub fn insert(&self, listing: BoxListing) {
        write(&self.listings).insert(listing.box_id.clone(), listing);
    }

    /// Builder-style insert.
    pub fn with_listing(self, listing: BoxListing) -> Self {
        self.insert(listing);
        self
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn box_listing(&self, box_id: &BoxId) -> Result<BoxListing, CatalogError> {
        read(&self.listings)
            .get(box_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownBox(box_id.clone()))
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Balances held in a map.
#[derive(Default)]
pub struct MemoryAccounts {
    balances: Mutex<HashMap<UserId, Amount>>,
    writes: Mutex<HashMap<UserId, u32>>,
}

impl MemoryAccounts {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account with a starting balance.
    pub fn open(&self, user: UserId, balance: Amount) {
        lock(&self.balances).insert(user, balance);
    }

    /// Builder-style open.
    pub fn with_account(self, user: impl Into<UserId>, balance: Amount) -> Self {
        self.open(user.into(), balance);
        self
    }

    /// Number of successful credits/debits applied to a user.
    pub fn write_count(&self, user: &UserId) -> u32 {
        lock(&self.writes).get(user).copied().unwrap_or(0)
    }

    fn record_write(&self, user: &UserId) {
        *lock(&self.writes).entry(user.clone()).or_insert(0) += 1;
    }
}

impl AccountStore for MemoryAccounts {
    fn credit(&self, user: &UserId, amount: Amount) -> Result<Amount, AccountError> {
        let new_balance = {
            let mut balances = lock(&self.balances);
            let balance = balances
                .get_mut(user)
                .ok_or_else(|| AccountError::UnknownUser(user.clone()))?;
            *balance = balance
                .checked_add(amount)
                .ok_or_else(|| AccountError::Overflow(user.clone()))?;
            *balance
        };

        self.record_write(user);
        debug!(user = %user, amount, new_balance, "Account credited");
        Ok(new_balance)
    }

    fn debit(&self, user: &UserId, amount: Amount) -> Result<Amount, AccountError> {
        let new_balance = {
            let mut balances = lock(&self.balances);
            let balance = balances
                .get_mut(user)
                .ok_or_else(|| AccountError::UnknownUser(user.clone()))?;
            if *balance < amount {
                return Err(AccountError::InsufficientFunds {
                    user: user.clone(),
                    balance: *balance,
                    requested: amount,
                });
            }
            *balance -= amount;
            *balance
        };

        self.record_write(user);
        debug!(user = %user, amount, new_balance, "Account debited");
        Ok(new_balance)
    }

    fn balance(&self, user: &UserId) -> Result<Amount, AccountError> {
        lock(&self.balances)
            .get(user)
            .copied()
            .ok_or_else(|| AccountError::UnknownUser(user.clone()))
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Notifier that keeps every notice.
#[derive(Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices delivered so far.
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        lock(&self.notices).push(notice);
    }
}

// =============================================================================
// ARCHIVE
// =============================================================================

/// Draw archive held in a map, with bincode snapshots.
#[derive(Default)]
pub struct MemoryArchive {
    draws: RwLock<BTreeMap<PaymentId, ArchivedDraw>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh commitment. Existing records are never replaced.
    pub fn record_commitment(&self, draw: ArchivedDraw) -> Result<(), ArchiveError> {
        let mut draws = write(&self.draws);
        if draws.contains_key(&draw.payment_id) {
            return Err(ArchiveError::Conflict(draw.payment_id));
        }
        draws.insert(draw.payment_id.clone(), draw);
        Ok(())
    }

    /// Attach the settled outcome to a record, once.
    pub fn record_outcome(
        &self,
        payment_id: &PaymentId,
        outcome: DrawOutcome,
    ) -> Result<ArchivedDraw, ArchiveError> {
        let mut draws = write(&self.draws);
        let record = draws
            .get_mut(payment_id)
            .ok_or_else(|| ArchiveError::Missing(payment_id.clone()))?;

        match &record.outcome {
            Some(existing) if *existing == outcome => Ok(record.clone()),
            Some(_) => Err(ArchiveError::Conflict(payment_id.clone())),
            None => {
                record.outcome = Some(outcome);
                Ok(record.clone())
            }
        }
    }

    /// Record by payment id.
    pub fn get(&self, payment_id: &PaymentId) -> Option<ArchivedDraw> {
        read(&self.draws).get(payment_id).cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        read(&self.draws).len()
    }

    /// True when nothing has been archived.
    pub fn is_empty(&self) -> bool {
        read(&self.draws).is_empty()
    }

    /// Serialize every record with bincode.
    pub fn snapshot(&self) -> Result<Vec<u8>, ArchiveError> {
        let draws = read(&self.draws);
        bincode::serialize(&*draws).map_err(|e| ArchiveError::Corrupt(e.to_string()))
    }

    /// Rebuild an archive from a snapshot.
    pub fn restore(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let draws: BTreeMap<PaymentId, ArchivedDraw> =
            bincode::deserialize(bytes).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        Ok(Self {
            draws: RwLock::new(draws),
        })
    }
}

#[async_trait]
impl DrawArchive for MemoryArchive {
    async fn find_draw(&self, payment_id: &PaymentId) -> Result<Option<ArchivedDraw>, ArchiveError> {
        Ok(self.get(payment_id))
    }

    async fn list_payment_ids(&self) -> Result<Vec<PaymentId>, ArchiveError> {
        Ok(read(&self.draws).keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::fairness::commitment::DrawCommitment;
    use crate::fairness::weights::{WeightTable, WeightedItem};
    use crate::purchase::types::ItemId;

    fn table() -> WeightTable {
        WeightTable::new(vec![WeightedItem::new("a", 1), WeightedItem::new("b", 3)]).unwrap()
    }

    fn record(id: &str) -> ArchivedDraw {
        ArchivedDraw {
            payment_id: PaymentId::new(id),
            box_id: BoxId::new("box"),
            commitment: DrawCommitment::disclosed("server", "client"),
            table: table(),
            outcome: None,
        }
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = MemoryCatalog::new().with_listing(BoxListing {
            box_id: BoxId::new("box"),
            price: 990,
            table: table(),
        });

        let listing = catalog.box_listing(&BoxId::new("box")).await.unwrap();
        assert_eq!(listing.price, 990);

        let missing = catalog.box_listing(&BoxId::new("nope")).await;
        assert!(matches!(missing, Err(CatalogError::UnknownBox(_))));
    }

    #[test]
    fn test_accounts_debit_and_credit() {
        let accounts = MemoryAccounts::new().with_account("alice", 1_000);
        let alice = UserId::new("alice");

        assert_eq!(accounts.debit(&alice, 400).unwrap(), 600);
        assert_eq!(accounts.credit(&alice, 50).unwrap(), 650);
        assert_eq!(accounts.balance(&alice).unwrap(), 650);
        assert_eq!(accounts.write_count(&alice), 2);
    }

    #[test]
    fn test_accounts_reject_overdraft() {
        let accounts = MemoryAccounts::new().with_account("bob", 100);
        let bob = UserId::new("bob");

        let result = accounts.debit(&bob, 101);
        assert!(matches!(result, Err(AccountError::InsufficientFunds { .. })));
        assert_eq!(accounts.balance(&bob).unwrap(), 100);
        assert_eq!(accounts.write_count(&bob), 0);

        let unknown = accounts.debit(&UserId::new("carol"), 1);
        assert!(matches!(unknown, Err(AccountError::UnknownUser(_))));
    }

    #[test]
    fn test_archive_never_replaces_commitment() {
        let archive = MemoryArchive::new();
        archive.record_commitment(record("pay-1")).unwrap();

        let again = archive.record_commitment(record("pay-1"));
        assert!(matches!(again, Err(ArchiveError::Conflict(_))));
    }

    #[test]
    fn test_archive_outcome_is_write_once() {
        let archive = MemoryArchive::new();
        archive.record_commitment(record("pay-1")).unwrap();

        let outcome = DrawOutcome {
            item_id: ItemId::new("b"),
            derived_index: 1,
            settled_at: Utc::now(),
        };
        archive.record_outcome(&PaymentId::new("pay-1"), outcome.clone()).unwrap();

        // Same outcome again is accepted, a different one is not
        assert!(archive.record_outcome(&PaymentId::new("pay-1"), outcome.clone()).is_ok());
        let different = DrawOutcome {
            item_id: ItemId::new("a"),
            derived_index: 0,
            ..outcome
        };
        assert!(matches!(
            archive.record_outcome(&PaymentId::new("pay-1"), different),
            Err(ArchiveError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_archive_snapshot_restore() {
        let archive = MemoryArchive::new();
        archive.record_commitment(record("pay-1")).unwrap();
        archive.record_commitment(record("pay-2")).unwrap();

        let bytes = archive.snapshot().unwrap();
        let restored = MemoryArchive::restore(&bytes).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.find_draw(&PaymentId::new("pay-1")).await.unwrap(),
            archive.get(&PaymentId::new("pay-1"))
        );
        assert_eq!(
            restored.list_payment_ids().await.unwrap(),
            vec![PaymentId::new("pay-1"), PaymentId::new("pay-2")]
        );

        assert!(matches!(
            MemoryArchive::restore(&[0xff, 0x01]),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_notifier_records() {
        use crate::external::notifier::NoticeKind;

        let notifier = MemoryNotifier::new();
        notifier.notify(Notice {
            purchase_id: uuid::Uuid::new_v4(),
            kind: NoticeKind::Dismissible { retry: true },
            message: "expired".to_string(),
        });

        assert_eq!(notifier.notices().len(), 1);
    }
}
