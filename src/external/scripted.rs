//! Scripted Gateway and Draw Authority
//!
//! In-memory payment provider whose status answers follow a script, plus
//! the server-side authority that commits to seeds at payment creation and
//! draws the item at approval.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::clock::Clock;
use crate::core::hash::short_hex;
use crate::core::sync::lock;
use crate::external::archive::{ArchiveError, ArchivedDraw, DrawOutcome};
use crate::external::catalog::CatalogSource;
use crate::external::gateway::{GatewayError, PaymentGateway, StatusReport};
use crate::external::memory::MemoryArchive;
use crate::fairness::commitment::DrawCommitment;
use crate::fairness::weights::{derive_item, WeightTable};
use crate::purchase::types::{
    Amount, BoxId, DrawResult, Payment, PaymentId, PaymentStatus, PurchaseIntent,
};

// =============================================================================
// DRAW AUTHORITY
// =============================================================================

/// Server-side draw authority.
///
/// Generates the server seed, archives the commitment before any reveal,
/// and derives the item when the payment is approved.
pub struct DrawAuthority {
    archive: Arc<MemoryArchive>,
    clock: Arc<dyn Clock>,
}

impl DrawAuthority {
    /// Create an authority writing to an archive.
    pub fn new(archive: Arc<MemoryArchive>, clock: Arc<dyn Clock>) -> Self {
        Self { archive, clock }
    }

    /// Archive backing this authority.
    pub fn archive(&self) -> &Arc<MemoryArchive> {
        &self.archive
    }

    /// Commit to a fresh server seed for a payment.
    ///
    /// Returns the public commitment hash. The seed stays in the archive.
    pub fn commit(
        &self,
        payment_id: &PaymentId,
        box_id: &BoxId,
        client_seed: &str,
        table: WeightTable,
    ) -> Result<String, ArchiveError> {
        let server_seed = fresh_server_seed();
        let commitment = DrawCommitment::commit(&server_seed, client_seed).disclose(server_seed);
        let commitment_hash = commitment.commitment_hash.clone();

        self.archive.record_commitment(ArchivedDraw {
            payment_id: payment_id.clone(),
            box_id: box_id.clone(),
            commitment,
            table,
            outcome: None,
        })?;

        debug!(payment = %payment_id, commitment = %short_hex(&commitment_hash), "Draw committed");
        Ok(commitment_hash)
    }

    /// Draw the item for an approved payment.
    ///
    /// Settling twice returns the same draw.
    pub fn settle(&self, payment_id: &PaymentId) -> Result<DrawResult, ArchiveError> {
        let record = self
            .archive
            .get(payment_id)
            .ok_or_else(|| ArchiveError::Missing(payment_id.clone()))?;

        if let Some(draw) = record.to_draw_result() {
            return Ok(draw);
        }

        let (derived_index, item_id) = derive_item(&record.commitment.commitment_hash, &record.table)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

        let outcome = DrawOutcome {
            item_id: item_id.clone(),
            derived_index,
            settled_at: self.clock.now(),
        };
        let settled = self.archive.record_outcome(payment_id, outcome)?;

        info!(payment = %payment_id, item = %item_id, index = derived_index, "Draw settled");
        settled
            .to_draw_result()
            .ok_or_else(|| ArchiveError::Corrupt(format!("outcome missing for {}", payment_id)))
    }
}

/// 64 hex characters of fresh randomness.
fn fresh_server_seed() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

// =============================================================================
// SCRIPTED GATEWAY
// =============================================================================

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct MemoryGatewayConfig {
    /// Time between payment creation and `expires_at`.
    pub payment_ttl: Duration,
    /// Refuse every payment creation.
    pub reject_payments: bool,
}

impl Default for MemoryGatewayConfig {
    fn default() -> Self {
        Self {
            payment_ttl: Duration::from_secs(600),
            reject_payments: false,
        }
    }
}

/// One scripted answer to a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStep {
    /// Answer with this status.
    Status(PaymentStatus),
    /// Fail the query (transient error).
    Fail,
}

/// Provider-side payment record.
struct ProviderPayment {
    amount: Amount,
    script: VecDeque<StatusStep>,
    last: PaymentStatus,
    draw: Option<DrawResult>,
    fetches: u32,
}

/// In-memory payment provider.
///
/// Every payment created gets a copy of the current script. Once the
/// script is exhausted the last status repeats; a terminal status always
/// repeats.
pub struct MemoryGateway {
    config: MemoryGatewayConfig,
    clock: Arc<dyn Clock>,
    catalog: Arc<dyn CatalogSource>,
    authority: DrawAuthority,
    script: Mutex<Vec<StatusStep>>,
    payments: Mutex<BTreeMap<PaymentId, ProviderPayment>>,
    next_id: AtomicU64,
}

impl MemoryGateway {
    /// Create a gateway whose draws are archived in `archive`.
    pub fn new(
        config: MemoryGatewayConfig,
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn CatalogSource>,
        archive: Arc<MemoryArchive>,
    ) -> Self {
        Self {
            config,
            authority: DrawAuthority::new(archive, clock.clone()),
            clock,
            catalog,
            script: Mutex::new(Vec::new()),
            payments: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the script for payments created from now on.
    pub fn set_script(&self, steps: Vec<StatusStep>) {
        *lock(&self.script) = steps;
    }

    /// Builder-style script.
    pub fn with_script(self, steps: Vec<StatusStep>) -> Self {
        self.set_script(steps);
        self
    }

    /// Force a payment's next answers to a status.
    pub fn set_status(&self, payment_id: &PaymentId, status: PaymentStatus) -> Result<(), GatewayError> {
        let mut payments = lock(&self.payments);
        let entry = payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::UnknownPayment(payment_id.clone()))?;
        entry.script.clear();
        entry.script.push_back(StatusStep::Status(status));
        Ok(())
    }

    /// Number of status queries received for a payment.
    pub fn fetch_count(&self, payment_id: &PaymentId) -> u32 {
        lock(&self.payments).get(payment_id).map(|p| p.fetches).unwrap_or(0)
    }

    /// Every payment created so far.
    pub fn payment_ids(&self) -> Vec<PaymentId> {
        lock(&self.payments).keys().cloned().collect()
    }

    /// Draw authority behind this gateway.
    pub fn authority(&self) -> &DrawAuthority {
        &self.authority
    }

    fn next_payment_id(&self) -> PaymentId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        PaymentId::new(format!("pay-{:06}", n))
    }
}

#[async_trait]
impl PaymentGateway for MemoryGateway {
    async fn create_payment(&self, intent: &PurchaseIntent) -> Result<Payment, GatewayError> {
        if self.config.reject_payments {
            return Err(GatewayError::Rejected("payments disabled".to_string()));
        }

        let listing = self
            .catalog
            .box_listing(&intent.box_id)
            .await
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;

        if listing.price != intent.price_at_intent {
            return Err(GatewayError::Rejected(format!(
                "price changed from {} to {}",
                intent.price_at_intent, listing.price
            )));
        }

        let payment_id = self.next_payment_id();
        let created_at = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.payment_ttl)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let commitment_hash = self
            .authority
            .commit(&payment_id, &intent.box_id, &intent.client_seed, listing.table)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let payment = Payment::new(
            payment_id.clone(),
            intent.price_at_intent,
            created_at,
            created_at + ttl,
            format!("ref-{}", payment_id),
        )
        .map_err(|e| GatewayError::Rejected(e.to_string()))?
        .with_commitment(commitment_hash);

        let script = lock(&self.script).iter().copied().collect();
        lock(&self.payments).insert(
            payment_id.clone(),
            ProviderPayment {
                amount: payment.amount,
                script,
                last: PaymentStatus::Pending,
                draw: None,
                fetches: 0,
            },
        );

        info!(payment = %payment_id, user = %intent.user_id, amount = payment.amount, "Payment created");
        Ok(payment)
    }

    async fn payment_status(&self, payment_id: &PaymentId) -> Result<StatusReport, GatewayError> {
        let mut payments = lock(&self.payments);
        let entry = payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::UnknownPayment(payment_id.clone()))?;

        entry.fetches += 1;

        let step = if entry.last.is_terminal() {
            StatusStep::Status(entry.last)
        } else {
            entry.script.pop_front().unwrap_or(StatusStep::Status(entry.last))
        };

        match step {
            StatusStep::Fail => Err(GatewayError::Unavailable("scripted failure".to_string())),
            StatusStep::Status(PaymentStatus::Approved) => {
                let draw = match &entry.draw {
                    Some(draw) => draw.clone(),
                    None => {
                        let draw = self
                            .authority
                            .settle(payment_id)
                            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
                        entry.draw = Some(draw.clone());
                        draw
                    }
                };
                entry.last = PaymentStatus::Approved;
                Ok(StatusReport::approved(entry.amount, draw))
            }
            StatusStep::Status(status) => {
                entry.last = status;
                Ok(StatusReport::with_status(status))
            }
        }
    }
}
