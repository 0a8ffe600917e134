//! Transparency Queries
//!
//! Read-only view over the draw archive. Anyone holding a payment id can
//! fetch its commitment, seeds and weight table and re-run the fairness
//! check themselves; the audit does it for every archived draw.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::external::archive::{ArchiveError, ArchivedDraw, DrawArchive};
use crate::fairness::commitment::DrawCommitment;
use crate::fairness::verify::{verify_draw, FairnessError, VerifiedDraw};
use crate::fairness::weights::WeightTable;
use crate::purchase::types::{BoxId, DrawResult, ItemId, PaymentId};

/// Public disclosure of one draw.
///
/// Before settlement only the commitment hash and client seed are shown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawDisclosure {
    /// Payment.
    pub payment_id: PaymentId,
    /// Box bought.
    pub box_id: BoxId,
    /// Won item, once settled.
    pub item_id: Option<ItemId>,
    /// Index into `catalog`, once settled.
    pub derived_index: Option<usize>,
    /// Commitment; the server seed is present only once settled.
    pub commitment: DrawCommitment,
    /// Weight table the draw was made from.
    pub catalog: WeightTable,
    /// Settlement time.
    pub settled_at: Option<DateTime<Utc>>,
}

impl DrawDisclosure {
    fn from_archive(record: ArchivedDraw) -> Self {
        match record.outcome {
            Some(outcome) => Self {
                payment_id: record.payment_id,
                box_id: record.box_id,
                item_id: Some(outcome.item_id),
                derived_index: Some(outcome.derived_index),
                commitment: record.commitment,
                catalog: record.table,
                settled_at: Some(outcome.settled_at),
            },
            None => Self {
                payment_id: record.payment_id,
                box_id: record.box_id,
                item_id: None,
                derived_index: None,
                commitment: record.commitment.sealed(),
                catalog: record.table,
                settled_at: None,
            },
        }
    }

    /// Has the draw been settled?
    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }

    /// Draw result as disclosed, once settled.
    pub fn to_draw_result(&self) -> Option<DrawResult> {
        Some(DrawResult {
            payment_id: self.payment_id.clone(),
            item_id: self.item_id.clone()?,
            commitment: self.commitment.clone(),
            derived_index: self.derived_index?,
            timestamp: self.settled_at?,
        })
    }
}

/// Transparency query failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransparencyError {
    /// No archived draw for the payment.
    #[error("no draw archived for payment {0}")]
    NotFound(PaymentId),

    /// Draw exists but has not been settled.
    #[error("draw for payment {0} is not settled yet")]
    NotSettled(PaymentId),

    /// Archive could not be read.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Draw failed verification.
    #[error("verification failed: {0}")]
    Fairness(#[from] FairnessError),
}

/// One draw that failed the audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    /// Payment.
    pub payment_id: PaymentId,
    /// Failure description.
    pub reason: String,
}

/// Result of auditing a set of draws.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Number of payments examined.
    pub checked: usize,
    /// Draws that re-derived exactly.
    pub verified: Vec<VerifiedDraw>,
    /// Payments still awaiting settlement.
    pub pending: Vec<PaymentId>,
    /// Draws that did not verify.
    pub failures: Vec<AuditFailure>,
}

impl AuditReport {
    /// True when no draw failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Read-only transparency service.
pub struct TransparencyQueryService {
    archive: Arc<dyn DrawArchive>,
}

impl TransparencyQueryService {
    /// Create a service over an archive.
    pub fn new(archive: Arc<dyn DrawArchive>) -> Self {
        Self { archive }
    }

    /// Disclose the draw for a payment.
    pub async fn fetch_draw(&self, payment_id: &PaymentId) -> Result<DrawDisclosure, TransparencyError> {
        let record = self
            .archive
            .find_draw(payment_id)
            .await?
            .ok_or_else(|| TransparencyError::NotFound(payment_id.clone()))?;

        Ok(DrawDisclosure::from_archive(record))
    }

    /// Re-run the full fairness check on a settled draw.
    pub async fn verify_draw(&self, payment_id: &PaymentId) -> Result<VerifiedDraw, TransparencyError> {
        let disclosure = self.fetch_draw(payment_id).await?;
        let draw = disclosure
            .to_draw_result()
            .ok_or_else(|| TransparencyError::NotSettled(payment_id.clone()))?;

        let verified = verify_draw(&draw, &disclosure.catalog)?;
        debug!(payment = %payment_id, item = %verified.item_id, "Draw verified");
        Ok(verified)
    }

    /// Verify the given draws, or every archived draw when `None`.
    pub async fn audit(&self, payment_ids: Option<Vec<PaymentId>>) -> Result<AuditReport, TransparencyError> {
        let payment_ids = match payment_ids {
            Some(ids) => ids,
            None => self.archive.list_payment_ids().await?,
        };

        let results = join_all(payment_ids.iter().map(|id| self.verify_draw(id))).await;

        let mut report = AuditReport {
            checked: payment_ids.len(),
            ..Default::default()
        };

        for (payment_id, result) in payment_ids.into_iter().zip(results) {
            match result {
                Ok(verified) => report.verified.push(verified),
                Err(TransparencyError::NotSettled(_)) => report.pending.push(payment_id),
                Err(TransparencyError::Archive(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(payment = %payment_id, error = %e, "Draw failed audit");
                    report.failures.push(AuditFailure {
                        payment_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            checked = report.checked,
            verified = report.verified.len(),
            pending = report.pending.len(),
            failures = report.failures.len(),
            "Audit complete"
        );
        Ok(report)
    }
}
