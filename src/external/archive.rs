//! Draw Archive Interface
//!
//! Server-side record of every commitment and, once settled, the draw
//! made from it. The transparency service only ever reads it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::fairness::commitment::DrawCommitment;
use crate::fairness::weights::WeightTable;
use crate::purchase::types::{BoxId, DrawResult, ItemId, PaymentId};

/// Settled part of an archived draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    /// Won item.
    pub item_id: ItemId,
    /// Index into the archived table.
    pub derived_index: usize,
    /// When the payment settled.
    pub settled_at: DateTime<Utc>,
}

/// Archive record for one payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedDraw {
    /// Payment the commitment belongs to.
    pub payment_id: PaymentId,
    /// Box bought.
    pub box_id: BoxId,
    /// Commitment, including the server-held seed.
    pub commitment: DrawCommitment,
    /// Weight table in force when the commitment was made.
    pub table: WeightTable,
    /// Present once the payment was approved.
    pub outcome: Option<DrawOutcome>,
}

impl ArchivedDraw {
    /// Has the draw been settled?
    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Rebuild the draw result for a settled record.
    pub fn to_draw_result(&self) -> Option<DrawResult> {
        let outcome = self.outcome.as_ref()?;
        Some(DrawResult {
            payment_id: self.payment_id.clone(),
            item_id: outcome.item_id.clone(),
            commitment: self.commitment.clone(),
            derived_index: outcome.derived_index,
            timestamp: outcome.settled_at,
        })
    }
}

/// Archive failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    /// Backend could not be read.
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("archive corrupt: {0}")]
    Corrupt(String),

    /// No record for the payment.
    #[error("no record for payment {0}")]
    Missing(PaymentId),

    /// Write conflicts with an existing record.
    #[error("conflicting record for payment {0}")]
    Conflict(PaymentId),
}

/// Read access to archived draws.
#[async_trait]
pub trait DrawArchive: Send + Sync {
    /// Record for a payment, if any.
    async fn find_draw(&self, payment_id: &PaymentId) -> Result<Option<ArchivedDraw>, ArchiveError>;

    /// Every archived payment id, in id order.
    async fn list_payment_ids(&self) -> Result<Vec<PaymentId>, ArchiveError>;
}
