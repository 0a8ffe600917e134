//! Purchase Errors
//!
//! Everything a purchase can end with, and how each failure reaches the
//! user.

use crate::external::account::AccountError;
use crate::external::catalog::CatalogError;
use crate::external::gateway::GatewayError;
use crate::external::notifier::{Notice, NoticeKind};
use crate::fairness::verify::FairnessError;
use crate::purchase::types::{Amount, PaymentId, PurchaseId};
use crate::reveal::machine::RevealError;
use crate::settlement::poller::ExpiryReason;

/// Purchase failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseError {
    /// Gateway refused or failed to create the payment.
    #[error("payment creation failed: {0}")]
    PaymentCreationFailed(GatewayError),

    /// Payment expired before approval.
    #[error("payment expired: {reason}")]
    SettlementTimeout {
        /// Local deadline or provider report.
        reason: ExpiryReason,
    },

    /// Provider cancelled the payment.
    #[error("payment cancelled by provider")]
    SettlementCancelled,

    /// Draw arrived for another payment.
    #[error("draw for payment {got} arrived for payment {expected}")]
    DrawMismatch {
        /// Purchase's payment.
        expected: PaymentId,
        /// Payment named by the draw.
        got: PaymentId,
    },

    /// Provider approved a different amount than was charged for.
    #[error("provider approved {approved}, expected {expected}")]
    AmountMismatch {
        /// Payment amount.
        expected: Amount,
        /// Amount in the approval report.
        approved: Amount,
    },

    /// Draw does not match its commitment.
    #[error("draw failed fairness verification: {0}")]
    FairnessVerificationFailed(FairnessError),

    /// Box listing could not be loaded.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(CatalogError),

    /// Balance write failed.
    #[error("account update failed: {0}")]
    AccountUpdateFailed(AccountError),

    /// Reveal session refused the transition.
    #[error("reveal refused: {0}")]
    InvalidTransition(RevealError),
}

impl PurchaseError {
    /// Can the user simply try again?
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PaymentCreationFailed(_)
                | Self::SettlementTimeout { .. }
                | Self::SettlementCancelled
                | Self::CatalogUnavailable(_)
        )
    }

    /// How the failure is presented.
    ///
    /// Integrity failures must be acknowledged; the rest are dismissible.
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            Self::DrawMismatch { .. }
            | Self::AmountMismatch { .. }
            | Self::FairnessVerificationFailed(_) => NoticeKind::AcknowledgementRequired,
            other => NoticeKind::Dismissible {
                retry: other.is_recoverable(),
            },
        }
    }

    /// User notice for a purchase.
    pub fn notice(&self, purchase_id: PurchaseId) -> Notice {
        let message = match self {
            Self::SettlementTimeout { .. } => "Payment expired before it was confirmed. You were not charged.".to_string(),
            Self::SettlementCancelled => "Payment was cancelled. You were not charged.".to_string(),
            Self::DrawMismatch { .. } | Self::FairnessVerificationFailed(_) => {
                format!("We could not verify this draw ({}). Please contact support.", self)
            }
            Self::AmountMismatch { .. } => {
                format!("We could not confirm this payment ({}). Please contact support.", self)
            }
            other => other.to_string(),
        };

        Notice {
            purchase_id,
            kind: self.notice_kind(),
            message,
        }
    }
}

impl From<RevealError> for PurchaseError {
    fn from(err: RevealError) -> Self {
        match err {
            RevealError::DrawMismatch { expected, got } => Self::DrawMismatch { expected, got },
            other => Self::InvalidTransition(other),
        }
    }
}

impl From<FairnessError> for PurchaseError {
    fn from(err: FairnessError) -> Self {
        Self::FairnessVerificationFailed(err)
    }
}
