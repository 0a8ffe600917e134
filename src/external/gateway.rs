//! Payment Gateway Interface
//!
//! The gateway creates payments and reports their settlement status. On
//! approval the report carries the draw the authority made for it.

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::purchase::types::{Amount, DrawResult, Payment, PaymentId, PaymentStatus, PurchaseIntent};

/// One status check response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Provider-side status.
    pub status: PaymentStatus,
    /// Settled amount, once approved.
    pub approved_amount: Option<Amount>,
    /// Draw made at approval.
    pub draw: Option<DrawResult>,
}

impl StatusReport {
    /// Report with no settlement payload.
    pub fn with_status(status: PaymentStatus) -> Self {
        Self {
            status,
            approved_amount: None,
            draw: None,
        }
    }

    /// Approval report carrying the draw.
    pub fn approved(amount: Amount, draw: DrawResult) -> Self {
        Self {
            status: PaymentStatus::Approved,
            approved_amount: Some(amount),
            draw: Some(draw),
        }
    }
}

/// Gateway failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Gateway refused to create the payment.
    #[error("payment rejected: {0}")]
    Rejected(String),

    /// Gateway does not know the payment.
    #[error("unknown payment {0}")]
    UnknownPayment(PaymentId),

    /// Gateway could not be reached or answered garbage.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment for an intent.
    ///
    /// The returned payment is pending and carries the draw
    /// pre-commitment hash.
    async fn create_payment(&self, intent: &PurchaseIntent) -> Result<Payment, GatewayError>;

    /// Query the current status of a payment.
    async fn payment_status(&self, payment_id: &PaymentId) -> Result<StatusReport, GatewayError>;
}
