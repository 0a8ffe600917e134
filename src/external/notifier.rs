//! User Notices
//!
//! Failures reach the user as notices. Recoverable failures are
//! dismissible and offer a retry; integrity anomalies must be
//! acknowledged.

use serde::{Serialize, Deserialize};
use tracing::{error, info};

use crate::purchase::types::PurchaseId;

/// How a notice may be dismissed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeKind {
    /// User may dismiss it; `retry` offers a fresh purchase.
    Dismissible {
        /// Show a retry action.
        retry: bool,
    },
    /// Trust-sensitive; user must acknowledge it explicitly.
    AcknowledgementRequired,
}

/// One user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Purchase the notice is about.
    pub purchase_id: PurchaseId,
    /// Dismissal behavior.
    pub kind: NoticeKind,
    /// Message text.
    pub message: String,
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    /// Deliver a notice.
    fn notify(&self, notice: Notice);
}

/// Notifier that writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Dismissible { retry } => {
                info!(purchase = %notice.purchase_id, retry, "{}", notice.message);
            }
            NoticeKind::AcknowledgementRequired => {
                error!(purchase = %notice.purchase_id, "{}", notice.message);
            }
        }
    }
}
