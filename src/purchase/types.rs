//! Purchase Data Model
//!
//! Identifiers, intents, payments and draw results shared across the
//! pipeline. All timestamps are absolute UTC.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::fairness::commitment::DrawCommitment;

/// Amount in minor currency units (cents).
pub type Amount = u64;

/// Identifier of one `buy` call.
pub type PurchaseId = uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Loot box identifier.
    BoxId
);
string_id!(
    /// User identifier.
    UserId
);
string_id!(
    /// Payment identifier assigned by the gateway.
    PaymentId
);
string_id!(
    /// Catalog item identifier.
    ItemId
);

/// A user's intent to buy one box.
///
/// Immutable; consumed by payment creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    /// Box being bought.
    pub box_id: BoxId,
    /// Catalog price when the intent was created.
    pub price_at_intent: Amount,
    /// Buyer.
    pub user_id: UserId,
    /// Client contribution to the draw commitment.
    pub client_seed: String,
}

impl PurchaseIntent {
    /// Create an intent with a fresh random client seed.
    pub fn new(user_id: UserId, box_id: BoxId, price_at_intent: Amount) -> Self {
        Self {
            box_id,
            price_at_intent,
            user_id,
            client_seed: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Payment settlement status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting settlement.
    Pending,
    /// Settled; the draw has been made.
    Approved,
    /// Provider expired the payment.
    Expired,
    /// Provider cancelled the payment.
    Cancelled,
}

impl PaymentStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A payment created by the gateway for one intent.
///
/// `status` is private: only the settlement poller moves it, and a
/// terminal status is frozen. Deserializing checks the window the same
/// way [`Payment::new`] does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaymentRecord")]
pub struct Payment {
    /// Gateway payment id.
    pub payment_id: PaymentId,
    status: PaymentStatus,
    /// Charged amount.
    pub amount: Amount,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Absolute settlement deadline.
    pub expires_at: DateTime<Utc>,
    /// Provider-side reference (e.g. a payment code).
    pub provider_reference: String,
    /// Draw pre-commitment published at creation.
    pub commitment_hash: Option<String>,
}

impl Payment {
    /// Create a pending payment.
    pub fn new(
        payment_id: PaymentId,
        amount: Amount,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        provider_reference: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        if expires_at <= created_at {
            return Err(PaymentError::InvalidWindow { created_at, expires_at });
        }

        Ok(Self {
            payment_id,
            status: PaymentStatus::Pending,
            amount,
            created_at,
            expires_at,
            provider_reference: provider_reference.into(),
            commitment_hash: None,
        })
    }

    /// Attach the published draw pre-commitment.
    pub fn with_commitment(mut self, commitment_hash: impl Into<String>) -> Self {
        self.commitment_hash = Some(commitment_hash.into());
        self
    }

    /// Current status.
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Has the payment reached a terminal status?
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time left until `expires_at`, saturating at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Apply a provider-reported status.
    ///
    /// Returns whether the status changed. Re-applying the current status
    /// is a no-op; moving away from a terminal status is refused.
    pub(crate) fn apply_status(&mut self, status: PaymentStatus) -> Result<bool, PaymentError> {
        if self.status == status {
            return Ok(false);
        }
        if self.status.is_terminal() {
            return Err(PaymentError::AlreadyTerminal {
                current: self.status,
                requested: status,
            });
        }
        self.status = status;
        Ok(true)
    }
}

/// Wire shape of a [`Payment`] before validation.
#[derive(Deserialize)]
struct PaymentRecord {
    payment_id: PaymentId,
    status: PaymentStatus,
    amount: Amount,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    provider_reference: String,
    #[serde(default)]
    commitment_hash: Option<String>,
}

impl TryFrom<PaymentRecord> for Payment {
    type Error = PaymentError;

    fn try_from(record: PaymentRecord) -> Result<Self, Self::Error> {
        let mut payment = Payment::new(
            record.payment_id,
            record.amount,
            record.created_at,
            record.expires_at,
            record.provider_reference,
        )?;
        payment.status = record.status;
        payment.commitment_hash = record.commitment_hash;
        Ok(payment)
    }
}

/// Payment invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// `expires_at` must be after `created_at`.
    #[error("payment expires at {expires_at} which is not after creation at {created_at}")]
    InvalidWindow {
        /// Creation time.
        created_at: DateTime<Utc>,
        /// Requested expiry.
        expires_at: DateTime<Utc>,
    },

    /// Terminal statuses are immutable.
    #[error("payment already {current}, cannot move to {requested}")]
    AlreadyTerminal {
        /// Frozen status.
        current: PaymentStatus,
        /// Rejected status.
        requested: PaymentStatus,
    },
}

/// The server-side draw for one approved payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    /// Payment the draw belongs to.
    pub payment_id: PaymentId,
    /// Won item.
    pub item_id: ItemId,
    /// Seeds and hash the draw was derived from.
    pub commitment: DrawCommitment,
    /// Index into the box's weight table.
    pub derived_index: usize,
    /// When the draw was made.
    pub timestamp: DateTime<Utc>,
}
