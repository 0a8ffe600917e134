//! Account Store Interface
//!
//! Narrow capability handed to the orchestrator. Synchronous so the
//! settlement write can happen inside the session's critical section.

use crate::purchase::types::{Amount, UserId};

/// Account failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// No account for the user.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// Debit larger than the balance.
    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account owner.
        user: UserId,
        /// Balance before the debit.
        balance: Amount,
        /// Requested debit.
        requested: Amount,
    },

    /// Credit would overflow the balance.
    #[error("balance overflow for {0}")]
    Overflow(UserId),
}

/// User balance store.
pub trait AccountStore: Send + Sync {
    /// Add to a balance, returning the new balance.
    fn credit(&self, user: &UserId, amount: Amount) -> Result<Amount, AccountError>;

    /// Subtract from a balance, returning the new balance.
    fn debit(&self, user: &UserId, amount: Amount) -> Result<Amount, AccountError>;

    /// Current balance.
    fn balance(&self, user: &UserId) -> Result<Amount, AccountError>;
}
