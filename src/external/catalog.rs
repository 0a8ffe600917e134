//! Catalog Interface
//!
//! Supplies, per box, its price and ordered probability table.

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::fairness::weights::WeightTable;
use crate::purchase::types::{Amount, BoxId};

/// Price and item table for one box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxListing {
    /// Box identifier.
    pub box_id: BoxId,
    /// Current price.
    pub price: Amount,
    /// Ordered item weights.
    pub table: WeightTable,
}

/// Catalog failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No such box.
    #[error("unknown box {0}")]
    UnknownBox(BoxId),

    /// Catalog backend failed.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only catalog source.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Listing for a box.
    async fn box_listing(&self, box_id: &BoxId) -> Result<BoxListing, CatalogError>;
}
