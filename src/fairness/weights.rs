//! Weighted Item Selection
//!
//! Maps a commitment hash onto a box's item table. The first 8 hex
//! characters of the hash (a big-endian `u32`) are reduced modulo the
//! table's total weight, and the roll is located in the cumulative
//! weight table.

use serde::{Serialize, Deserialize};

use crate::core::hash::decode_digest;
use crate::fairness::verify::FairnessError;
use crate::purchase::types::ItemId;

/// Hex characters of the hash consumed by [`derive_index`].
pub const INDEX_PREFIX_HEX_LEN: usize = 8;

/// One entry of a box's probability table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedItem {
    /// Catalog item.
    pub item_id: ItemId,
    /// Relative weight (non-zero).
    pub weight: u32,
}

impl WeightedItem {
    /// Create an entry.
    pub fn new(item_id: impl Into<ItemId>, weight: u32) -> Self {
        Self {
            item_id: item_id.into(),
            weight,
        }
    }
}

/// Ordered item table with precomputed cumulative weights.
///
/// Order is significant: the same items in a different order select
/// differently for the same hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<WeightedItem>", into = "Vec<WeightedItem>")]
pub struct WeightTable {
    items: Vec<WeightedItem>,
    cumulative: Vec<u64>,
}

impl WeightTable {
    /// Build a table, rejecting empty tables, zero weights and duplicates.
    pub fn new(items: Vec<WeightedItem>) -> Result<Self, FairnessError> {
        if items.is_empty() {
            return Err(FairnessError::EmptyTable);
        }

        let mut cumulative = Vec::with_capacity(items.len());
        let mut running = 0u64;

        for (idx, item) in items.iter().enumerate() {
            if item.weight == 0 {
                return Err(FairnessError::ZeroWeight(item.item_id.clone()));
            }
            if items[..idx].iter().any(|other| other.item_id == item.item_id) {
                return Err(FairnessError::DuplicateItem(item.item_id.clone()));
            }
            running += u64::from(item.weight);
            cumulative.push(running);
        }

        Ok(Self { items, cumulative })
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in table order.
    pub fn items(&self) -> &[WeightedItem] {
        &self.items
    }

    /// Item at an index.
    pub fn item_at(&self, index: usize) -> Option<&ItemId> {
        self.items.get(index).map(|item| &item.item_id)
    }

    /// Index selected by a roll in `[0, total_weight)`.
    ///
    /// Rolls at or past the total clamp to the last item.
    pub fn select(&self, roll: u64) -> usize {
        let idx = self.cumulative.partition_point(|&bound| bound <= roll);
        idx.min(self.items.len() - 1)
    }
}

impl TryFrom<Vec<WeightedItem>> for WeightTable {
    type Error = FairnessError;

    fn try_from(items: Vec<WeightedItem>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl From<WeightTable> for Vec<WeightedItem> {
    fn from(table: WeightTable) -> Self {
        table.items
    }
}

/// Big-endian `u32` from the first [`INDEX_PREFIX_HEX_LEN`] hex characters
/// of a digest.
pub fn hash_prefix(hash_hex: &str) -> Result<u32, FairnessError> {
    let digest = decode_digest(hash_hex)
        .ok_or_else(|| FairnessError::MalformedHash(hash_hex.to_string()))?;
    let mut prefix = [0u8; INDEX_PREFIX_HEX_LEN / 2];
    prefix.copy_from_slice(&digest[..INDEX_PREFIX_HEX_LEN / 2]);
    Ok(u32::from_be_bytes(prefix))
}

/// Roll in `[0, total_weight)` for a hash.
pub fn derive_roll(hash_hex: &str, table: &WeightTable) -> Result<u64, FairnessError> {
    Ok(u64::from(hash_prefix(hash_hex)?) % table.total_weight())
}

/// Index in `[0, table.len())` selected by a hash.
///
/// Pure and deterministic: anyone holding the hash and the table gets
/// the same answer.
pub fn derive_index(hash_hex: &str, table: &WeightTable) -> Result<usize, FairnessError> {
    Ok(table.select(derive_roll(hash_hex, table)?))
}

/// Index and item selected by a hash.
pub fn derive_item<'a>(
    hash_hex: &str,
    table: &'a WeightTable,
) -> Result<(usize, &'a ItemId), FairnessError> {
    let index = derive_index(hash_hex, table)?;
    let item = table.item_at(index).ok_or(FairnessError::EmptyTable)?;
    Ok((index, item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fairness::commitment::compute_hash;
    use proptest::prelude::*;

    fn table() -> WeightTable {
        WeightTable::new(vec![
            WeightedItem::new("common", 70),
            WeightedItem::new("rare", 25),
            WeightedItem::new("legendary", 5),
        ])
        .unwrap()
    }

    fn hash_with_prefix(prefix: &str) -> String {
        format!("{}{}", prefix, "0".repeat(64 - prefix.len()))
    }

    #[test]
    fn test_table_rejects_invalid() {
        assert!(matches!(WeightTable::new(vec![]), Err(FairnessError::EmptyTable)));
        assert!(matches!(
            WeightTable::new(vec![WeightedItem::new("a", 0)]),
            Err(FairnessError::ZeroWeight(_))
        ));
        assert!(matches!(
            WeightTable::new(vec![WeightedItem::new("a", 1), WeightedItem::new("a", 2)]),
            Err(FairnessError::DuplicateItem(_))
        ));
    }

    #[test]
    fn test_select_boundaries() {
        let table = table();
        assert_eq!(table.total_weight(), 100);
        assert_eq!(table.select(0), 0);
        assert_eq!(table.select(69), 0);
        assert_eq!(table.select(70), 1);
        assert_eq!(table.select(94), 1);
        assert_eq!(table.select(95), 2);
        assert_eq!(table.select(99), 2);
        assert_eq!(table.select(1_000), 2);
    }

    #[test]
    fn test_hash_prefix_parses_first_eight_chars() {
        let hash = hash_with_prefix("0000002a");
        assert_eq!(hash_prefix(&hash).unwrap(), 42);

        let hash = hash_with_prefix("FFFFFFFF");
        assert_eq!(hash_prefix(&hash).unwrap(), u32::MAX);
    }

    #[test]
    fn test_hash_prefix_reads_only_the_prefix() {
        let base = hash_with_prefix("12345678");
        let tail_changed = format!("{}{}", &base[..INDEX_PREFIX_HEX_LEN], "f".repeat(64 - INDEX_PREFIX_HEX_LEN));
        assert_eq!(hash_prefix(&base).unwrap(), hash_prefix(&tail_changed).unwrap());

        let prefix_changed = hash_with_prefix("12345679");
        assert_ne!(hash_prefix(&base).unwrap(), hash_prefix(&prefix_changed).unwrap());
    }

    #[test]
    fn test_hash_prefix_rejects_malformed() {
        assert!(matches!(hash_prefix("0000002a"), Err(FairnessError::MalformedHash(_))));
    }

    #[test]
    fn test_derive_uses_total_weight_not_item_count() {
        let table = table();
        // 75 % 100 = 75 -> rare. Modulo item count (3) would give 0.
        let hash = hash_with_prefix("0000004b");
        assert_eq!(derive_roll(&hash, &table).unwrap(), 75);
        assert_eq!(derive_index(&hash, &table).unwrap(), 1);

        let (index, item) = derive_item(&hash, &table).unwrap();
        assert_eq!(index, 1);
        assert_eq!(item.as_str(), "rare");
    }

    #[test]
    fn test_table_serde_validates() {
        let json = serde_json::to_string(&table()).unwrap();
        let back: WeightTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table());
        assert_eq!(back.total_weight(), 100);

        let bad = r#"[{"item_id":"a","weight":0}]"#;
        assert!(serde_json::from_str::<WeightTable>(bad).is_err());
    }

    proptest! {
        #[test]
        fn prop_derive_index_deterministic_and_in_range(
            server in "[a-z0-9]{1,32}",
            client in "[a-z0-9]{1,32}",
            weights in prop::collection::vec(1u32..1_000, 1..12),
        ) {
            let items = weights
                .iter()
                .enumerate()
                .map(|(i, w)| WeightedItem::new(format!("item-{}", i).as_str(), *w))
                .collect();
            let table = WeightTable::new(items).unwrap();
            let hash = compute_hash(&server, &client);

            let first = derive_index(&hash, &table).unwrap();
            let second = derive_index(&hash, &table).unwrap();

            prop_assert_eq!(first, second);
            prop_assert!(first < table.len());
        }
    }
}
