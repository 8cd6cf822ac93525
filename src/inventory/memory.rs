use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use super::{InventoryClient, InventoryClientError};

/// Process-local stock levels. Products must be registered before they can be
/// incremented so that an unknown id surfaces the same way it would remotely.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    levels: DashMap<Uuid, i64>,
    applied: DashSet<String>,
    strict: bool,
}

impl InMemoryInventory {
    /// Accepts any product id, starting unknown products at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects products that were never registered with [`Self::set_level`].
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn set_level(&self, product_id: Uuid, level: i64) {
        self.levels.insert(product_id, level);
    }

    pub fn level(&self, product_id: Uuid) -> i64 {
        self.levels.get(&product_id).map(|l| *l).unwrap_or(0)
    }

    pub fn applied_references(&self) -> usize {
        self.applied.len()
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventory {
    async fn increase_stock(
        &self,
        product_id: Uuid,
        quantity: u32,
        reference: &str,
    ) -> Result<i64, InventoryClientError> {
        if self.strict && !self.levels.contains_key(&product_id) {
            return Err(InventoryClientError::UnknownProduct(product_id));
        }
        let mut level = self.levels.entry(product_id).or_insert(0);
        // the entry guard serializes increments per product, so the
        // reference check and the add happen together
        if self.applied.insert(reference.to_string()) {
            *level += i64::from(quantity);
        }
        Ok(*level)
    }
}
