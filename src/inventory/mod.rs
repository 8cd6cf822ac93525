//! Inventory collaborator. Receiving credits stock through this seam; the
//! catalog and stock ledger themselves live in another service.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use http::HttpInventoryClient;
pub use memory::InMemoryInventory;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryClientError {
    #[error("unknown product {0}")]
    UnknownProduct(Uuid),
    #[error("inventory service timed out")]
    Timeout,
    #[error("inventory service unavailable: {0}")]
    Unavailable(String),
    #[error("inventory service rejected the update: {0}")]
    Rejected(String),
}

impl InventoryClientError {
    /// Transport-level trouble, as opposed to the service answering "no".
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Adds `quantity` units of `product_id` and returns the new stock level.
    ///
    /// `reference` identifies the increment; implementations must apply a
    /// given reference at most once and answer a repeat with the current level.
    async fn increase_stock(
        &self,
        product_id: Uuid,
        quantity: u32,
        reference: &str,
    ) -> Result<i64, InventoryClientError>;
}
