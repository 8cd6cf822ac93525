use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use super::purchase_order::{OrderUnit, PurchaseOrderItem};

/// Whether every positive line of a receipt has reached inventory.
///
/// A `pending` receipt is not committed: its order stays `sent` until the
/// stock step finishes, possibly through a compensating retry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockStatus {
    Pending,
    Applied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReceiptItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: OrderUnit,
    pub ordered_quantity: u32,
    pub received_quantity: u32,
    pub unit_cost: Decimal,
    pub is_complete: bool,
    pub line_total: Decimal,
    pub stock_applied: bool,
}

impl ReceiptItem {
    pub fn new(ordered: &PurchaseOrderItem, received_quantity: u32, unit_cost: Decimal) -> Self {
        Self {
            product_id: ordered.product_id,
            product_name: ordered.product_name.clone(),
            unit: ordered.unit,
            ordered_quantity: ordered.quantity,
            received_quantity,
            unit_cost,
            is_complete: received_quantity == ordered.quantity,
            line_total: unit_cost * Decimal::from(received_quantity),
            stock_applied: false,
        }
    }

    pub fn needs_stock(&self) -> bool {
        self.received_quantity > 0 && !self.stock_applied
    }

    /// Key handed to the inventory service so a retried increment is not applied twice.
    pub fn stock_reference(&self, receipt_id: Uuid) -> String {
        format!("{}:{}", receipt_id, self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductReceipt {
    pub id: Uuid,
    pub receipt_number: String,
    pub purchase_order_id: Uuid,
    pub order_number: String,
    pub items: Vec<ReceiptItem>,
    pub received_at: DateTime<Utc>,
    pub received_by: String,
    pub notes: Option<String>,
    pub stock_status: StockStatus,
    pub version: i64,
}

impl ProductReceipt {
    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(|item| item.line_total).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.is_complete)
    }

    pub fn is_committed(&self) -> bool {
        self.stock_status == StockStatus::Applied
    }

    pub fn pending_stock_lines(&self) -> impl Iterator<Item = &ReceiptItem> {
        self.items.iter().filter(|item| item.needs_stock())
    }

    pub fn mark_line_applied(&mut self, product_id: Uuid) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
        {
            item.stock_applied = true;
        }
        if self.pending_stock_lines().next().is_none() {
            self.stock_status = StockStatus::Applied;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ordered(quantity: u32) -> PurchaseOrderItem {
        PurchaseOrderItem {
            product_id: Uuid::new_v4(),
            product_name: "Arroz 1kg".into(),
            quantity,
            unit: OrderUnit::Sack,
            unit_equivalence: None,
            equivalence_unit: None,
            unit_cost: None,
        }
    }

    #[test]
    fn completeness_follows_quantities() {
        let full = ReceiptItem::new(&ordered(10), 10, dec!(2.50));
        let short = ReceiptItem::new(&ordered(5), 3, dec!(9.00));
        let none = ReceiptItem::new(&ordered(5), 0, dec!(9.00));
        assert!(full.is_complete);
        assert!(!short.is_complete);
        assert!(!none.is_complete);
        assert_eq!(full.line_total, dec!(25.00));
        assert_eq!(short.line_total, dec!(27.00));
        assert!(!none.needs_stock());
    }

    #[test]
    fn receipt_commits_when_last_line_applied() {
        let a = ReceiptItem::new(&ordered(10), 10, dec!(1));
        let b = ReceiptItem::new(&ordered(4), 2, dec!(1));
        let zero = ReceiptItem::new(&ordered(4), 0, dec!(1));
        let (pa, pb) = (a.product_id, b.product_id);
        let mut receipt = ProductReceipt {
            id: Uuid::new_v4(),
            receipt_number: "REC-1".into(),
            purchase_order_id: Uuid::new_v4(),
            order_number: "PO-1".into(),
            items: vec![a, b, zero],
            received_at: Utc::now(),
            received_by: "u-1".into(),
            notes: None,
            stock_status: StockStatus::Pending,
            version: 0,
        };
        assert_eq!(receipt.pending_stock_lines().count(), 2);
        receipt.mark_line_applied(pa);
        assert!(!receipt.is_committed());
        receipt.mark_line_applied(pb);
        assert!(receipt.is_committed());
        assert_eq!(receipt.total_cost(), dec!(12));
        assert!(!receipt.is_complete());
    }
}
