use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use super::supplier::Supplier;
use crate::context::Actor;
use crate::errors::ServiceError;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Received | Self::Cancelled)
    }

    /// `draft -> sent -> received`, `draft|sent -> cancelled`. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Received) | (Draft, Cancelled) | (Sent, Cancelled)
        )
    }
}

/// Packaging vocabulary used on purchase order lines.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderUnit {
    Piece,
    Box,
    Package,
    Bottle,
    Liter,
    Kilogram,
    Sack,
    Drum,
    Display,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderItem {
    pub product_id: Uuid,
    /// Captured when the order is created; later catalog renames do not touch it.
    pub product_name: String,
    pub quantity: u32,
    pub unit: OrderUnit,
    /// "1 box = 24 bottles" is `unit = box, unit_equivalence = 24, equivalence_unit = bottle`.
    pub unit_equivalence: Option<u32>,
    pub equivalence_unit: Option<OrderUnit>,
    pub unit_cost: Option<Decimal>,
}

impl PurchaseOrderItem {
    /// Quantity expressed in the equivalence unit, or in `unit` when no conversion is set.
    pub fn base_quantity(&self) -> u64 {
        u64::from(self.quantity) * u64::from(self.unit_equivalence.unwrap_or(1))
    }

    pub fn estimated_cost(&self) -> Option<Decimal> {
        self.unit_cost
            .map(|cost| cost * Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub order_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub items: Vec<PurchaseOrderItem>,
    pub notes: Option<String>,
    pub status: PurchaseOrderStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub version: i64,
}

impl PurchaseOrder {
    pub fn new(
        order_number: String,
        supplier: &Supplier,
        notes: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_number,
            supplier_id: supplier.id,
            supplier_name: supplier.name.clone(),
            items: Vec::new(),
            notes,
            status: PurchaseOrderStatus::Draft,
            created_at: now,
            created_by: actor.id.clone(),
            sent_at: None,
            sent_by: None,
            received_at: None,
            received_by: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            version: 0,
        }
    }

    pub fn item(&self, product_id: Uuid) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Adds a line unless the product is already on the order. Returns whether a line was added.
    pub fn add_item(&mut self, item: PurchaseOrderItem) -> bool {
        if self.item(item.product_id).is_some() {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn estimated_total(&self) -> Decimal {
        self.items
            .iter()
            .filter_map(PurchaseOrderItem::estimated_cost)
            .sum()
    }

    pub fn send(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<(), ServiceError> {
        self.transition(PurchaseOrderStatus::Sent, "send")?;
        self.sent_at = Some(self.monotonic(now));
        self.sent_by = Some(actor.id.clone());
        Ok(())
    }

    pub fn cancel(
        &mut self,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(PurchaseOrderStatus::Cancelled, "cancel")?;
        self.cancelled_at = Some(self.monotonic(now));
        self.cancelled_by = Some(actor.id.clone());
        self.cancellation_reason = reason;
        Ok(())
    }

    /// Only the receiving engine calls this.
    pub(crate) fn mark_received(
        &mut self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.transition(PurchaseOrderStatus::Received, "receive")?;
        self.received_at = Some(self.monotonic(now));
        self.received_by = Some(actor.id.clone());
        Ok(())
    }

    fn transition(
        &mut self,
        next: PurchaseOrderStatus,
        action: &'static str,
    ) -> Result<(), ServiceError> {
        if !self.status.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition {
                entity: "purchase order",
                id: self.id,
                action,
                current: self.status.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Lifecycle timestamps never go backwards, even if the clock does.
    fn monotonic(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        [Some(self.created_at), self.sent_at]
            .into_iter()
            .flatten()
            .fold(now, |acc, ts| acc.max(ts))
    }

    pub fn matches(&self, filter: &PurchaseOrderFilter) -> bool {
        if let Some(status) = filter.status {
            if self.status != status {
                return false;
            }
        }
        match filter.search_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let needle = text.to_lowercase();
                self.order_number.to_lowercase().contains(&needle)
                    || self.supplier_name.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub search_text: Option<String>,
}

/// Snapshot of a filtered order list. Iterating is finite and can be restarted.
#[derive(Debug, Clone)]
pub struct PurchaseOrderListing {
    orders: std::sync::Arc<[PurchaseOrder]>,
}

impl PurchaseOrderListing {
    pub fn new(mut orders: Vec<PurchaseOrder>) -> Self {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self {
            orders: orders.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PurchaseOrder> {
        self.orders.iter()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn to_vec(&self) -> Vec<PurchaseOrder> {
        self.orders.to_vec()
    }
}

impl<'a> IntoIterator for &'a PurchaseOrderListing {
    type Item = &'a PurchaseOrder;
    type IntoIter = std::slice::Iter<'a, PurchaseOrder>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
