use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{ProcurementSettings, SupplierDirectory};
use crate::auth::{consts, ensure_allowed, Authorizer};
use crate::context::{Actor, Clock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::{
    OrderUnit, PurchaseOrder, PurchaseOrderFilter, PurchaseOrderItem, PurchaseOrderListing,
    PurchaseOrderStatus,
};
use crate::numbering::NumberGenerator;
use crate::repositories::{PurchaseOrderRepository, ReceiptRepository};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewPurchaseOrder {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<NewOrderItem>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub product_name: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub unit: OrderUnit,
    #[validate(range(min = 1))]
    pub unit_equivalence: Option<u32>,
    pub equivalence_unit: Option<OrderUnit>,
    pub unit_cost: Option<Decimal>,
}

impl NewOrderItem {
    fn into_item(self) -> Result<PurchaseOrderItem, ServiceError> {
        self.validate()?;
        if self.unit_equivalence.is_some() != self.equivalence_unit.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Product {}: unit equivalence and equivalence unit must be given together",
                self.product_id
            )));
        }
        if matches!(self.unit_cost, Some(cost) if cost < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(format!(
                "Product {}: unit cost cannot be negative",
                self.product_id
            )));
        }
        Ok(PurchaseOrderItem {
            product_id: self.product_id,
            product_name: self.product_name.trim().to_string(),
            quantity: self.quantity,
            unit: self.unit,
            unit_equivalence: self.unit_equivalence,
            equivalence_unit: self.equivalence_unit,
            unit_cost: self.unit_cost,
        })
    }
}

/// Owns the purchase order lifecycle up to the point of receiving.
pub struct PurchaseOrderManager {
    orders: Arc<dyn PurchaseOrderRepository>,
    receipts: Arc<dyn ReceiptRepository>,
    suppliers: Arc<SupplierDirectory>,
    authorizer: Arc<dyn Authorizer>,
    numbers: Arc<dyn NumberGenerator>,
    clock: Arc<dyn Clock>,
    events: Arc<EventSender>,
    settings: ProcurementSettings,
}

impl PurchaseOrderManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn PurchaseOrderRepository>,
        receipts: Arc<dyn ReceiptRepository>,
        suppliers: Arc<SupplierDirectory>,
        authorizer: Arc<dyn Authorizer>,
        numbers: Arc<dyn NumberGenerator>,
        clock: Arc<dyn Clock>,
        events: Arc<EventSender>,
        settings: ProcurementSettings,
    ) -> Self {
        Self {
            orders,
            receipts,
            suppliers,
            authorizer,
            numbers,
            clock,
            events,
            settings,
        }
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.id, supplier_id = %input.supplier_id))]
    pub async fn create_order(
        &self,
        actor: &Actor,
        input: NewPurchaseOrder,
    ) -> Result<PurchaseOrder, ServiceError> {
        input.validate()?;
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(input.items.len());
        for item in input.items {
            if !seen.insert(item.product_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} appears more than once",
                    item.product_id
                )));
            }
            items.push(item.into_item()?);
        }
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::PURCHASEORDERS_CREATE,
            "purchaseorders",
        )
        .await?;

        let supplier = match self.suppliers.get_supplier(input.supplier_id).await {
            Ok(supplier) => supplier,
            Err(ServiceError::NotFound { .. }) => {
                return Err(ServiceError::UnknownSupplier(input.supplier_id))
            }
            Err(e) => return Err(e),
        };
        if !supplier.active {
            return Err(ServiceError::ValidationError(format!(
                "Supplier {} is inactive",
                supplier.name
            )));
        }

        let now = self.clock.now();
        let mut order = PurchaseOrder::new(String::new(), &supplier, input.notes, actor, now);
        for item in items {
            order.add_item(item);
        }

        let attempts = self.settings.number_generation_attempts.max(1);
        for attempt in 1..=attempts {
            order.order_number = self
                .numbers
                .next_number(&self.settings.order_number_prefix, now);
            match self.orders.insert_order(&order).await {
                Ok(()) => {
                    metrics::PURCHASE_ORDERS_CREATED.inc();
                    self.events
                        .send_or_log(Event::PurchaseOrderCreated {
                            order_id: order.id,
                            order_number: order.order_number.clone(),
                            supplier_id: order.supplier_id,
                        })
                        .await;
                    info!(
                        purchase_order_id = %order.id,
                        order_number = %order.order_number,
                        "Purchase order created"
                    );
                    return Ok(order);
                }
                Err(ServiceError::Conflict(reason)) => {
                    warn!(attempt, order_number = %order.order_number, %reason, "Order number collision");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ServiceError::Conflict(format!(
            "could not allocate a unique order number after {} attempts",
            attempts
        )))
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn send_order(&self, actor: &Actor, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::PURCHASEORDERS_SEND,
            &order_id.to_string(),
        )
        .await?;
        let order = self
            .transition(order_id, "send", |order, now| order.send(actor, now))
            .await?;
        self.events.send_or_log(Event::PurchaseOrderSent(order.id)).await;
        Ok(order)
    }

    /// Cancels a draft or sent order. An order whose receipt is still waiting
    /// for stock cannot be cancelled.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<PurchaseOrder, ServiceError> {
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::PURCHASEORDERS_CANCEL,
            &order_id.to_string(),
        )
        .await?;
        // A sent order may already carry a receipt whose stock is still
        // pending; received and cancelled orders fail as transitions below.
        let current = self.get_order(order_id).await?;
        if current.status == PurchaseOrderStatus::Sent {
            self.ensure_no_receipt(order_id).await?;
        }
        let order = match self
            .transition(order_id, "cancel", |order, now| order.cancel(actor, reason, now))
            .await
        {
            // Still sent after losing the write: a receipt claimed the order.
            Err(ServiceError::InvalidTransition { current, .. })
                if current == PurchaseOrderStatus::Sent.to_string() =>
            {
                self.ensure_no_receipt(order_id).await?;
                return Err(ServiceError::ConcurrentModification(order_id));
            }
            result => result?,
        };
        self.events
            .send_or_log(Event::PurchaseOrderCancelled {
                order_id: order.id,
                reason: order.cancellation_reason.clone(),
            })
            .await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))
    }

    async fn ensure_no_receipt(&self, order_id: Uuid) -> Result<(), ServiceError> {
        match self.receipts.receipt_for_order(order_id).await? {
            Some(receipt) => Err(ServiceError::Conflict(format!(
                "purchase order {} already has receipt {}",
                order_id, receipt.receipt_number
            ))),
            None => Ok(()),
        }
    }

    /// Newest first. The listing can be iterated any number of times.
    pub async fn list_orders(
        &self,
        filter: &PurchaseOrderFilter,
    ) -> Result<PurchaseOrderListing, ServiceError> {
        let orders = self
            .orders
            .list_orders(filter.status)
            .await?
            .into_iter()
            .filter(|order| order.matches(filter))
            .collect();
        Ok(PurchaseOrderListing::new(orders))
    }

    /// Read, apply `change`, write back conditionally on the version read.
    /// A lost race reports the status the winner left behind.
    async fn transition<F>(
        &self,
        order_id: Uuid,
        action: &'static str,
        change: F,
    ) -> Result<PurchaseOrder, ServiceError>
    where
        F: FnOnce(&mut PurchaseOrder, DateTime<Utc>) -> Result<(), ServiceError>,
    {
        let mut order = self.get_order(order_id).await?;
        let expected = order.version;
        change(&mut order, self.clock.now())?;
        order.version = expected + 1;

        if self.orders.update_order(&order, expected).await? {
            metrics::PURCHASE_ORDER_TRANSITIONS
                .with_label_values(&[action])
                .inc();
            info!(
                purchase_order_id = %order.id,
                status = %order.status,
                "Purchase order {}",
                action
            );
            return Ok(order);
        }

        let current = self.get_order(order_id).await?;
        warn!(purchase_order_id = %order_id, current = %current.status, "Lost transition race");
        Err(ServiceError::InvalidTransition {
            entity: "purchase order",
            id: order_id,
            action,
            current: current.status.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, MockAuthorizer};
    use crate::context::FixedClock;
    use crate::events;
    use crate::models::{NewSupplier, PurchaseOrderStatus};
    use crate::numbering::{MockNumberGenerator, TimestampNumberGenerator};
    use crate::repositories::{InMemoryStore, MockPurchaseOrderRepository};
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryStore>,
        suppliers: Arc<SupplierDirectory>,
        clock: Arc<FixedClock>,
        events: Arc<EventSender>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            ));
            let (sender, _rx) = events::channel(64);
            let events = Arc::new(sender);
            let suppliers = Arc::new(SupplierDirectory::new(
                store.clone(),
                Arc::new(AllowAll),
                clock.clone(),
                events.clone(),
            ));
            Self {
                store,
                suppliers,
                clock,
                events,
            }
        }

        fn manager_with(
            &self,
            orders: Arc<dyn PurchaseOrderRepository>,
            authorizer: Arc<dyn Authorizer>,
            numbers: Arc<dyn NumberGenerator>,
        ) -> PurchaseOrderManager {
            PurchaseOrderManager::new(
                orders,
                self.store.clone(),
                self.suppliers.clone(),
                authorizer,
                numbers,
                self.clock.clone(),
                self.events.clone(),
                ProcurementSettings::default(),
            )
        }

        fn manager(&self) -> PurchaseOrderManager {
            self.manager_with(
                self.store.clone(),
                Arc::new(AllowAll),
                Arc::new(TimestampNumberGenerator),
            )
        }

        async fn supplier(&self, active: bool) -> Uuid {
            self.suppliers
                .create_supplier(
                    &Actor::system(),
                    NewSupplier {
                        name: "Abarrotes del Valle".into(),
                        contact: None,
                        tax_id: None,
                        payment_terms_days: 30,
                        active: Some(active),
                    },
                )
                .await
                .unwrap()
                .id
        }
    }

    fn item(quantity: u32) -> NewOrderItem {
        NewOrderItem {
            product_id: Uuid::new_v4(),
            product_name: "Refresco 600ml".into(),
            quantity,
            unit: OrderUnit::Box,
            unit_equivalence: Some(24),
            equivalence_unit: Some(OrderUnit::Bottle),
            unit_cost: Some(dec!(180)),
        }
    }

    fn request(supplier_id: Uuid, items: Vec<NewOrderItem>) -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id,
            items,
            notes: None,
        }
    }

    #[tokio::test]
    async fn creates_draft_with_generated_number() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let order = fx
            .manager()
            .create_order(&Actor::new("buyer-1"), request(supplier_id, vec![item(2)]))
            .await
            .unwrap();

        assert_eq!(order.status, PurchaseOrderStatus::Draft);
        assert!(order.order_number.starts_with("PO-20240301090000-"));
        assert_eq!(order.supplier_name, "Abarrotes del Valle");
        assert_eq!(order.created_by, "buyer-1");
        assert_eq!(order.estimated_total(), dec!(360));
    }

    #[tokio::test]
    async fn inactive_or_unknown_supplier_is_rejected() {
        let fx = Fixture::new();
        let inactive = fx.supplier(false).await;
        let manager = fx.manager();

        let err = manager
            .create_order(&Actor::system(), request(inactive, vec![item(1)]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));

        let err = manager
            .create_order(&Actor::system(), request(Uuid::new_v4(), vec![item(1)]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::UnknownSupplier(_));
    }

    #[rstest]
    #[case::no_items(vec![])]
    #[case::zero_quantity(vec![item(0)])]
    #[tokio::test]
    async fn malformed_items_are_rejected(#[case] items: Vec<NewOrderItem>) {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let err = fx
            .manager()
            .create_order(&Actor::system(), request(supplier_id, items))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn duplicate_products_and_half_equivalences_are_rejected() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let manager = fx.manager();

        let line = item(1);
        let err = manager
            .create_order(&Actor::system(), request(supplier_id, vec![line.clone(), line]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("more than once"));

        let mut half = item(1);
        half.equivalence_unit = None;
        let err = manager
            .create_order(&Actor::system(), request(supplier_id, vec![half]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn same_input_twice_gives_distinct_numbers() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let manager = fx.manager();
        let line = item(3);

        let a = manager
            .create_order(&Actor::system(), request(supplier_id, vec![line.clone()]))
            .await
            .unwrap();
        let b = manager
            .create_order(&Actor::system(), request(supplier_id, vec![line]))
            .await
            .unwrap();
        assert_ne!(a.order_number, b.order_number);
    }

    #[tokio::test]
    async fn number_collision_is_retried() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;

        let mut numbers = MockNumberGenerator::new();
        let mut seq = mockall::Sequence::new();
        numbers
            .expect_next_number()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| "PO-TAKEN".to_string());
        numbers
            .expect_next_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| "PO-FRESH".to_string());

        let manager = fx.manager_with(fx.store.clone(), Arc::new(AllowAll), Arc::new(numbers));
        let first = manager
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap();
        let second = manager
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap();

        assert_eq!(first.order_number, "PO-TAKEN");
        assert_eq!(second.order_number, "PO-FRESH");
    }

    #[tokio::test]
    async fn exhausted_number_attempts_conflict() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let mut numbers = MockNumberGenerator::new();
        numbers
            .expect_next_number()
            .returning(|_, _| "PO-SAME".to_string());
        let manager = fx.manager_with(fx.store.clone(), Arc::new(AllowAll), Arc::new(numbers));

        manager
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap();
        let err = manager
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
    }

    async fn apply(
        manager: &PurchaseOrderManager,
        actor: &Actor,
        order_id: Uuid,
        action: &str,
    ) -> Result<PurchaseOrder, ServiceError> {
        match action {
            "send" => manager.send_order(actor, order_id).await,
            _ => manager.cancel_order(actor, order_id, None).await,
        }
    }

    #[rstest]
    #[case::send_twice("send", "send")]
    #[case::send_after_cancel("cancel", "send")]
    #[case::cancel_twice("cancel", "cancel")]
    #[tokio::test]
    async fn terminal_or_repeated_transitions_fail(#[case] first: &str, #[case] second: &str) {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let manager = fx.manager();
        let actor = Actor::system();
        let order = manager
            .create_order(&actor, request(supplier_id, vec![item(1)]))
            .await
            .unwrap();

        apply(&manager, &actor, order.id, first).await.unwrap();
        let err = apply(&manager, &actor, order.id, second).await.unwrap_err();
        assert_matches!(err, ServiceError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn cancel_records_actor_reason_and_time() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let manager = fx.manager();
        let order = manager
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap();

        fx.clock.advance(chrono::Duration::hours(2));
        let cancelled = manager
            .cancel_order(&Actor::new("buyer-2"), order.id, Some("duplicated".into()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by.as_deref(), Some("buyer-2"));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("duplicated"));
        assert_eq!(cancelled.cancelled_at, Some(fx.clock.now()));
        assert_eq!(cancelled.version, 1);
    }

    #[tokio::test]
    async fn lost_race_reports_current_status() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let supplier = fx.suppliers.get_supplier(supplier_id).await.unwrap();
        let draft = PurchaseOrder::new(
            "PO-RACE".into(),
            &supplier,
            None,
            &Actor::system(),
            fx.clock.now(),
        );
        let mut cancelled = draft.clone();
        cancelled.status = PurchaseOrderStatus::Cancelled;
        cancelled.version = 1;

        let mut repo = MockPurchaseOrderRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_get_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(draft.clone())));
        repo.expect_update_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        repo.expect_get_order()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(cancelled.clone())));

        let manager = fx.manager_with(
            Arc::new(repo),
            Arc::new(AllowAll),
            Arc::new(TimestampNumberGenerator),
        );
        let err = manager
            .send_order(&Actor::system(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ServiceError::InvalidTransition { action: "send", current, .. } if current == "cancelled"
        );
    }

    #[tokio::test]
    async fn send_requires_permission() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let order = fx
            .manager()
            .create_order(&Actor::system(), request(supplier_id, vec![item(1)]))
            .await
            .unwrap();

        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_can_perform()
            .returning(|_, action, _| action != consts::PURCHASEORDERS_SEND);
        let manager = fx.manager_with(
            fx.store.clone(),
            Arc::new(authorizer),
            Arc::new(TimestampNumberGenerator),
        );

        let err = manager
            .send_order(&Actor::new("clerk"), order.id)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized { .. });
        let stored = manager.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Draft);
    }

    #[tokio::test]
    async fn listing_filters_and_restarts() {
        let fx = Fixture::new();
        let supplier_id = fx.supplier(true).await;
        let manager = fx.manager();
        let actor = Actor::system();
        let first = manager
            .create_order(&actor, request(supplier_id, vec![item(1)]))
            .await
            .unwrap();
        fx.clock.advance(chrono::Duration::minutes(1));
        let second = manager
            .create_order(&actor, request(supplier_id, vec![item(1)]))
            .await
            .unwrap();
        manager.send_order(&actor, first.id).await.unwrap();

        let all = manager.list_orders(&PurchaseOrderFilter::default()).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(all.iter().count(), 2);

        let sent = manager
            .list_orders(&PurchaseOrderFilter {
                status: Some(PurchaseOrderStatus::Sent),
                search_text: Some("valle".into()),
            })
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
    }
}
