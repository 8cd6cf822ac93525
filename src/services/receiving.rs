use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::ProcurementSettings;
use crate::auth::{consts, ensure_allowed, Authorizer};
use crate::context::{Actor, Clock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::inventory::InventoryClient;
use crate::metrics;
use crate::models::{
    ProductReceipt, PurchaseOrder, PurchaseOrderStatus, ReceiptItem, StockStatus,
};
use crate::numbering::NumberGenerator;
use crate::repositories::{PurchaseOrderRepository, ReceiptRepository};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceiveLine {
    pub product_id: Uuid,
    pub received_quantity: u32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveShipment {
    pub lines: Vec<ReceiveLine>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Files receipts against sent orders and pushes the received quantities to
/// inventory.
///
/// A receipt is written first with `stock_status = pending`; each positive
/// line is then applied to inventory under the key `{receipt_id}:{product_id}`
/// and flagged as applied. Only when every line is applied does the receipt
/// become `applied` and the order `received`. If inventory fails midway the
/// order stays `sent` and [`ReceivingEngine::retry_stock_update`] finishes the
/// remaining lines.
pub struct ReceivingEngine {
    orders: Arc<dyn PurchaseOrderRepository>,
    receipts: Arc<dyn ReceiptRepository>,
    inventory: Arc<dyn InventoryClient>,
    authorizer: Arc<dyn Authorizer>,
    numbers: Arc<dyn NumberGenerator>,
    clock: Arc<dyn Clock>,
    events: Arc<EventSender>,
    settings: ProcurementSettings,
}

impl ReceivingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn PurchaseOrderRepository>,
        receipts: Arc<dyn ReceiptRepository>,
        inventory: Arc<dyn InventoryClient>,
        authorizer: Arc<dyn Authorizer>,
        numbers: Arc<dyn NumberGenerator>,
        clock: Arc<dyn Clock>,
        events: Arc<EventSender>,
        settings: ProcurementSettings,
    ) -> Self {
        Self {
            orders,
            receipts,
            inventory,
            authorizer,
            numbers,
            clock,
            events,
            settings,
        }
    }

    #[instrument(skip(self, actor, shipment), fields(actor = %actor.id, purchase_order_id = %order_id))]
    pub async fn receive(
        &self,
        actor: &Actor,
        order_id: Uuid,
        shipment: ReceiveShipment,
    ) -> Result<ProductReceipt, ServiceError> {
        shipment.validate()?;
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::PURCHASEORDERS_RECEIVE,
            &order_id.to_string(),
        )
        .await?;

        let order = self.load_order(order_id).await?;
        if order.status != PurchaseOrderStatus::Sent {
            return Err(ServiceError::OrderNotReceivable {
                order_id,
                status: order.status.to_string(),
            });
        }
        if self.receipts.receipt_for_order(order_id).await?.is_some() {
            return Err(Self::already_received(&order));
        }

        let items = Self::reconcile(&order, shipment.lines)?;
        let receipt = self.file_receipt(actor, &order, items, shipment.notes).await?;
        metrics::RECEIPTS_CREATED.inc();
        info!(
            receipt_id = %receipt.id,
            receipt_number = %receipt.receipt_number,
            total = %receipt.total_cost(),
            "Receipt filed"
        );

        self.apply_stock(actor, receipt).await
    }

    /// Compensating retry keyed by receipt id. Lines already applied are
    /// skipped, so calling this on a committed receipt changes nothing.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn retry_stock_update(
        &self,
        actor: &Actor,
        receipt_id: Uuid,
    ) -> Result<ProductReceipt, ServiceError> {
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::RECEIPTS_RETRY_STOCK,
            &receipt_id.to_string(),
        )
        .await?;
        let receipt = self.get_receipt(receipt_id).await?;
        self.apply_stock(actor, receipt).await
    }

    pub async fn get_receipt(&self, receipt_id: Uuid) -> Result<ProductReceipt, ServiceError> {
        self.receipts
            .get_receipt(receipt_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("receipt", receipt_id))
    }

    pub async fn receipt_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ProductReceipt>, ServiceError> {
        self.receipts.receipt_for_order(order_id).await
    }

    /// Receipts whose stock step has not finished.
    pub async fn list_pending_receipts(&self) -> Result<Vec<ProductReceipt>, ServiceError> {
        let mut pending = self.receipts.list_pending_receipts().await?;
        pending.sort_by_key(|r| r.received_at);
        Ok(pending)
    }

    /// Matches shipment lines to order items. Ordered products missing from
    /// the shipment are recorded with nothing received.
    fn reconcile(
        order: &PurchaseOrder,
        lines: Vec<ReceiveLine>,
    ) -> Result<Vec<ReceiptItem>, ServiceError> {
        let mut by_product: HashMap<Uuid, ReceiveLine> = HashMap::with_capacity(lines.len());
        for line in lines {
            if order.item(line.product_id).is_none() {
                return Err(ServiceError::UnknownProduct {
                    order_id: order.id,
                    product_id: line.product_id,
                });
            }
            if line.unit_cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Product {}: unit cost cannot be negative",
                    line.product_id
                )));
            }
            if let Some(dup) = by_product.insert(line.product_id, line) {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} appears more than once",
                    dup.product_id
                )));
            }
        }

        order
            .items
            .iter()
            .map(|ordered| match by_product.remove(&ordered.product_id) {
                Some(line) if line.received_quantity > ordered.quantity => {
                    Err(ServiceError::ValidationError(format!(
                        "Product {}: received {} but only {} were ordered",
                        ordered.product_id, line.received_quantity, ordered.quantity
                    )))
                }
                Some(line) => Ok(ReceiptItem::new(
                    ordered,
                    line.received_quantity,
                    line.unit_cost,
                )),
                None => Ok(ReceiptItem::new(
                    ordered,
                    0,
                    ordered.unit_cost.unwrap_or(Decimal::ZERO),
                )),
            })
            .collect()
    }

    async fn file_receipt(
        &self,
        actor: &Actor,
        order: &PurchaseOrder,
        items: Vec<ReceiptItem>,
        notes: Option<String>,
    ) -> Result<ProductReceipt, ServiceError> {
        let now = self.clock.now();
        let mut receipt = ProductReceipt {
            id: Uuid::new_v4(),
            receipt_number: String::new(),
            purchase_order_id: order.id,
            order_number: order.order_number.clone(),
            items,
            received_at: now,
            received_by: actor.id.clone(),
            notes,
            stock_status: StockStatus::Pending,
            version: 0,
        };

        // The receipt claims the order: bumping its version makes a concurrent
        // cancel fail its conditional write before any stock moves.
        let mut claimed = order.clone();
        claimed.version = order.version + 1;

        let attempts = self.settings.number_generation_attempts.max(1);
        for attempt in 1..=attempts {
            receipt.receipt_number = self
                .numbers
                .next_number(&self.settings.receipt_number_prefix, now);
            match self
                .receipts
                .insert_receipt(&receipt, &claimed, order.version)
                .await
            {
                Ok(true) => return Ok(receipt),
                Ok(false) => return Err(self.lost_claim(order).await),
                Err(ServiceError::Conflict(reason)) => {
                    if self.receipts.receipt_for_order(order.id).await?.is_some() {
                        return Err(Self::already_received(order));
                    }
                    warn!(attempt, receipt_number = %receipt.receipt_number, %reason, "Receipt number collision");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ServiceError::Conflict(format!(
            "could not allocate a unique receipt number after {} attempts",
            attempts
        )))
    }

    async fn apply_stock(
        &self,
        actor: &Actor,
        mut receipt: ProductReceipt,
    ) -> Result<ProductReceipt, ServiceError> {
        let pending: Vec<(Uuid, u32, String)> = receipt
            .pending_stock_lines()
            .map(|line| {
                (
                    line.product_id,
                    line.received_quantity,
                    line.stock_reference(receipt.id),
                )
            })
            .collect();

        for (product_id, quantity, reference) in pending {
            match self
                .inventory
                .increase_stock(product_id, quantity, &reference)
                .await
            {
                Ok(level) => {
                    info!(%product_id, quantity, stock_level = level, "Stock increased");
                    receipt.mark_line_applied(product_id);
                    self.save_receipt(&mut receipt).await?;
                }
                Err(e) => {
                    metrics::INVENTORY_UPDATE_FAILURES.inc();
                    error!(receipt_id = %receipt.id, %product_id, error = %e, "Stock increase failed");
                    self.events
                        .send_or_log(Event::ReceiptStockPending {
                            receipt_id: receipt.id,
                            product_id,
                            reason: e.to_string(),
                        })
                        .await;
                    return Err(ServiceError::InventoryUpdateFailed {
                        receipt_id: receipt.id,
                        product_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if receipt.stock_status == StockStatus::Pending {
            receipt.stock_status = StockStatus::Applied;
            self.save_receipt(&mut receipt).await?;
        }

        self.complete_order(actor, &receipt).await?;
        Ok(receipt)
    }

    /// Moves the order to `received` once its receipt is committed. An order
    /// that is already received is left alone.
    async fn complete_order(
        &self,
        actor: &Actor,
        receipt: &ProductReceipt,
    ) -> Result<(), ServiceError> {
        let mut order = self.load_order(receipt.purchase_order_id).await?;
        if order.status == PurchaseOrderStatus::Received {
            return Ok(());
        }
        let expected = order.version;
        order.mark_received(actor, self.clock.now())?;
        order.version = expected + 1;

        if !self.orders.update_order(&order, expected).await? {
            let current = self.load_order(order.id).await?;
            if current.status == PurchaseOrderStatus::Received {
                return Ok(());
            }
            return Err(ServiceError::InvalidTransition {
                entity: "purchase order",
                id: order.id,
                action: "receive",
                current: current.status.to_string(),
            });
        }

        metrics::PURCHASE_ORDER_TRANSITIONS
            .with_label_values(&["receive"])
            .inc();
        self.events
            .send_or_log(Event::PurchaseOrderReceived {
                order_id: order.id,
                receipt_id: receipt.id,
                complete: receipt.is_complete(),
            })
            .await;
        info!(purchase_order_id = %order.id, "Purchase order received");
        Ok(())
    }

    async fn save_receipt(&self, receipt: &mut ProductReceipt) -> Result<(), ServiceError> {
        let expected = receipt.version;
        receipt.version = expected + 1;
        if self.receipts.update_receipt(receipt, expected).await? {
            Ok(())
        } else {
            Err(ServiceError::ConcurrentModification(receipt.id))
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<PurchaseOrder, ServiceError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", order_id))
    }

    /// The order changed between reading it and filing the receipt.
    async fn lost_claim(&self, order: &PurchaseOrder) -> ServiceError {
        let current = match self.load_order(order.id).await {
            Ok(current) => current,
            Err(e) => return e,
        };
        warn!(purchase_order_id = %order.id, current = %current.status, "Lost receiving race");
        if current.status != PurchaseOrderStatus::Sent {
            return ServiceError::OrderNotReceivable {
                order_id: order.id,
                status: current.status.to_string(),
            };
        }
        match self.receipts.receipt_for_order(order.id).await {
            Ok(Some(_)) => Self::already_received(&current),
            Ok(None) => ServiceError::ConcurrentModification(order.id),
            Err(e) => e,
        }
    }

    fn already_received(order: &PurchaseOrder) -> ServiceError {
        ServiceError::OrderNotReceivable {
            order_id: order.id,
            status: format!("{} (receipt already filed)", order.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;
    use crate::context::SystemClock;
    use crate::events;
    use crate::inventory::{InMemoryInventory, InventoryClientError, MockInventoryClient};
    use crate::models::{NewSupplier, OrderUnit, PurchaseOrderItem, Supplier};
    use crate::numbering::TimestampNumberGenerator;
    use crate::repositories::InMemoryStore;
    use crate::services::{PurchaseOrderManager, SupplierDirectory};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn engine(store: Arc<InMemoryStore>, inventory: Arc<dyn InventoryClient>) -> ReceivingEngine {
        engine_over(store.clone(), store, inventory)
    }

    fn engine_over(
        orders: Arc<dyn PurchaseOrderRepository>,
        store: Arc<InMemoryStore>,
        inventory: Arc<dyn InventoryClient>,
    ) -> ReceivingEngine {
        let (sender, _rx) = events::channel(64);
        ReceivingEngine::new(
            orders,
            store,
            inventory,
            Arc::new(AllowAll),
            Arc::new(TimestampNumberGenerator),
            Arc::new(SystemClock),
            Arc::new(sender),
            ProcurementSettings::default(),
        )
    }

    fn line(quantity: u32) -> PurchaseOrderItem {
        PurchaseOrderItem {
            product_id: Uuid::new_v4(),
            product_name: "Aceite 1L".into(),
            quantity,
            unit: OrderUnit::Piece,
            unit_equivalence: None,
            equivalence_unit: None,
            unit_cost: Some(dec!(3)),
        }
    }

    async fn sent_order(store: &InMemoryStore, quantities: &[u32]) -> PurchaseOrder {
        let supplier = Supplier::new(
            NewSupplier {
                name: "Aceites Unidos".into(),
                contact: None,
                tax_id: None,
                payment_terms_days: 15,
                active: None,
            },
            Utc::now(),
        );
        let mut order = PurchaseOrder::new(
            format!("PO-{}", Uuid::new_v4()),
            &supplier,
            None,
            &Actor::system(),
            Utc::now(),
        );
        for q in quantities {
            order.add_item(line(*q));
        }
        order.status = PurchaseOrderStatus::Sent;
        store.insert_order(&order).await.unwrap();
        order
    }

    fn shipment(order: &PurchaseOrder, received: &[u32]) -> ReceiveShipment {
        ReceiveShipment {
            lines: order
                .items
                .iter()
                .zip(received)
                .map(|(item, qty)| ReceiveLine {
                    product_id: item.product_id,
                    received_quantity: *qty,
                    unit_cost: dec!(2.50),
                })
                .collect(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn full_receipt_marks_every_line_complete() {
        let store = Arc::new(InMemoryStore::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let order = sent_order(&store, &[4, 6]).await;
        let engine = engine(store.clone(), inventory.clone());

        let receipt = engine
            .receive(&Actor::new("receiver"), order.id, shipment(&order, &[4, 6]))
            .await
            .unwrap();

        assert!(receipt.items.iter().all(|i| i.is_complete));
        assert!(receipt.is_committed());
        assert_eq!(receipt.total_cost(), dec!(25.00));
        assert_eq!(inventory.level(order.items[1].product_id), 6);
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Received);
        assert_eq!(stored.received_by.as_deref(), Some("receiver"));
    }

    #[tokio::test]
    async fn zero_line_is_incomplete_but_order_is_received() {
        let store = Arc::new(InMemoryStore::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let order = sent_order(&store, &[4, 6]).await;
        let engine = engine(store.clone(), inventory.clone());

        let receipt = engine
            .receive(&Actor::system(), order.id, shipment(&order, &[4, 0]))
            .await
            .unwrap();

        assert!(!receipt.items[1].is_complete);
        assert_eq!(inventory.applied_references(), 1);
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Received);
    }

    #[tokio::test]
    async fn omitted_lines_are_recorded_as_nothing_received() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[2, 3]).await;
        let engine = engine(store.clone(), Arc::new(InMemoryInventory::new()));

        let receipt = engine
            .receive(&Actor::system(), order.id, shipment(&order, &[2]))
            .await
            .unwrap();
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[1].received_quantity, 0);
        assert!(!receipt.is_complete());
    }

    #[tokio::test]
    async fn draft_order_is_not_receivable() {
        let store = Arc::new(InMemoryStore::new());
        let mut order = sent_order(&store, &[1]).await;
        order.status = PurchaseOrderStatus::Draft;
        order.version = 1;
        store.update_order(&order, 0).await.unwrap();
        let engine = engine(store.clone(), Arc::new(InMemoryInventory::new()));

        let err = engine
            .receive(&Actor::system(), order.id, shipment(&order, &[1]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::OrderNotReceivable { status, .. } if status == "draft");
    }

    #[tokio::test]
    async fn unknown_product_is_rejected_before_anything_is_written() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[1]).await;
        let engine = engine(store.clone(), Arc::new(InMemoryInventory::new()));

        let mut bad = shipment(&order, &[1]);
        bad.lines.push(ReceiveLine {
            product_id: Uuid::new_v4(),
            received_quantity: 1,
            unit_cost: dec!(1),
        });
        let err = engine.receive(&Actor::system(), order.id, bad).await.unwrap_err();
        assert_matches!(err, ServiceError::UnknownProduct { .. });
        assert!(store.receipt_for_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn over_receiving_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[1]).await;
        let engine = engine(store.clone(), Arc::new(InMemoryInventory::new()));

        let err = engine
            .receive(&Actor::system(), order.id, shipment(&order, &[2]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn inventory_failure_leaves_order_sent_and_retry_finishes() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[5, 7]).await;
        let first = order.items[0].product_id;
        let second = order.items[1].product_id;

        let mut flaky = MockInventoryClient::new();
        flaky
            .expect_increase_stock()
            .withf(move |product, _, _| *product == first)
            .times(1)
            .returning(|_, qty, _| Ok(i64::from(qty)));
        flaky
            .expect_increase_stock()
            .withf(move |product, _, _| *product == second)
            .times(1)
            .returning(|_, _, _| Err(InventoryClientError::Timeout));

        let failing = engine(store.clone(), Arc::new(flaky));
        let err = failing
            .receive(&Actor::system(), order.id, shipment(&order, &[5, 7]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InventoryUpdateFailed { product_id, .. } if product_id == second);

        let pending = store.receipt_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(pending.stock_status, StockStatus::Pending);
        assert!(pending.items[0].stock_applied);
        assert!(!pending.items[1].stock_applied);
        assert_eq!(
            store.get_order(order.id).await.unwrap().unwrap().status,
            PurchaseOrderStatus::Sent
        );

        let mut recovered = MockInventoryClient::new();
        recovered
            .expect_increase_stock()
            .withf(move |product, qty, reference| {
                *product == second && *qty == 7 && reference.ends_with(&second.to_string())
            })
            .times(1)
            .returning(|_, qty, _| Ok(i64::from(qty)));
        let retrying = engine(store.clone(), Arc::new(recovered));
        let receipt = retrying
            .retry_stock_update(&Actor::system(), pending.id)
            .await
            .unwrap();

        assert!(receipt.is_committed());
        assert_eq!(
            store.get_order(order.id).await.unwrap().unwrap().status,
            PurchaseOrderStatus::Received
        );

        // Already committed: no inventory calls at all.
        let idle = engine(store.clone(), Arc::new(MockInventoryClient::new()));
        let again = idle
            .retry_stock_update(&Actor::system(), pending.id)
            .await
            .unwrap();
        assert_eq!(again.id, receipt.id);
    }

    #[tokio::test]
    async fn second_receipt_is_refused_while_first_is_pending() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[1]).await;
        let mut down = MockInventoryClient::new();
        down.expect_increase_stock()
            .returning(|_, _, _| Err(InventoryClientError::Unavailable("down".into())));
        let engine = engine(store.clone(), Arc::new(down));

        engine
            .receive(&Actor::system(), order.id, shipment(&order, &[1]))
            .await
            .unwrap_err();
        let err = engine
            .receive(&Actor::system(), order.id, shipment(&order, &[1]))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::OrderNotReceivable { .. });
    }

    /// Parks the first caller of [`Gate::pass`] until [`Gate::open`].
    #[derive(Default)]
    struct Gate {
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    impl Gate {
        fn armed() -> Self {
            let gate = Self::default();
            gate.armed.store(true, Ordering::SeqCst);
            gate
        }

        async fn pass(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
        }

        async fn wait_reached(&self) {
            self.reached.notified().await;
        }

        fn open(&self) {
            self.release.notify_one();
        }
    }

    #[derive(Clone, Copy)]
    enum Stall {
        AfterRead,
        BeforeWrite,
    }

    struct StallingOrders {
        inner: Arc<InMemoryStore>,
        stall: Stall,
        gate: Gate,
    }

    #[async_trait]
    impl PurchaseOrderRepository for StallingOrders {
        async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), ServiceError> {
            self.inner.insert_order(order).await
        }

        async fn update_order(
            &self,
            order: &PurchaseOrder,
            expected_version: i64,
        ) -> Result<bool, ServiceError> {
            if matches!(self.stall, Stall::BeforeWrite) {
                self.gate.pass().await;
            }
            self.inner.update_order(order, expected_version).await
        }

        async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, ServiceError> {
            let order = self.inner.get_order(id).await?;
            if matches!(self.stall, Stall::AfterRead) {
                self.gate.pass().await;
            }
            Ok(order)
        }

        async fn list_orders(
            &self,
            status: Option<PurchaseOrderStatus>,
        ) -> Result<Vec<PurchaseOrder>, ServiceError> {
            self.inner.list_orders(status).await
        }
    }

    struct StallingInventory {
        inner: InMemoryInventory,
        gate: Gate,
    }

    #[async_trait]
    impl InventoryClient for StallingInventory {
        async fn increase_stock(
            &self,
            product_id: Uuid,
            quantity: u32,
            reference: &str,
        ) -> Result<i64, InventoryClientError> {
            self.gate.pass().await;
            self.inner.increase_stock(product_id, quantity, reference).await
        }
    }

    fn manager(
        orders: Arc<dyn PurchaseOrderRepository>,
        store: Arc<InMemoryStore>,
    ) -> PurchaseOrderManager {
        let (sender, _rx) = events::channel(64);
        let events = Arc::new(sender);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let suppliers = Arc::new(SupplierDirectory::new(
            store.clone(),
            Arc::new(AllowAll),
            clock.clone(),
            events.clone(),
        ));
        PurchaseOrderManager::new(
            orders,
            store,
            suppliers,
            Arc::new(AllowAll),
            Arc::new(TimestampNumberGenerator),
            clock,
            events,
            ProcurementSettings::default(),
        )
    }

    #[tokio::test]
    async fn cancel_cannot_overtake_a_filed_receipt() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[3]).await;
        let product = order.items[0].product_id;

        let orders = Arc::new(StallingOrders {
            inner: store.clone(),
            stall: Stall::BeforeWrite,
            gate: Gate::armed(),
        });
        let manager = Arc::new(manager(orders.clone(), store.clone()));
        let inventory = Arc::new(StallingInventory {
            inner: InMemoryInventory::new(),
            gate: Gate::armed(),
        });
        let engine = Arc::new(engine(store.clone(), inventory.clone()));

        // Cancel has seen a sent order without a receipt and is about to write.
        let cancel = tokio::spawn({
            let manager = manager.clone();
            let order_id = order.id;
            async move {
                manager
                    .cancel_order(&Actor::new("buyer"), order_id, None)
                    .await
            }
        });
        orders.gate.wait_reached().await;

        // Receive files its receipt and stops before touching stock.
        let receive = tokio::spawn({
            let engine = engine.clone();
            let shipment = shipment(&order, &[3]);
            let order_id = order.id;
            async move {
                engine
                    .receive(&Actor::new("receiver"), order_id, shipment)
                    .await
            }
        });
        inventory.gate.wait_reached().await;

        orders.gate.open();
        let err = cancel.await.unwrap().unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
        assert_eq!(
            store.get_order(order.id).await.unwrap().unwrap().status,
            PurchaseOrderStatus::Sent
        );

        inventory.gate.open();
        let receipt = receive.await.unwrap().unwrap();
        assert!(receipt.is_committed());
        assert_eq!(inventory.inner.level(product), 3);
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Received);
        assert!(stored.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn receive_on_a_stale_read_leaves_cancelled_order_alone() {
        let store = Arc::new(InMemoryStore::new());
        let order = sent_order(&store, &[2, 5]).await;

        let orders = Arc::new(StallingOrders {
            inner: store.clone(),
            stall: Stall::AfterRead,
            gate: Gate::armed(),
        });
        let inventory = Arc::new(InMemoryInventory::new());
        let engine = Arc::new(engine_over(orders.clone(), store.clone(), inventory.clone()));

        // Receive has read the order as sent.
        let receive = tokio::spawn({
            let engine = engine.clone();
            let shipment = shipment(&order, &[2, 5]);
            let order_id = order.id;
            async move { engine.receive(&Actor::system(), order_id, shipment).await }
        });
        orders.gate.wait_reached().await;

        let cancelled = manager(store.clone(), store.clone())
            .cancel_order(&Actor::new("buyer"), order.id, Some("supplier closed".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);

        orders.gate.open();
        let err = receive.await.unwrap().unwrap_err();
        assert_matches!(err, ServiceError::OrderNotReceivable { status, .. } if status == "cancelled");
        assert!(store.receipt_for_order(order.id).await.unwrap().is_none());
        assert_eq!(inventory.applied_references(), 0);
        assert_eq!(
            store.get_order(order.id).await.unwrap().unwrap().status,
            PurchaseOrderStatus::Cancelled
        );
    }
}
