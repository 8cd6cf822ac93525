use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use pos_procurement::{
    context::Actor,
    db,
    errors::ServiceError,
    models::{
        NewSupplier, OrderUnit, ProductReceipt, PurchaseOrder, PurchaseOrderItem,
        PurchaseOrderStatus, ReceiptItem, StockStatus, Supplier,
    },
    repositories::{PurchaseOrderRepository, ReceiptRepository, SeaOrmStore, SupplierRepository},
};

async fn store() -> SeaOrmStore {
    let pool = db::in_memory_sqlite()
        .await
        .expect("failed to create test database");
    SeaOrmStore::new(Arc::new(pool))
}

fn supplier() -> Supplier {
    Supplier::new(
        NewSupplier {
            name: "Lacteos del Valle".into(),
            contact: Some("ventas@lacteos.example".into()),
            tax_id: None,
            payment_terms_days: 15,
            active: None,
        },
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
    )
}

fn order(number: &str, supplier: &Supplier) -> PurchaseOrder {
    PurchaseOrder::new(
        number.into(),
        supplier,
        Some("weekly dairy".into()),
        &Actor::new("clerk-1"),
        Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn order_round_trips_with_its_lines() {
    let store = store().await;
    let supplier = supplier();
    store.insert_supplier(&supplier).await.unwrap();

    let mut po = order("PO-20240102100000-AAAA", &supplier);
    assert!(po.add_item(PurchaseOrderItem {
        product_id: uuid::Uuid::new_v4(),
        product_name: "Milk 1L".into(),
        quantity: 24,
        unit: OrderUnit::Box,
        unit_equivalence: Some(12),
        equivalence_unit: Some(OrderUnit::Bottle),
        unit_cost: Some(dec!(14.25)),
    }));
    store.insert_order(&po).await.unwrap();

    let stored = store.get_order(po.id).await.unwrap().expect("stored order");
    assert_eq!(stored.order_number, po.order_number);
    assert_eq!(stored.supplier_name, "Lacteos del Valle");
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].base_quantity(), 288);
    assert_eq!(stored.items[0].unit_cost, Some(dec!(14.25)));
    assert_eq!(stored.status, PurchaseOrderStatus::Draft);
}

#[tokio::test]
async fn duplicate_order_number_conflicts() {
    let store = store().await;
    let supplier = supplier();
    store.insert_supplier(&supplier).await.unwrap();

    store
        .insert_order(&order("PO-DUP", &supplier))
        .await
        .unwrap();
    let err = store
        .insert_order(&order("PO-DUP", &supplier))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn stale_version_writes_nothing() {
    let store = store().await;
    let supplier = supplier();
    store.insert_supplier(&supplier).await.unwrap();

    let mut po = order("PO-VER", &supplier);
    store.insert_order(&po).await.unwrap();

    po.status = PurchaseOrderStatus::Sent;
    po.version = 1;
    assert!(store.update_order(&po, 0).await.unwrap());

    let mut stale = po.clone();
    stale.status = PurchaseOrderStatus::Cancelled;
    assert!(!store.update_order(&stale, 0).await.unwrap());

    let stored = store.get_order(po.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PurchaseOrderStatus::Sent);
    assert_eq!(stored.version, 1);
}

fn receipt_for(order: &PurchaseOrder, number: &str) -> ProductReceipt {
    ProductReceipt {
        id: uuid::Uuid::new_v4(),
        receipt_number: number.into(),
        purchase_order_id: order.id,
        order_number: order.order_number.clone(),
        items: order
            .items
            .iter()
            .map(|item| ReceiptItem::new(item, item.quantity, dec!(1.10)))
            .collect(),
        received_at: Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
        received_by: "receiver-1".into(),
        notes: None,
        stock_status: StockStatus::Pending,
        version: 0,
    }
}

#[tokio::test]
async fn receipt_claims_the_order_only_at_the_version_read() {
    let store = store().await;
    let supplier = supplier();
    store.insert_supplier(&supplier).await.unwrap();

    let mut po = order("PO-CLAIM", &supplier);
    po.add_item(PurchaseOrderItem {
        product_id: uuid::Uuid::new_v4(),
        product_name: "Yogurt 500g".into(),
        quantity: 10,
        unit: OrderUnit::Piece,
        unit_equivalence: None,
        equivalence_unit: None,
        unit_cost: Some(dec!(1.10)),
    });
    po.status = PurchaseOrderStatus::Sent;
    store.insert_order(&po).await.unwrap();

    // Someone else moved the order on after it was read at version 0.
    let mut cancelled = po.clone();
    cancelled.status = PurchaseOrderStatus::Cancelled;
    cancelled.version = 1;
    assert!(store.update_order(&cancelled, 0).await.unwrap());

    let mut claim = po.clone();
    claim.version = 1;
    let late = receipt_for(&po, "RCV-LATE");
    assert!(!store.insert_receipt(&late, &claim, 0).await.unwrap());
    assert!(store.receipt_for_order(po.id).await.unwrap().is_none());
    let stored = store.get_order(po.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PurchaseOrderStatus::Cancelled);
    assert_eq!(stored.version, 1);

    // A fresh order claimed at the version it was read.
    let mut fresh = order("PO-CLAIM-2", &supplier);
    fresh.items = po.items.clone();
    fresh.status = PurchaseOrderStatus::Sent;
    store.insert_order(&fresh).await.unwrap();
    let mut claim = fresh.clone();
    claim.version = 1;
    let receipt = receipt_for(&fresh, "RCV-OK");
    assert!(store.insert_receipt(&receipt, &claim, 0).await.unwrap());

    let filed = store.receipt_for_order(fresh.id).await.unwrap().unwrap();
    assert_eq!(filed.receipt_number, "RCV-OK");
    assert_eq!(filed.items.len(), 1);
    assert_eq!(store.get_order(fresh.id).await.unwrap().unwrap().version, 1);

    let again = receipt_for(&fresh, "RCV-AGAIN");
    let mut claim = fresh.clone();
    claim.version = 2;
    assert!(!store.insert_receipt(&again, &claim, 0).await.unwrap());
}

#[tokio::test]
async fn deleting_a_supplier_keeps_its_orders() {
    let store = store().await;
    let supplier = supplier();
    store.insert_supplier(&supplier).await.unwrap();
    let po = order("PO-ORPHAN", &supplier);
    store.insert_order(&po).await.unwrap();

    assert!(store.delete_supplier(supplier.id).await.unwrap());
    assert!(!store.delete_supplier(supplier.id).await.unwrap());
    assert!(store.get_supplier(supplier.id).await.unwrap().is_none());

    let orphan = store.get_order(po.id).await.unwrap().unwrap();
    assert_eq!(orphan.supplier_id, supplier.id);
}
