//! Prometheus counters for the procurement workflow.
//!
//! Counters live in a crate-owned [`Registry`] so the `/metrics` endpoint only
//! exposes what this service records.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SUPPLIERS_CREATED: IntCounter = IntCounter::new(
        "suppliers_created_total",
        "Total number of suppliers added to the directory"
    )
    .expect("metric can be created");
    pub static ref PURCHASE_ORDERS_CREATED: IntCounter = IntCounter::new(
        "purchase_orders_created_total",
        "Total number of purchase orders created"
    )
    .expect("metric can be created");
    pub static ref PURCHASE_ORDER_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "purchase_order_transitions_total",
            "Purchase order status transitions by kind"
        ),
        &["transition"]
    )
    .expect("metric can be created");
    pub static ref RECEIPTS_CREATED: IntCounter = IntCounter::new(
        "receipts_created_total",
        "Total number of product receipts filed"
    )
    .expect("metric can be created");
    pub static ref INVENTORY_UPDATE_FAILURES: IntCounter = IntCounter::new(
        "inventory_update_failures_total",
        "Stock increments that failed and left a receipt pending"
    )
    .expect("metric can be created");
    pub static ref INVOICES_REGISTERED: IntCounter = IntCounter::new(
        "invoices_registered_total",
        "Total number of supplier invoices registered"
    )
    .expect("metric can be created");
    pub static ref PAYMENTS_RECORDED: IntCounter = IntCounter::new(
        "payments_recorded_total",
        "Total number of payments applied to payable accounts"
    )
    .expect("metric can be created");
    pub static ref PAYMENT_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "payment_rejections_total",
            "Payments rejected by the ledger, by reason"
        ),
        &["reason"]
    )
    .expect("metric can be created");
}

/// Registers every counter once. Safe to call repeatedly.
pub fn register_metrics() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SUPPLIERS_CREATED.clone()),
            Box::new(PURCHASE_ORDERS_CREATED.clone()),
            Box::new(PURCHASE_ORDER_TRANSITIONS.clone()),
            Box::new(RECEIPTS_CREATED.clone()),
            Box::new(INVENTORY_UPDATE_FAILURES.clone()),
            Box::new(INVOICES_REGISTERED.clone()),
            Box::new(PAYMENTS_RECORDED.clone()),
            Box::new(PAYMENT_REJECTIONS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Prometheus text exposition of the crate registry.
pub fn gather_text() -> String {
    register_metrics();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
