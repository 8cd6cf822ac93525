// Procurement-to-payment components, leaves first
pub mod suppliers;
pub mod purchase_orders;
pub mod receiving;
pub mod invoices;
pub mod payables;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Authorizer;
use crate::context::Clock;
use crate::events::EventSender;
use crate::inventory::InventoryClient;
use crate::numbering::NumberGenerator;
use crate::repositories::ProcurementStore;

pub use invoices::InvoiceRegister;
pub use payables::PayableLedger;
pub use purchase_orders::{NewOrderItem, NewPurchaseOrder, PurchaseOrderManager};
pub use receiving::{ReceiveLine, ReceiveShipment, ReceivingEngine};
pub use suppliers::SupplierDirectory;

/// Tunables shared by the components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcurementSettings {
    pub order_number_prefix: String,
    pub receipt_number_prefix: String,
    /// Fresh numbers tried before giving up on a collision.
    pub number_generation_attempts: u32,
    /// Re-reads allowed when a payment loses a version race.
    pub payment_write_retries: u32,
}

impl Default for ProcurementSettings {
    fn default() -> Self {
        Self {
            order_number_prefix: "PO".to_string(),
            receipt_number_prefix: "RC".to_string(),
            number_generation_attempts: 5,
            payment_write_retries: 3,
        }
    }
}

/// Collaborators the components are built from.
pub struct ServiceDeps {
    pub authorizer: Arc<dyn Authorizer>,
    pub inventory: Arc<dyn InventoryClient>,
    pub numbers: Arc<dyn NumberGenerator>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventSender>,
}

/// The five components wired over one store.
#[derive(Clone)]
pub struct ProcurementServices {
    pub suppliers: Arc<SupplierDirectory>,
    pub purchase_orders: Arc<PurchaseOrderManager>,
    pub receiving: Arc<ReceivingEngine>,
    pub invoices: Arc<InvoiceRegister>,
    pub payables: Arc<PayableLedger>,
}

impl ProcurementServices {
    pub fn new<S>(store: Arc<S>, deps: ServiceDeps, settings: ProcurementSettings) -> Self
    where
        S: ProcurementStore + 'static,
    {
        let suppliers = Arc::new(SupplierDirectory::new(
            store.clone(),
            deps.authorizer.clone(),
            deps.clock.clone(),
            deps.events.clone(),
        ));
        let purchase_orders = Arc::new(PurchaseOrderManager::new(
            store.clone(),
            store.clone(),
            suppliers.clone(),
            deps.authorizer.clone(),
            deps.numbers.clone(),
            deps.clock.clone(),
            deps.events.clone(),
            settings.clone(),
        ));
        let receiving = Arc::new(ReceivingEngine::new(
            store.clone(),
            store.clone(),
            deps.inventory,
            deps.authorizer.clone(),
            deps.numbers,
            deps.clock.clone(),
            deps.events.clone(),
            settings.clone(),
        ));
        let invoices = Arc::new(InvoiceRegister::new(
            store.clone(),
            store.clone(),
            store.clone(),
            suppliers.clone(),
            deps.authorizer.clone(),
            deps.clock.clone(),
            deps.events.clone(),
        ));
        let payables = Arc::new(PayableLedger::new(
            store.clone(),
            store,
            deps.authorizer,
            deps.clock,
            deps.events,
            settings.payment_write_retries,
        ));

        Self {
            suppliers,
            purchase_orders,
            receiving,
            invoices,
            payables,
        }
    }
}
