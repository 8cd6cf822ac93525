use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    InvoiceRepository, PayableRepository, PurchaseOrderRepository, ReceiptRepository, RepoResult,
    SupplierRepository,
};
use crate::errors::ServiceError;
use crate::models::{
    PayableAccount, Payment, ProductReceipt, PurchaseOrder, PurchaseOrderStatus, StockStatus,
    Supplier, SupplierInvoice,
};

#[derive(Debug, Default)]
struct State {
    suppliers: HashMap<Uuid, Supplier>,
    orders: HashMap<Uuid, PurchaseOrder>,
    receipts: HashMap<Uuid, ProductReceipt>,
    invoices: HashMap<Uuid, SupplierInvoice>,
    payables: HashMap<Uuid, PayableAccount>,
}

/// Process-local store. One lock covers every table so multi-record writes
/// are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn replace_if_version<T: Clone>(
    slot: Option<&mut T>,
    version_of: impl Fn(&T) -> i64,
    expected_version: i64,
    next: &T,
) -> bool {
    match slot {
        Some(current) if version_of(current) == expected_version => {
            *current = next.clone();
            true
        }
        _ => false,
    }
}

#[async_trait]
impl SupplierRepository for InMemoryStore {
    async fn insert_supplier(&self, supplier: &Supplier) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state.suppliers.contains_key(&supplier.id) {
            return Err(ServiceError::Conflict(format!(
                "supplier {} already exists",
                supplier.id
            )));
        }
        state.suppliers.insert(supplier.id, supplier.clone());
        Ok(())
    }

    async fn update_supplier(&self, supplier: &Supplier) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        match state.suppliers.get_mut(&supplier.id) {
            Some(current) => {
                *current = supplier.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_supplier(&self, id: Uuid) -> RepoResult<Option<Supplier>> {
        Ok(self.state.read().await.suppliers.get(&id).cloned())
    }

    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>> {
        Ok(self.state.read().await.suppliers.values().cloned().collect())
    }

    async fn delete_supplier(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.state.write().await.suppliers.remove(&id).is_some())
    }
}

#[async_trait]
impl PurchaseOrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &PurchaseOrder) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state
            .orders
            .values()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(ServiceError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &PurchaseOrder, expected_version: i64) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        Ok(replace_if_version(
            state.orders.get_mut(&order.id),
            |o| o.version,
            expected_version,
            order,
        ))
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<PurchaseOrder>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
    ) -> RepoResult<Vec<PurchaseOrder>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryStore {
    async fn insert_receipt(
        &self,
        receipt: &ProductReceipt,
        order: &PurchaseOrder,
        expected_order_version: i64,
    ) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        if state.orders.get(&order.id).map(|o| o.version) != Some(expected_order_version) {
            return Ok(false);
        }
        if let Some(existing) = state.receipts.values().find(|r| {
            r.purchase_order_id == receipt.purchase_order_id
                || r.receipt_number == receipt.receipt_number
        }) {
            return Err(ServiceError::Conflict(format!(
                "receipt {} already exists for purchase order {}",
                existing.receipt_number, existing.purchase_order_id
            )));
        }
        state.receipts.insert(receipt.id, receipt.clone());
        state.orders.insert(order.id, order.clone());
        Ok(true)
    }

    async fn update_receipt(
        &self,
        receipt: &ProductReceipt,
        expected_version: i64,
    ) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        Ok(replace_if_version(
            state.receipts.get_mut(&receipt.id),
            |r| r.version,
            expected_version,
            receipt,
        ))
    }

    async fn get_receipt(&self, id: Uuid) -> RepoResult<Option<ProductReceipt>> {
        Ok(self.state.read().await.receipts.get(&id).cloned())
    }

    async fn receipt_for_order(&self, order_id: Uuid) -> RepoResult<Option<ProductReceipt>> {
        Ok(self
            .state
            .read()
            .await
            .receipts
            .values()
            .find(|r| r.purchase_order_id == order_id)
            .cloned())
    }

    async fn list_pending_receipts(&self) -> RepoResult<Vec<ProductReceipt>> {
        Ok(self
            .state
            .read()
            .await
            .receipts
            .values()
            .filter(|r| r.stock_status == StockStatus::Pending)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn insert_invoice_with_payable(
        &self,
        invoice: &SupplierInvoice,
        payable: &PayableAccount,
    ) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state.invoices.values().any(|existing| {
            existing.supplier_id == invoice.supplier_id
                && existing.invoice_number == invoice.invoice_number
        }) {
            return Err(ServiceError::Conflict(format!(
                "invoice {} already registered for supplier {}",
                invoice.invoice_number, invoice.supplier_id
            )));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        state.payables.insert(payable.id, payable.clone());
        Ok(())
    }

    async fn update_invoice(
        &self,
        invoice: &SupplierInvoice,
        expected_version: i64,
    ) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        Ok(replace_if_version(
            state.invoices.get_mut(&invoice.id),
            |i| i.version,
            expected_version,
            invoice,
        ))
    }

    async fn get_invoice(&self, id: Uuid) -> RepoResult<Option<SupplierInvoice>> {
        Ok(self.state.read().await.invoices.get(&id).cloned())
    }

    async fn find_invoice_by_number(
        &self,
        supplier_id: Uuid,
        invoice_number: &str,
    ) -> RepoResult<Option<SupplierInvoice>> {
        Ok(self
            .state
            .read()
            .await
            .invoices
            .values()
            .find(|i| i.supplier_id == supplier_id && i.invoice_number == invoice_number)
            .cloned())
    }

    async fn list_invoices(&self) -> RepoResult<Vec<SupplierInvoice>> {
        Ok(self.state.read().await.invoices.values().cloned().collect())
    }
}

#[async_trait]
impl PayableRepository for InMemoryStore {
    async fn get_payable(&self, id: Uuid) -> RepoResult<Option<PayableAccount>> {
        Ok(self.state.read().await.payables.get(&id).cloned())
    }

    async fn payable_for_invoice(&self, invoice_id: Uuid) -> RepoResult<Option<PayableAccount>> {
        Ok(self
            .state
            .read()
            .await
            .payables
            .values()
            .find(|p| p.invoice_id == invoice_id)
            .cloned())
    }

    async fn list_payables(&self) -> RepoResult<Vec<PayableAccount>> {
        Ok(self.state.read().await.payables.values().cloned().collect())
    }

    async fn record_payment(
        &self,
        payable: &PayableAccount,
        payment: &Payment,
        expected_version: i64,
        settled_invoice: Option<&SupplierInvoice>,
    ) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        let Some(current) = state.payables.get(&payable.id) else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        if let Some(reference) = payment.reference.as_deref() {
            if current.payment_with_reference(reference).is_some() {
                return Err(ServiceError::Conflict(format!(
                    "payment reference {} already recorded",
                    reference
                )));
            }
        }
        if let Some(invoice) = settled_invoice {
            let invoice_current = state
                .invoices
                .get(&invoice.id)
                .map(|i| i.version)
                .ok_or_else(|| ServiceError::not_found("invoice", invoice.id))?;
            if invoice_current != invoice.version - 1 {
                return Ok(false);
            }
            state.invoices.insert(invoice.id, invoice.clone());
        }
        state.payables.insert(payable.id, payable.clone());
        Ok(true)
    }
}
