//! Storage seams for the procurement aggregates.
//!
//! Every mutable aggregate carries a `version`. Updates are conditional: the
//! caller passes the version it read and stores a record whose `version` is one
//! higher; an update that finds a different version writes nothing and reports
//! `false` so the service can re-read and decide.
//!
//! Uniqueness violations (order number, receipt per order, invoice number per
//! supplier, payment reference per account) surface as `ServiceError::Conflict`.

pub mod memory;
pub mod sea_orm;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    PayableAccount, Payment, ProductReceipt, PurchaseOrder, PurchaseOrderStatus, Supplier,
    SupplierInvoice,
};

pub use self::memory::InMemoryStore;
pub use self::sea_orm::SeaOrmStore;

pub type RepoResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait SupplierRepository: Send + Sync {
    async fn insert_supplier(&self, supplier: &Supplier) -> RepoResult<()>;
    /// Administrative overwrite; suppliers are not versioned.
    async fn update_supplier(&self, supplier: &Supplier) -> RepoResult<bool>;
    async fn get_supplier(&self, id: Uuid) -> RepoResult<Option<Supplier>>;
    async fn list_suppliers(&self) -> RepoResult<Vec<Supplier>>;
    /// Removes the directory record only. Returns whether a row was deleted.
    async fn delete_supplier(&self, id: Uuid) -> RepoResult<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    /// Fails with `Conflict` when the order number is already taken.
    async fn insert_order(&self, order: &PurchaseOrder) -> RepoResult<()>;
    async fn update_order(&self, order: &PurchaseOrder, expected_version: i64) -> RepoResult<bool>;
    async fn get_order(&self, id: Uuid) -> RepoResult<Option<PurchaseOrder>>;
    async fn list_orders(&self, status: Option<PurchaseOrderStatus>)
        -> RepoResult<Vec<PurchaseOrder>>;
}

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Files `receipt` and writes `order` in one unit of work, claiming the
    /// order for receiving. `order` carries the next version; nothing is
    /// written and `false` is returned when the stored order is no longer at
    /// `expected_order_version`. Fails with `Conflict` when the order already
    /// has a receipt or the receipt number is taken.
    async fn insert_receipt(
        &self,
        receipt: &ProductReceipt,
        order: &PurchaseOrder,
        expected_order_version: i64,
    ) -> RepoResult<bool>;
    async fn update_receipt(
        &self,
        receipt: &ProductReceipt,
        expected_version: i64,
    ) -> RepoResult<bool>;
    async fn get_receipt(&self, id: Uuid) -> RepoResult<Option<ProductReceipt>>;
    async fn receipt_for_order(&self, order_id: Uuid) -> RepoResult<Option<ProductReceipt>>;
    async fn list_pending_receipts(&self) -> RepoResult<Vec<ProductReceipt>>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Inserts an invoice together with its payable account, or neither.
    async fn insert_invoice_with_payable(
        &self,
        invoice: &SupplierInvoice,
        payable: &PayableAccount,
    ) -> RepoResult<()>;
    async fn update_invoice(
        &self,
        invoice: &SupplierInvoice,
        expected_version: i64,
    ) -> RepoResult<bool>;
    async fn get_invoice(&self, id: Uuid) -> RepoResult<Option<SupplierInvoice>>;
    async fn find_invoice_by_number(
        &self,
        supplier_id: Uuid,
        invoice_number: &str,
    ) -> RepoResult<Option<SupplierInvoice>>;
    async fn list_invoices(&self) -> RepoResult<Vec<SupplierInvoice>>;
}

#[async_trait]
pub trait PayableRepository: Send + Sync {
    async fn get_payable(&self, id: Uuid) -> RepoResult<Option<PayableAccount>>;
    async fn payable_for_invoice(&self, invoice_id: Uuid) -> RepoResult<Option<PayableAccount>>;
    async fn list_payables(&self) -> RepoResult<Vec<PayableAccount>>;
    /// Stores `payable` (already carrying `payment` as its last history entry)
    /// if its stored version is still `expected_version`. When `settled_invoice`
    /// is given it is written in the same unit of work.
    async fn record_payment(
        &self,
        payable: &PayableAccount,
        payment: &Payment,
        expected_version: i64,
        settled_invoice: Option<&SupplierInvoice>,
    ) -> RepoResult<bool>;
}

/// Everything the services need from one backing store.
pub trait ProcurementStore:
    SupplierRepository
    + PurchaseOrderRepository
    + ReceiptRepository
    + InvoiceRepository
    + PayableRepository
{
}

impl<T> ProcurementStore for T where
    T: SupplierRepository
        + PurchaseOrderRepository
        + ReceiptRepository
        + InvoiceRepository
        + PayableRepository
{
}
