//! Domain records of the procurement-to-payment workflow.
//!
//! These types carry the invariants; services decide who may change them and
//! repositories decide where they live.

pub mod invoice;
pub mod payable;
pub mod purchase_order;
pub mod receipt;
pub mod supplier;

pub use invoice::{InvoiceDisplayStatus, InvoiceFilter, InvoiceStatus, NewInvoice, SupplierInvoice};
pub use payable::{
    NewPayment, PayableAccount, PayableFilter, PayableStatus, PayablesSummary, Payment,
    PaymentMethod,
};
pub use purchase_order::{
    OrderUnit, PurchaseOrder, PurchaseOrderFilter, PurchaseOrderItem, PurchaseOrderListing,
    PurchaseOrderStatus,
};
pub use receipt::{ProductReceipt, ReceiptItem, StockStatus};
pub use supplier::{NewSupplier, Supplier, SupplierUpdate};
