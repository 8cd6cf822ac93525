//! sea-orm table mappings. Domain types live in `crate::models`; the SQL
//! repository converts between the two.

pub mod payable_account;
pub mod payment;
pub mod product_receipt;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod receipt_item;
pub mod supplier;
pub mod supplier_invoice;
