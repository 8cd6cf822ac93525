/*!
 * # Permissions Module
 *
 * Permission strings checked by the procurement services.
 * Permissions are `resource:action`; a `resource:*` grant covers every action on it.
 */

/// Resource types
pub struct Resources;

impl Resources {
    pub const SUPPLIERS: &'static str = "suppliers";
    pub const PURCHASE_ORDERS: &'static str = "purchaseorders";
    pub const RECEIPTS: &'static str = "receipts";
    pub const INVOICES: &'static str = "invoices";
    pub const PAYABLES: &'static str = "payables";
    pub const ADMIN: &'static str = "admin";
}

/// Common permission string constants for compile-time safety
pub mod consts {
    // Suppliers
    pub const SUPPLIERS_MANAGE: &str = "suppliers:manage";

    // Purchase orders
    pub const PURCHASEORDERS_CREATE: &str = "purchaseorders:create";
    pub const PURCHASEORDERS_SEND: &str = "purchaseorders:send";
    pub const PURCHASEORDERS_CANCEL: &str = "purchaseorders:cancel";
    pub const PURCHASEORDERS_RECEIVE: &str = "purchaseorders:receive";

    // Receipts
    pub const RECEIPTS_RETRY_STOCK: &str = "receipts:retry_stock";

    // Invoices
    pub const INVOICES_REGISTER: &str = "invoices:register";
    pub const INVOICES_MARK_PAID: &str = "invoices:mark_paid";

    // Payables
    pub const PAYABLES_RECORD_PAYMENT: &str = "payables:record_payment";
}

/// Format a permission string
pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

/// Whether a granted permission covers the required one.
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }
    match (granted.strip_suffix(":*"), required.split_once(':')) {
        (Some(granted_resource), Some((required_resource, _))) => {
            granted_resource == required_resource
        }
        _ => false,
    }
}
