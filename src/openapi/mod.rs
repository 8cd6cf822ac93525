use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "POS Procurement API",
        version = "0.1.0",
        description = r#"
# Procurement to payment

Purchase orders, receiving, supplier invoices and payable accounts for a
retail point of sale.

## Caller identity

Mutating endpoints expect the gateway to forward the caller in
`X-Actor-Id`, with optional `X-Actor-Name` and comma separated
`X-Actor-Roles`.

## Errors

Every failure carries a machine-readable `code`:

```json
{
  "error": "Conflict",
  "code": "invalid_transition",
  "message": "cannot cancel purchase order ... while it is received",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
"#
    ),
    paths(
        handlers::health::health_check,
        handlers::suppliers::list_suppliers,
        handlers::suppliers::create_supplier,
        handlers::suppliers::get_supplier,
        handlers::suppliers::update_supplier,
        handlers::suppliers::delete_supplier,
        handlers::suppliers::activate_supplier,
        handlers::suppliers::deactivate_supplier,
        handlers::purchase_orders::list_purchase_orders,
        handlers::purchase_orders::create_purchase_order,
        handlers::purchase_orders::get_purchase_order,
        handlers::purchase_orders::send_purchase_order,
        handlers::purchase_orders::cancel_purchase_order,
        handlers::purchase_orders::receive_purchase_order,
        handlers::purchase_orders::get_purchase_order_receipt,
        handlers::receipts::list_pending_receipts,
        handlers::receipts::get_receipt,
        handlers::receipts::retry_stock_update,
        handlers::invoices::list_invoices,
        handlers::invoices::register_invoice,
        handlers::invoices::get_invoice,
        handlers::invoices::get_invoice_payable,
        handlers::invoices::mark_invoice_paid,
        handlers::payables::list_payables,
        handlers::payables::payables_summary,
        handlers::payables::get_payable,
        handlers::payables::record_payment,
    ),
    components(
        schemas(
            crate::models::Supplier,
            crate::models::NewSupplier,
            crate::models::SupplierUpdate,
            crate::models::PurchaseOrder,
            crate::models::PurchaseOrderItem,
            crate::models::PurchaseOrderStatus,
            crate::models::OrderUnit,
            crate::services::NewPurchaseOrder,
            crate::services::NewOrderItem,
            crate::services::ReceiveShipment,
            crate::services::ReceiveLine,
            handlers::purchase_orders::CancelPurchaseOrderRequest,
            crate::models::ProductReceipt,
            crate::models::ReceiptItem,
            crate::models::StockStatus,
            crate::models::SupplierInvoice,
            crate::models::NewInvoice,
            crate::models::InvoiceStatus,
            crate::models::InvoiceDisplayStatus,
            handlers::invoices::RegisteredInvoice,
            crate::models::PayableAccount,
            crate::models::Payment,
            crate::models::NewPayment,
            crate::models::PaymentMethod,
            crate::models::PayableStatus,
            crate::models::PayablesSummary,
            handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    tags(
        (name = "suppliers", description = "Supplier directory"),
        (name = "purchase-orders", description = "Purchase order lifecycle and receiving"),
        (name = "receipts", description = "Product receipts and stock retries"),
        (name = "invoices", description = "Supplier invoices"),
        (name = "payables", description = "Payable accounts and payments"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_procurement_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("POS Procurement API"));
        assert!(json.contains("/api/v1/purchase-orders/{id}/receive"));
        assert!(json.contains("/api/v1/payables/{id}/payments"));
        assert!(json.contains("ErrorResponse"));
    }
}
