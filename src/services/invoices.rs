use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::SupplierDirectory;
use crate::auth::{consts, ensure_allowed, Authorizer};
use crate::context::{Actor, Clock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::{
    InvoiceFilter, InvoiceStatus, NewInvoice, PayableAccount, PurchaseOrderStatus,
    SupplierInvoice,
};
use crate::repositories::{InvoiceRepository, PayableRepository, PurchaseOrderRepository};

/// Records supplier bills and opens the matching payable account.
pub struct InvoiceRegister {
    invoices: Arc<dyn InvoiceRepository>,
    payables: Arc<dyn PayableRepository>,
    orders: Arc<dyn PurchaseOrderRepository>,
    suppliers: Arc<SupplierDirectory>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    events: Arc<EventSender>,
}

impl InvoiceRegister {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        payables: Arc<dyn PayableRepository>,
        orders: Arc<dyn PurchaseOrderRepository>,
        suppliers: Arc<SupplierDirectory>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        events: Arc<EventSender>,
    ) -> Self {
        Self {
            invoices,
            payables,
            orders,
            suppliers,
            authorizer,
            clock,
            events,
        }
    }

    /// Creates the invoice and its payable account together. The due date is
    /// the issue date plus the supplier's payment terms.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, invoice_number = %input.invoice_number))]
    pub async fn register_invoice(
        &self,
        actor: &Actor,
        input: NewInvoice,
    ) -> Result<(SupplierInvoice, PayableAccount), ServiceError> {
        input.validate()?;
        let invoice_number = input.invoice_number.trim().to_string();
        if invoice_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "Invoice number is required".to_string(),
            ));
        }
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Invoice amount must be positive, got {}",
                input.amount
            )));
        }
        ensure_allowed(self.authorizer.as_ref(), actor, consts::INVOICES_REGISTER, "invoices")
            .await?;

        // Inactive suppliers still send bills for past deliveries.
        let supplier = match self.suppliers.get_supplier(input.supplier_id).await {
            Ok(supplier) => supplier,
            Err(ServiceError::NotFound { .. }) => {
                return Err(ServiceError::UnknownSupplier(input.supplier_id))
            }
            Err(e) => return Err(e),
        };

        if let Some(order_id) = input.purchase_order_id {
            let order = self.orders.get_order(order_id).await?.ok_or_else(|| {
                ServiceError::ValidationError(format!("Purchase order {} does not exist", order_id))
            })?;
            if order.supplier_id != supplier.id {
                return Err(ServiceError::ValidationError(format!(
                    "Purchase order {} belongs to another supplier",
                    order.order_number
                )));
            }
            if order.status != PurchaseOrderStatus::Received {
                return Err(ServiceError::ValidationError(format!(
                    "Purchase order {} has not been received (status {})",
                    order.order_number, order.status
                )));
            }
        }

        if self
            .invoices
            .find_invoice_by_number(supplier.id, &invoice_number)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "invoice {} already registered for supplier {}",
                invoice_number, supplier.name
            )));
        }

        let due_date = supplier.due_date_for(input.issue_date).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Due date for issue date {} is out of range",
                input.issue_date
            ))
        })?;

        let now = self.clock.now();
        let invoice = SupplierInvoice {
            id: Uuid::new_v4(),
            invoice_number,
            supplier_id: supplier.id,
            supplier_name: supplier.name.clone(),
            purchase_order_id: input.purchase_order_id,
            amount: input.amount,
            status: InvoiceStatus::Pending,
            issue_date: input.issue_date,
            due_date,
            paid_date: None,
            notes: input.notes,
            created_at: now,
            created_by: actor.id.clone(),
            version: 0,
        };
        let payable = PayableAccount::open_for(&invoice, now);
        self.invoices
            .insert_invoice_with_payable(&invoice, &payable)
            .await?;

        metrics::INVOICES_REGISTERED.inc();
        self.events
            .send_or_log(Event::InvoiceRegistered {
                invoice_id: invoice.id,
                payable_id: payable.id,
                amount: invoice.amount,
                due_date: invoice.due_date,
            })
            .await;
        info!(
            invoice_id = %invoice.id,
            payable_id = %payable.id,
            due_date = %invoice.due_date,
            "Invoice registered"
        );
        Ok((invoice, payable))
    }

    /// Flags an invoice as paid. Only allowed once its payable balance is
    /// zero; normally the ledger has already done this when the last payment
    /// landed.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn mark_invoice_paid(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
    ) -> Result<SupplierInvoice, ServiceError> {
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::INVOICES_MARK_PAID,
            &invoice_id.to_string(),
        )
        .await?;

        let mut invoice = self.get_invoice(invoice_id).await?;
        if invoice.status == InvoiceStatus::Paid {
            return Ok(invoice);
        }
        let payable = self
            .payables
            .payable_for_invoice(invoice_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("invoice {} has no payable account", invoice_id))
            })?;
        if payable.balance > Decimal::ZERO {
            return Err(ServiceError::InvalidTransition {
                entity: "invoice",
                id: invoice_id,
                action: "mark_paid",
                current: format!("{} (balance {})", payable.status, payable.balance),
            });
        }

        let expected = invoice.version;
        invoice.mark_paid(self.clock.now());
        invoice.version = expected + 1;
        if !self.invoices.update_invoice(&invoice, expected).await? {
            return Err(ServiceError::ConcurrentModification(invoice_id));
        }
        self.events.send_or_log(Event::InvoicePaid(invoice_id)).await;
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<SupplierInvoice, ServiceError> {
        self.invoices
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", invoice_id))
    }

    /// Newest issue date first. An `overdue` status filter uses the derived
    /// status as of now.
    pub async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
    ) -> Result<Vec<SupplierInvoice>, ServiceError> {
        let now = self.clock.now();
        let mut invoices: Vec<SupplierInvoice> = self
            .invoices
            .list_invoices()
            .await?
            .into_iter()
            .filter(|invoice| invoice.matches(filter, now))
            .collect();
        invoices.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(invoices)
    }
}
