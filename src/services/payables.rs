use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{consts, ensure_allowed, Authorizer};
use crate::context::{Actor, Clock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::{
    InvoiceStatus, NewPayment, PayableAccount, PayableFilter, PayablesSummary, Payment,
    SupplierInvoice,
};
use crate::repositories::{InvoiceRepository, PayableRepository};

/// Amortizes invoice balances through payments.
///
/// Every write is conditional on the account version that was read, so two
/// concurrent payments can never both spend the same balance.
pub struct PayableLedger {
    payables: Arc<dyn PayableRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    events: Arc<EventSender>,
    write_retries: u32,
}

impl PayableLedger {
    pub fn new(
        payables: Arc<dyn PayableRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        events: Arc<EventSender>,
        write_retries: u32,
    ) -> Self {
        Self {
            payables,
            invoices,
            authorizer,
            clock,
            events,
            write_retries,
        }
    }

    /// Applies a payment. A payment whose `reference` is already on the
    /// account is treated as a resubmission and changes nothing.
    #[instrument(skip(self, actor, input), fields(actor = %actor.id, payable_id = %payable_id, amount = %input.amount))]
    pub async fn record_payment(
        &self,
        actor: &Actor,
        payable_id: Uuid,
        input: NewPayment,
    ) -> Result<PayableAccount, ServiceError> {
        input.validate()?;
        if input.amount <= Decimal::ZERO {
            metrics::PAYMENT_REJECTIONS
                .with_label_values(&["invalid_amount"])
                .inc();
            return Err(ServiceError::InvalidAmount(input.amount));
        }
        ensure_allowed(
            self.authorizer.as_ref(),
            actor,
            consts::PAYABLES_RECORD_PAYMENT,
            &payable_id.to_string(),
        )
        .await?;

        for attempt in 0..=self.write_retries {
            let mut account = self.get_payable(payable_id).await?;
            if let Some(reference) = input.reference.as_deref() {
                if account.payment_with_reference(reference).is_some() {
                    info!(reference, "Payment already recorded");
                    return Ok(account);
                }
            }

            let now = self.clock.now();
            let payment = Payment {
                id: Uuid::new_v4(),
                amount: input.amount,
                date: now,
                method: input.method,
                notes: input.notes.clone(),
                reference: input.reference.clone(),
                recorded_by: actor.id.clone(),
            };
            let expected = account.version;
            if let Err(e) = account.apply_payment(payment.clone()) {
                metrics::PAYMENT_REJECTIONS
                    .with_label_values(&[e.code()])
                    .inc();
                return Err(e);
            }
            account.version = expected + 1;

            let settled = if account.balance.is_zero() {
                self.settle_invoice(&account, now).await?
            } else {
                None
            };

            match self
                .payables
                .record_payment(&account, &payment, expected, settled.as_ref())
                .await
            {
                Ok(true) => {
                    metrics::PAYMENTS_RECORDED.inc();
                    self.events
                        .send_or_log(Event::PaymentRecorded {
                            payable_id,
                            payment_id: payment.id,
                            amount: payment.amount,
                            balance: account.balance,
                        })
                        .await;
                    if let Some(invoice) = settled {
                        self.events.send_or_log(Event::InvoicePaid(invoice.id)).await;
                    }
                    info!(
                        balance = %account.balance,
                        status = %account.status,
                        "Payment recorded"
                    );
                    return Ok(account);
                }
                Ok(false) => {
                    warn!(attempt, "Payable changed underneath payment, retrying");
                }
                // Same reference landed concurrently; the next read returns it.
                Err(ServiceError::Conflict(_)) if input.reference.is_some() => {}
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::ConcurrentModification(payable_id))
    }

    /// The invoice as it should be stored once this payment clears the balance.
    async fn settle_invoice(
        &self,
        account: &PayableAccount,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<SupplierInvoice>, ServiceError> {
        let Some(mut invoice) = self.invoices.get_invoice(account.invoice_id).await? else {
            warn!(invoice_id = %account.invoice_id, "Payable refers to a missing invoice");
            return Ok(None);
        };
        if invoice.status == InvoiceStatus::Paid {
            return Ok(None);
        }
        invoice.mark_paid(now);
        invoice.version += 1;
        Ok(Some(invoice))
    }

    pub async fn get_payable(&self, payable_id: Uuid) -> Result<PayableAccount, ServiceError> {
        self.payables
            .get_payable(payable_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("payable account", payable_id))
    }

    pub async fn payable_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<PayableAccount, ServiceError> {
        self.payables
            .payable_for_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", invoice_id))
    }

    /// Earliest due date first.
    pub async fn list_payables(
        &self,
        filter: &PayableFilter,
    ) -> Result<Vec<PayableAccount>, ServiceError> {
        let now = self.clock.now();
        let mut accounts: Vec<PayableAccount> = self
            .payables
            .list_payables()
            .await?
            .into_iter()
            .filter(|account| account.matches(filter, now))
            .collect();
        accounts.sort_by_key(|a| (a.due_date, a.created_at));
        Ok(accounts)
    }

    pub fn is_overdue(&self, account: &PayableAccount) -> bool {
        account.is_overdue(self.clock.now())
    }

    pub async fn total_outstanding(&self) -> Result<Decimal, ServiceError> {
        Ok(self.summary().await?.total_outstanding)
    }

    pub async fn overdue_count(&self) -> Result<usize, ServiceError> {
        Ok(self.summary().await?.overdue_count)
    }

    pub async fn summary(&self) -> Result<PayablesSummary, ServiceError> {
        let accounts = self.payables.list_payables().await?;
        Ok(PayablesSummary::from_accounts(&accounts, self.clock.now()))
    }
}
