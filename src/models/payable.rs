use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::invoice::SupplierInvoice;
use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayableStatus {
    Pending,
    Partial,
    Paid,
}

impl PayableStatus {
    /// `balance == 0 -> paid`, `balance == amount -> pending`, anything between is `partial`.
    pub fn derive(amount: Decimal, balance: Decimal) -> Self {
        if balance.is_zero() {
            Self::Paid
        } else if balance == amount {
            Self::Pending
        } else {
            Self::Partial
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Check,
    Card,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    /// Caller-supplied idempotency key.
    pub reference: Option<String>,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayableAccount {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: PayableStatus,
    pub due_date: NaiveDate,
    pub payments: Vec<Payment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl PayableAccount {
    /// The account paired with a freshly registered invoice.
    pub fn open_for(invoice: &SupplierInvoice, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_id: invoice.supplier_id,
            supplier_name: invoice.supplier_name.clone(),
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            amount: invoice.amount,
            amount_paid: Decimal::ZERO,
            balance: invoice.amount,
            status: PayableStatus::Pending,
            due_date: invoice.due_date,
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != PayableStatus::Paid && now.date_naive() > self.due_date
    }

    pub fn payment_with_reference(&self, reference: &str) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|payment| payment.reference.as_deref() == Some(reference))
    }

    /// Appends a payment and re-derives balance and status.
    ///
    /// Rejects non-positive amounts and anything above the balance; the account
    /// is left untouched on error.
    pub fn apply_payment(&mut self, payment: Payment) -> Result<(), ServiceError> {
        if payment.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(payment.amount));
        }
        if payment.amount > self.balance {
            return Err(ServiceError::Overpayment {
                payable_id: self.id,
                amount: payment.amount,
                balance: self.balance,
            });
        }
        self.amount_paid += payment.amount;
        self.balance -= payment.amount;
        self.status = PayableStatus::derive(self.amount, self.balance);
        self.updated_at = payment.date;
        self.payments.push(payment);
        Ok(())
    }

    pub fn matches(&self, filter: &PayableFilter, now: DateTime<Utc>) -> bool {
        if let Some(status) = filter.status {
            if self.status != status {
                return false;
            }
        }
        if let Some(supplier_id) = filter.supplier_id {
            if self.supplier_id != supplier_id {
                return false;
            }
        }
        !filter.overdue_only || self.is_overdue(now)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PayableFilter {
    pub status: Option<PayableStatus>,
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub overdue_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayablesSummary {
    pub total_outstanding: Decimal,
    pub open_count: usize,
    pub overdue_count: usize,
    pub overdue_amount: Decimal,
}

impl PayablesSummary {
    pub fn from_accounts<'a>(
        accounts: impl IntoIterator<Item = &'a PayableAccount>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut summary = Self {
            total_outstanding: Decimal::ZERO,
            open_count: 0,
            overdue_count: 0,
            overdue_amount: Decimal::ZERO,
        };
        for account in accounts {
            if account.status == PayableStatus::Paid {
                continue;
            }
            summary.open_count += 1;
            summary.total_outstanding += account.balance;
            if account.is_overdue(now) {
                summary.overdue_count += 1;
                summary.overdue_amount += account.balance;
            }
        }
        summary
    }
}
