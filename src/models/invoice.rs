use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Stored invoice state. `overdue` is never stored, see [`InvoiceDisplayStatus`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceDisplayStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SupplierInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub purchase_order_id: Option<Uuid>,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub version: i64,
}

impl SupplierInvoice {
    /// Pending and past its due date. The due date itself is still on time.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Pending && now.date_naive() > self.due_date
    }

    pub fn display_status(&self, now: DateTime<Utc>) -> InvoiceDisplayStatus {
        match self.status {
            InvoiceStatus::Paid => InvoiceDisplayStatus::Paid,
            InvoiceStatus::Pending if self.is_overdue(now) => InvoiceDisplayStatus::Overdue,
            InvoiceStatus::Pending => InvoiceDisplayStatus::Pending,
        }
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = InvoiceStatus::Paid;
        self.paid_date = Some(now);
    }

    pub fn matches(&self, filter: &InvoiceFilter, now: DateTime<Utc>) -> bool {
        if let Some(status) = filter.status {
            if self.display_status(now) != status {
                return false;
            }
        }
        if let Some(supplier_id) = filter.supplier_id {
            if self.supplier_id != supplier_id {
                return false;
            }
        }
        match filter.search_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let needle = text.to_lowercase();
                self.invoice_number.to_lowercase().contains(&needle)
                    || self.supplier_name.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewInvoice {
    #[validate(length(min = 1, max = 100, message = "Invoice number is required"))]
    pub invoice_number: String,
    pub supplier_id: Uuid,
    pub amount: Decimal,
    pub issue_date: NaiveDate,
    pub purchase_order_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceDisplayStatus>,
    pub supplier_id: Option<Uuid>,
    pub search_text: Option<String>,
}
