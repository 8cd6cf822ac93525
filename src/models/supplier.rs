use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A vendor the store buys from.
///
/// `payment_terms_days` is the net term applied to every invoice the supplier
/// issues; `0` means cash on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact: Option<String>,
    pub tax_id: Option<String>,
    pub payment_terms_days: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supplier {
    pub fn new(input: NewSupplier, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            contact: input.contact,
            tax_id: input.tax_id,
            payment_terms_days: input.payment_terms_days,
            active: input.active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    /// Cash ("contado") suppliers are due on the issue date.
    pub fn is_cash(&self) -> bool {
        self.payment_terms_days == 0
    }

    /// Due date for an invoice issued on `issue_date`. `None` only on calendar overflow.
    pub fn due_date_for(&self, issue_date: NaiveDate) -> Option<NaiveDate> {
        issue_date.checked_add_days(Days::new(u64::from(self.payment_terms_days)))
    }

    pub fn apply_update(&mut self, update: SupplierUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(contact) = update.contact {
            self.contact = Some(contact);
        }
        if let Some(tax_id) = update.tax_id {
            self.tax_id = Some(tax_id);
        }
        if let Some(days) = update.payment_terms_days {
            self.payment_terms_days = days;
        }
        self.updated_at = now;
    }

    pub fn matches_search(&self, search_text: &str) -> bool {
        let needle = search_text.trim().to_lowercase();
        needle.is_empty() || self.name.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewSupplier {
    #[validate(length(min = 1, max = 200, message = "Supplier name is required"))]
    pub name: String,
    #[validate(length(max = 200))]
    pub contact: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub payment_terms_days: u32,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct SupplierUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 200))]
    pub contact: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    pub payment_terms_days: Option<u32>,
}
