use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "supplier_invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub invoice_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub purchase_order_id: Option<Uuid>,
    pub amount: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::payable_account::Entity")]
    PayableAccount,
}

impl Related<super::payable_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayableAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
