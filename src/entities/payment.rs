use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payable_account_id: Uuid,
    /// Order of the payment in the account history.
    pub position: i32,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub method: String,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub recorded_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payable_account::Entity",
        from = "Column::PayableAccountId",
        to = "super::payable_account::Column::Id"
    )]
    PayableAccount,
}

impl Related<super::payable_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayableAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
