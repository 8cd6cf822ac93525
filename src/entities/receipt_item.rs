use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipt_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub ordered_quantity: i64,
    pub received_quantity: i64,
    pub unit_cost: Decimal,
    pub is_complete: bool,
    pub line_total: Decimal,
    pub stock_applied: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_receipt::Entity",
        from = "Column::ReceiptId",
        to = "super::product_receipt::Column::Id"
    )]
    Receipt,
}

impl Related<super::product_receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
