use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{money, Identity};

/// One product line in an identity's cart.
///
/// `owner_key` is the storage form of the owning [`Identity`]; exactly one of
/// `user_id` / `guest_token` is set. `(owner_key, product_id)` is unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_key: String,
    pub user_id: Option<i32>,
    pub guest_token: Option<String>,
    pub product_id: i32,
    pub quantity: i32,
    /// Price seen when the line was added. Advisory only.
    pub unit_price_minor: i64,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn identity(&self) -> Option<Identity> {
        Identity::from_columns(self.user_id, self.guest_token.clone())
    }

    pub fn unit_price(&self) -> Decimal {
        money::from_minor_units(self.unit_price_minor)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
