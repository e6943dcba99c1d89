use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::money;

/// Read-only catalog product. Catalog management lives elsewhere; this table
/// only mirrors the id, display name and current price.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub price_minor: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn price(&self) -> Decimal {
        money::from_minor_units(self.price_minor)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
