use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{money, Identity};

/// A placed order. Rows are written once by checkout and never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// `None` for guest orders.
    pub user_id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    /// Contact email snapshot. Not unique: a guest may order many times.
    pub email: String,
    pub phone: String,
    pub address: String,
    pub zipcode: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub paid_amount_minor: i64,
    pub currency: String,
    pub payment_reference: String,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    /// Hash of owner, contact email and lines; a key is only replayed for
    /// the submission it was first used with.
    #[serde(skip_serializing, default)]
    pub request_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn paid_amount(&self) -> Decimal {
        money::from_minor_units(self.paid_amount_minor)
    }

    /// Registered owner, or the guest identified by the contact email.
    pub fn identity(&self) -> Identity {
        match self.user_id {
            Some(user_id) => Identity::registered(user_id),
            None => Identity::guest(self.email.clone()),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
