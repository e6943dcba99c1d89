use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{money, normalize_email, Identity},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

impl OrderWithItems {
    /// Sum of `unit_price * quantity` over the items, in minor units.
    pub fn items_total_minor(&self) -> i64 {
        self.items.iter().map(order_item::Model::line_total_minor).sum()
    }
}

/// API representation of an order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&order_item::Model> for OrderItemView {
    fn from(item: &order_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price(),
            line_total: money::from_minor_units(item.line_total_minor()),
        }
    }
}

/// API representation of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: i32,
    pub owner: Identity,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub zipcode: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub paid_amount: Decimal,
    pub currency: String,
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemView>>,
}

impl From<&order::Model> for OrderSummary {
    fn from(o: &order::Model) -> Self {
        Self {
            id: o.id,
            owner: o.identity(),
            first_name: o.first_name.clone(),
            last_name: o.last_name.clone(),
            email: o.email.clone(),
            phone: o.phone.clone(),
            address: o.address.clone(),
            zipcode: o.zipcode.clone(),
            city: o.city.clone(),
            state: o.state.clone(),
            country: o.country.clone(),
            paid_amount: o.paid_amount(),
            currency: o.currency.clone(),
            payment_reference: o.payment_reference.clone(),
            created_at: o.created_at,
            items: None,
        }
    }
}

impl From<&OrderWithItems> for OrderSummary {
    fn from(o: &OrderWithItems) -> Self {
        let mut summary = OrderSummary::from(&o.order);
        summary.items = Some(o.items.iter().map(OrderItemView::from).collect());
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub page: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

/// What was handed to the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub order_id: i32,
    pub recipient: String,
    pub order_url: String,
}

/// Order lookup and guest/registered identity reconciliation.
///
/// Orders are only ever read here. Every listing is newest first, ties
/// broken by id.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    frontend_base_url: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        frontend_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            event_sender,
            frontend_base_url: frontend_base_url.into(),
        }
    }

    /// "Did my order go through?"
    ///
    /// With a user id the order must belong to that user and carry `email`;
    /// without one, id and email alone must match. Emails compare
    /// case-insensitively.
    #[instrument(skip(self, email))]
    pub async fn exists(
        &self,
        order_id: i32,
        email: &str,
        user_id: Option<i32>,
    ) -> Result<bool, ServiceError> {
        let mut query = order::Entity::find()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Email.eq(normalize_email(email)));

        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        Ok(query.count(&*self.db).await? > 0)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, order_id: i32) -> Result<Option<OrderWithItems>, ServiceError> {
        let Some(order) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(None);
        };
        let items = self.items_of(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<OrderWithItems>, ServiceError> {
        let Some(order) = order::Entity::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        let items = self.items_of(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// All orders of a registered user, newest first.
    #[instrument(skip(self))]
    pub async fn find_by_user(&self, user_id: i32) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Self::newest_first(user_id).all(&*self.db).await?)
    }

    /// At most `limit` most recent orders of a user, newest first.
    #[instrument(skip(self))]
    pub async fn find_recent(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Self::newest_first(user_id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// One page (1-based) of a user's order history, newest first.
    #[instrument(skip(self))]
    pub async fn find_by_user_paged(
        &self,
        user_id: i32,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        if page == 0 || per_page == 0 {
            return Err(ServiceError::InvalidInput(
                "page and per_page must be at least 1".to_string(),
            ));
        }

        let paginator = Self::newest_first(user_id).paginate(&*self.db, per_page);
        let counts = paginator.num_items_and_pages().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            orders,
            page,
            per_page,
            total_items: counts.number_of_items,
            total_pages: counts.number_of_pages,
        })
    }

    pub async fn list_items(&self, order_id: i32) -> Result<Vec<order_item::Model>, ServiceError> {
        let exists = order::Entity::find_by_id(order_id)
            .count(&*self.db)
            .await?
            > 0;
        if !exists {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }
        self.items_of(order_id).await
    }

    /// Notification recipient: always the email captured on the order, even
    /// when the owning user's profile email has since changed.
    pub fn resolve_recipient(order: &order::Model) -> &str {
        &order.email
    }

    /// Verifies ownership and asks the notification service to (re)send the
    /// order confirmation.
    #[instrument(skip(self, email))]
    pub async fn request_confirmation(
        &self,
        order_id: i32,
        email: &str,
        user_id: Option<i32>,
    ) -> Result<ConfirmationRequest, ServiceError> {
        if !self.exists(order_id, email, user_id).await? {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order_id
            )));
        }

        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let request = ConfirmationRequest {
            order_id,
            recipient: Self::resolve_recipient(&order).to_string(),
            order_url: self.order_url(order_id),
        };

        self.event_sender
            .send_or_log(Event::OrderConfirmationRequested {
                order_id,
                recipient: request.recipient.clone(),
                order_url: request.order_url.clone(),
            })
            .await;

        info!(order_id, "Order confirmation requested");
        Ok(request)
    }

    pub fn order_url(&self, order_id: i32) -> String {
        format!(
            "{}/orders/{}",
            self.frontend_base_url.trim_end_matches('/'),
            order_id
        )
    }

    async fn items_of(&self, order_id: i32) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?)
    }

    fn newest_first(user_id: i32) -> sea_orm::Select<order::Entity> {
        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
    }
}
