pub mod carts;
pub mod checkout;
pub mod common;
pub mod identity;
pub mod orders;
pub mod users;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        cart::{CartService, IdentityLocks},
        catalog::{Catalog, DbCatalog},
        checkout::CheckoutService,
        orders::OrderService,
        payments::PaymentGateway,
        pricing::PricingResolver,
        users::UserService,
    },
};
use std::sync::Arc;

pub use crate::AppState;

/// Services layer used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    /// Wires the services against the database catalog. Cart and checkout
    /// share one set of identity locks.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let catalog: Arc<dyn Catalog> = Arc::new(DbCatalog::new(db_pool.clone()));
        Self::with_catalog(db_pool, event_sender, gateway, catalog, config)
    }

    pub fn with_catalog(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn Catalog>,
        config: &AppConfig,
    ) -> Self {
        let locks = IdentityLocks::new();

        let orders = OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.frontend_base_url.clone(),
        );
        let cart = CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            catalog.clone(),
            locks.clone(),
        );
        let checkout = CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            PricingResolver::new(catalog),
            gateway,
            orders.clone(),
            locks,
            config.currency.clone(),
            config.payment_description.clone(),
            config.payment_timeout(),
        );
        let users = UserService::new(db_pool, event_sender);

        Self {
            cart: Arc::new(cart),
            checkout: Arc::new(checkout),
            orders: Arc::new(orders),
            users: Arc::new(users),
        }
    }
}
