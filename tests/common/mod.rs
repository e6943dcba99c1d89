#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use mockall::mock;
use powerpet_api::{
    config::AppConfig,
    db,
    entities::{order, product},
    events::{Event, EventSender},
    handlers::AppServices,
    models::money,
    services::{
        cart::IdentityLocks,
        catalog::{Catalog, DbCatalog},
        checkout::{CheckoutLine, CheckoutRequest, CheckoutService},
        orders::OrderService,
        payments::{ChargeReceipt, ChargeRequest, PaymentError, PaymentGateway},
        pricing::PricingResolver,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, PaymentError>;
    }
}

/// Gateway that captures exactly the requested amount.
pub fn approving_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_charge().returning(|req| Ok(receipt_for(&req)));
    gateway
}

pub fn receipt_for(req: &ChargeRequest) -> ChargeReceipt {
    ChargeReceipt {
        charge_id: format!("ch_{}", &req.idempotency_key[..12.min(req.idempotency_key.len())]),
        amount_minor: req.amount_minor,
        currency: req.currency.clone(),
        status: "succeeded".to_string(),
    }
}

/// Gateway that answers after `delay`.
pub struct SlowGateway {
    pub delay: Duration,
}

#[async_trait]
impl PaymentGateway for SlowGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, PaymentError> {
        tokio::time::sleep(self.delay).await;
        Ok(receipt_for(&request))
    }
}

/// Application wired against a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(approving_gateway())).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        cfg.payment_timeout_secs = 2;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = EventSender::channel(1024);
        let event_sender = Arc::new(event_sender);

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), gateway, &cfg);
        let state = Arc::new(AppState {
            db: db_arc.clone(),
            config: cfg.clone(),
            event_sender: event_sender.clone(),
            services,
        });

        Self {
            router: powerpet_api::build_router(state.clone()),
            state,
            db: db_arc,
            config: cfg,
            event_sender,
            events: Mutex::new(event_rx),
        }
    }

    /// A checkout service over this app's database with its own gateway and
    /// charge timeout.
    pub fn checkout_service(
        &self,
        gateway: Arc<dyn PaymentGateway>,
        payment_timeout: Duration,
    ) -> CheckoutService {
        self.checkout_with_locks(gateway, payment_timeout, IdentityLocks::new())
    }

    pub fn checkout_with_locks(
        &self,
        gateway: Arc<dyn PaymentGateway>,
        payment_timeout: Duration,
        locks: IdentityLocks,
    ) -> CheckoutService {
        let catalog: Arc<dyn Catalog> = Arc::new(DbCatalog::new(self.db.clone()));
        CheckoutService::new(
            self.db.clone(),
            self.event_sender.clone(),
            PricingResolver::new(catalog),
            gateway,
            self.orders(),
            locks,
            "USD",
            "Charge from Pet Power Pro",
            payment_timeout,
        )
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(
            self.db.clone(),
            self.event_sender.clone(),
            self.config.frontend_base_url.clone(),
        )
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_string()),
            price_minor: Set(money::to_minor_units(price).expect("price in range")),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn set_price(&self, product: &product::Model, price: Decimal) {
        let mut active: product::ActiveModel = product.clone().into();
        active.price_minor = Set(money::to_minor_units(price).expect("price in range"));
        active.update(&*self.db).await.expect("update price");
    }

    /// Inserts an order directly, bypassing checkout.
    pub async fn seed_order(
        &self,
        user_id: Option<i32>,
        email: &str,
        created_at: DateTime<Utc>,
    ) -> order::Model {
        order::ActiveModel {
            user_id: Set(user_id),
            first_name: Set("Ada".into()),
            last_name: Set("Lovelace".into()),
            email: Set(email.to_string()),
            phone: Set("555-0100".into()),
            address: Set("1 Main St".into()),
            zipcode: Set("12345".into()),
            city: Set("Springfield".into()),
            state: Set("IL".into()),
            country: Set("US".into()),
            paid_amount_minor: Set(1_000),
            currency: Set("USD".into()),
            payment_reference: Set(format!("ch_seed_{}", Uuid::new_v4().simple())),
            idempotency_key: Set(format!("seed_{}", Uuid::new_v4().simple())),
            request_fingerprint: Set(String::new()),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed order")
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("count orders")
    }

    /// Events published so far, oldest first.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// A valid submission for `lines` of `(product_id, quantity)`.
pub fn checkout_request(lines: &[(i32, i32)]) -> CheckoutRequest {
    CheckoutRequest {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "a@x.com".into(),
        phone: "555-0100".into(),
        address: "1 Main St".into(),
        zipcode: "12345".into(),
        city: "Springfield".into(),
        state: "IL".into(),
        country: "US".into(),
        payment_token: "tok_visa".into(),
        idempotency_key: None,
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| CheckoutLine {
                product_id,
                quantity,
                claimed_unit_price: None,
            })
            .collect(),
    }
}
