use crate::{
    entities::{cart_line, order, order_item},
    errors::{CheckoutError, ServiceError},
    events::{Event, EventSender, ReconciliationEvent, ReconciliationKind},
    models::{normalize_email, Identity},
    services::{
        cart::{clear_lines, lines_of, IdentityLocks},
        orders::{OrderService, OrderWithItems},
        payments::{ChargeReceipt, ChargeRequest, PaymentError, PaymentGateway},
        pricing::{merge_lines, LineRequest, PricedCart, PricingResolver},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Progress of one submission. Any non-terminal stage may end in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    Received,
    Priced,
    Charged,
    Materialized,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: i32,
    pub quantity: i32,
    /// Price the client displayed. Informational; never used for charging.
    #[serde(default)]
    pub claimed_unit_price: Option<Decimal>,
}

/// A checkout submission: contact snapshot, payment token and lines.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub phone: String,
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(min = 1, max = 20))]
    pub zipcode: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[validate(length(min = 1, max = 255))]
    pub payment_token: String,
    #[serde(default)]
    #[validate(length(min = 8, max = 255))]
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "cart is empty"))]
    pub lines: Vec<CheckoutLine>,
}

impl CheckoutRequest {
    fn line_requests(&self) -> Vec<LineRequest> {
        self.lines
            .iter()
            .map(|l| LineRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect()
    }

    /// The submission as JSON with the payment token masked.
    pub fn redacted_payload(&self) -> serde_json::Value {
        let mut copy = self.clone();
        copy.payment_token = "[redacted]".to_string();
        serde_json::to_value(&copy).unwrap_or(serde_json::Value::Null)
    }
}

/// Derives the idempotency key of a submission from the caller's cart.
///
/// Covers the cart lines as stored, including when each was last touched.
/// Retrying the same attempt reuses the key; buying the same items again
/// later does not, because checkout cleared the cart in between.
pub fn derive_idempotency_key(
    identity: &Identity,
    payment_token: &str,
    lines: &[LineRequest],
    cart: &[cart_line::Model],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.owner_key().as_bytes());
    hasher.update(b"|");
    hasher.update(payment_token.as_bytes());
    hash_lines(&mut hasher, lines);

    let mut snapshot: Vec<&cart_line::Model> = cart.iter().collect();
    snapshot.sort_by_key(|l| l.id);
    for line in snapshot {
        hasher.update(
            format!(
                "|cart:{}:{}:{}:{}",
                line.id,
                line.product_id,
                line.quantity,
                line.updated_at.timestamp_nanos_opt().unwrap_or_default()
            )
            .as_bytes(),
        );
    }
    format!("chk_{}", hex::encode(hasher.finalize()))
}

/// Key for a submission with nothing to tie a retry to.
pub fn fresh_idempotency_key() -> String {
    format!("chk_{}", Uuid::new_v4().simple())
}

/// What a stored order must match before its idempotency key is replayed:
/// the owner, the contact email and the merged lines.
pub fn request_fingerprint(identity: Option<&Identity>, email: &str, lines: &[LineRequest]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        identity
            .map(Identity::owner_key)
            .unwrap_or_else(|| "anonymous".to_string())
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(normalize_email(email).as_bytes());
    hash_lines(&mut hasher, lines);
    hex::encode(hasher.finalize())
}

fn hash_lines(hasher: &mut Sha256, lines: &[LineRequest]) {
    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|l| (l.product_id, l.quantity));
    for line in &sorted {
        hasher.update(format!("|{}:{}", line.product_id, line.quantity).as_bytes());
    }
}

/// Turns a submission into a paid order.
///
/// Received -> Priced -> Charged -> Materialized -> Completed. Pricing
/// failures have no side effects. A charge is attempted at most once per
/// call and carries the submission's idempotency key. Once the gateway has
/// been charged, the order, its items and the cart clear are written in one
/// transaction; if that fails the money is reported for reconciliation.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingResolver,
    gateway: Arc<dyn PaymentGateway>,
    orders: OrderService,
    locks: IdentityLocks,
    currency: String,
    payment_description: String,
    payment_timeout: Duration,
}

struct Submission<'a> {
    identity: Option<&'a Identity>,
    request: &'a CheckoutRequest,
    idempotency_key: String,
    fingerprint: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: PricingResolver,
        gateway: Arc<dyn PaymentGateway>,
        orders: OrderService,
        locks: IdentityLocks,
        currency: impl Into<String>,
        payment_description: impl Into<String>,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
            gateway,
            orders,
            locks,
            currency: currency.into(),
            payment_description: payment_description.into(),
            payment_timeout,
        }
    }

    /// Submits a checkout for `identity` (or an anonymous guest when `None`).
    ///
    /// Resubmitting the same submission under the idempotency key of an
    /// existing order returns that order without charging again. A key that
    /// belongs to a different submission is a `ConcurrencyConflict`.
    #[instrument(skip(self, identity, request), fields(identity = ?identity.map(ToString::to_string)))]
    pub async fn submit(
        &self,
        identity: Option<&Identity>,
        request: CheckoutRequest,
    ) -> Result<OrderWithItems, CheckoutError> {
        let mut stage = CheckoutStage::Received;
        let result = self.run(identity, &request, &mut stage).await;

        match &result {
            Ok(placed) => info!(
                order_id = placed.order.id,
                paid_amount_minor = placed.order.paid_amount_minor,
                "Checkout completed"
            ),
            Err(err) if err.requires_reconciliation() => error!(
                stage = ?stage,
                error = %err,
                "Checkout failed after payment was attempted"
            ),
            Err(err) => warn!(stage = ?stage, error = %err, "Checkout failed"),
        }

        result
    }

    async fn run(
        &self,
        identity: Option<&Identity>,
        request: &CheckoutRequest,
        stage: &mut CheckoutStage,
    ) -> Result<OrderWithItems, CheckoutError> {
        request
            .validate()
            .map_err(|e| CheckoutError::InvalidCart(e.to_string()))?;
        if let Some(identity) = identity {
            identity.validate().map_err(CheckoutError::InvalidCart)?;
        }

        let lines = merge_lines(&request.line_requests())?;
        let fingerprint = request_fingerprint(identity, &request.email, &lines);

        // Owner lock first, then the client key; every path takes them in this order.
        let _owner_guard = match identity {
            Some(identity) => Some(self.locks.lock(identity).await),
            None => None,
        };
        let idempotency_key = match (&request.idempotency_key, identity) {
            (Some(key), _) => key.clone(),
            (None, Some(identity)) => {
                let cart = lines_of(&*self.db, identity).await?;
                if cart.is_empty() {
                    fresh_idempotency_key()
                } else {
                    derive_idempotency_key(identity, &request.payment_token, &lines, &cart)
                }
            }
            (None, None) => fresh_idempotency_key(),
        };
        let _key_guard = match &request.idempotency_key {
            Some(key) => Some(self.locks.lock_key(&format!("checkout:{}", key)).await),
            None => None,
        };
        let submission = Submission {
            identity,
            request,
            idempotency_key,
            fingerprint,
        };

        if let Some(existing) = self.existing_order(&submission.idempotency_key).await? {
            if existing.order.request_fingerprint != submission.fingerprint {
                return Err(CheckoutError::ConcurrencyConflict(format!(
                    "idempotency key {} was already used for a different submission; start a new checkout",
                    submission.idempotency_key
                )));
            }
            info!(order_id = existing.order.id, "Returning order for repeated submission");
            return Ok(existing);
        }

        let priced = self.pricing.resolve(&lines).await?;
        if priced.total_minor <= 0 {
            return Err(CheckoutError::InvalidCart(
                "order total must be positive".to_string(),
            ));
        }
        *stage = CheckoutStage::Priced;
        debug!(total_minor = priced.total_minor, "Cart priced");

        let receipt = self.charge(&submission, &priced).await?;
        *stage = CheckoutStage::Charged;

        if receipt.amount_minor != priced.total_minor {
            let reason = format!(
                "gateway captured {} but order total is {}",
                receipt.amount_minor, priced.total_minor
            );
            return Err(self
                .report_unrecorded(&submission, &priced, &receipt, reason)
                .await);
        }

        let placed = match self.materialize(&submission, &priced, &receipt).await {
            Ok(placed) => placed,
            Err(err) => {
                if let Some(existing) = self.concurrent_duplicate(&err, &submission).await
                {
                    return Ok(existing);
                }
                return Err(self
                    .report_unrecorded(&submission, &priced, &receipt, err.to_string())
                    .await);
            }
        };
        *stage = CheckoutStage::Materialized;

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: placed.order.id,
                user_id: placed.order.user_id,
                recipient: OrderService::resolve_recipient(&placed.order).to_string(),
                paid_amount_minor: placed.order.paid_amount_minor,
                payment_reference: placed.order.payment_reference.clone(),
            })
            .await;
        *stage = CheckoutStage::Completed;

        Ok(placed)
    }

    async fn existing_order(&self, key: &str) -> Result<Option<OrderWithItems>, CheckoutError> {
        match self.orders.find_by_idempotency_key(key).await {
            Ok(found) => Ok(found),
            Err(ServiceError::DatabaseError(db)) => Err(CheckoutError::DatabaseError(db)),
            Err(other) => Err(CheckoutError::DatabaseError(DbErr::Custom(other.to_string()))),
        }
    }

    /// Single charge attempt bounded by the payment timeout.
    async fn charge(
        &self,
        submission: &Submission<'_>,
        priced: &PricedCart,
    ) -> Result<ChargeReceipt, CheckoutError> {
        let charge = ChargeRequest {
            amount_minor: priced.total_minor,
            currency: self.currency.clone(),
            token: submission.request.payment_token.clone(),
            idempotency_key: submission.idempotency_key.clone(),
            description: self.payment_description.clone(),
        };

        let outcome = tokio::time::timeout(self.payment_timeout, self.gateway.charge(charge)).await;

        let err = match outcome {
            Ok(Ok(receipt)) => return Ok(receipt),
            Ok(Err(err)) => err,
            Err(_) => PaymentError::Timeout,
        };

        match err {
            PaymentError::Declined { message, .. } => Err(CheckoutError::PaymentDeclined(message)),
            err if err.is_ambiguous() => {
                error!(
                    idempotency_key = %submission.idempotency_key,
                    amount_minor = priced.total_minor,
                    error = %err,
                    submission = %submission.request.redacted_payload(),
                    "Payment outcome is ambiguous"
                );
                self.publish_reconciliation(
                    ReconciliationKind::PaymentAmbiguous,
                    submission,
                    priced.total_minor,
                    None,
                    err.to_string(),
                )
                .await;
                Err(CheckoutError::PaymentAmbiguous {
                    idempotency_key: submission.idempotency_key.clone(),
                })
            }
            err => Err(CheckoutError::PaymentGatewayError(err.to_string())),
        }
    }

    /// Writes the order, its items and the cart clear in one transaction.
    async fn materialize(
        &self,
        submission: &Submission<'_>,
        priced: &PricedCart,
        receipt: &ChargeReceipt,
    ) -> Result<OrderWithItems, DbErr> {
        let request = submission.request;
        let user_id = submission.identity.and_then(Identity::user_id);
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            user_id: Set(user_id),
            first_name: Set(request.first_name.trim().to_string()),
            last_name: Set(request.last_name.trim().to_string()),
            email: Set(normalize_email(&request.email)),
            phone: Set(request.phone.trim().to_string()),
            address: Set(request.address.trim().to_string()),
            zipcode: Set(request.zipcode.trim().to_string()),
            city: Set(request.city.trim().to_string()),
            state: Set(request.state.trim().to_string()),
            country: Set(request.country.trim().to_string()),
            paid_amount_minor: Set(priced.total_minor),
            currency: Set(self.currency.clone()),
            payment_reference: Set(receipt.charge_id.clone()),
            idempotency_key: Set(submission.idempotency_key.clone()),
            request_fingerprint: Set(submission.fingerprint.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            let unit_price_minor = line.unit_price_minor().ok_or_else(|| {
                DbErr::Custom(format!("unit price of {} out of range", line.product_id))
            })?;
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                purchaser_user_id: Set(user_id),
                product_id: Set(line.product_id),
                unit_price_minor: Set(unit_price_minor),
                quantity: Set(line.quantity),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let cleared = match submission.identity {
            Some(identity) => clear_lines(&txn, identity).await?,
            None => 0,
        };

        txn.commit().await?;
        debug!(order_id = order.id, cleared, "Order materialized");

        Ok(OrderWithItems { order, items })
    }

    /// Another writer stored the same submission first; its order stands.
    async fn concurrent_duplicate(
        &self,
        err: &DbErr,
        submission: &Submission<'_>,
    ) -> Option<OrderWithItems> {
        if !matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            return None;
        }
        self.orders
            .find_by_idempotency_key(&submission.idempotency_key)
            .await
            .ok()
            .flatten()
            .filter(|existing| existing.order.request_fingerprint == submission.fingerprint)
    }

    async fn report_unrecorded(
        &self,
        submission: &Submission<'_>,
        priced: &PricedCart,
        receipt: &ChargeReceipt,
        reason: String,
    ) -> CheckoutError {
        error!(
            charge_id = %receipt.charge_id,
            receipt = ?receipt,
            idempotency_key = %submission.idempotency_key,
            amount_minor = priced.total_minor,
            reason = %reason,
            submission = %submission.request.redacted_payload(),
            "Charged but order was not recorded"
        );

        self.publish_reconciliation(
            ReconciliationKind::ChargedButNotRecorded,
            submission,
            receipt.amount_minor,
            Some(receipt.charge_id.clone()),
            reason.clone(),
        )
        .await;

        CheckoutError::ChargedButNotRecorded {
            charge_id: receipt.charge_id.clone(),
            amount_minor: receipt.amount_minor,
            idempotency_key: submission.idempotency_key.clone(),
            reason,
        }
    }

    async fn publish_reconciliation(
        &self,
        kind: ReconciliationKind,
        submission: &Submission<'_>,
        amount_minor: i64,
        charge_id: Option<String>,
        detail: String,
    ) {
        self.event_sender
            .send_or_log(Event::ReconciliationRequired(ReconciliationEvent {
                kind,
                idempotency_key: submission.idempotency_key.clone(),
                amount_minor,
                currency: self.currency.clone(),
                charge_id,
                identity: submission.identity.cloned(),
                contact_email: normalize_email(&submission.request.email),
                detail,
                occurred_at: Utc::now(),
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(pairs: &[(i32, i32)]) -> Vec<LineRequest> {
        pairs
            .iter()
            .map(|&(product_id, quantity)| LineRequest {
                product_id,
                quantity,
            })
            .collect()
    }

    fn cart_line(id: i32, product_id: i32, quantity: i32, touched_secs: i64) -> cart_line::Model {
        let at = chrono::DateTime::from_timestamp(touched_secs, 0).unwrap();
        cart_line::Model {
            id,
            owner_key: "user:3".into(),
            user_id: Some(3),
            guest_token: None,
            product_id,
            quantity,
            unit_price_minor: 1_000,
            added_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn derived_key_ignores_line_order() {
        let identity = Identity::registered(3);
        let cart = [cart_line(1, 1, 2, 100), cart_line(2, 2, 1, 100)];
        let a = derive_idempotency_key(&identity, "tok", &lines(&[(1, 2), (2, 1)]), &cart);
        let b = derive_idempotency_key(&identity, "tok", &lines(&[(2, 1), (1, 2)]), &cart);
        assert_eq!(a, b);
        assert!(a.starts_with("chk_"));
    }

    #[test]
    fn derived_key_changes_when_the_cart_is_rebuilt() {
        let identity = Identity::registered(3);
        let submitted = lines(&[(1, 1)]);
        let first = derive_idempotency_key(&identity, "tok", &submitted, &[cart_line(1, 1, 1, 100)]);
        let same_id_later =
            derive_idempotency_key(&identity, "tok", &submitted, &[cart_line(1, 1, 1, 200)]);
        let new_line = derive_idempotency_key(&identity, "tok", &submitted, &[cart_line(7, 1, 1, 100)]);
        assert_ne!(first, same_id_later);
        assert_ne!(first, new_line);
    }

    #[test]
    fn fresh_keys_are_unique() {
        assert_ne!(fresh_idempotency_key(), fresh_idempotency_key());
    }

    #[test]
    fn fingerprint_depends_on_owner_email_and_lines() {
        let base = request_fingerprint(None, "a@x.com", &lines(&[(1, 1)]));
        assert_eq!(base, request_fingerprint(None, " A@X.com", &lines(&[(1, 1)])));
        assert_ne!(
            base,
            request_fingerprint(Some(&Identity::guest("g")), "a@x.com", &lines(&[(1, 1)]))
        );
        assert_ne!(base, request_fingerprint(None, "b@x.com", &lines(&[(1, 1)])));
        assert_ne!(base, request_fingerprint(None, "a@x.com", &lines(&[(1, 2)])));
    }

    #[test]
    fn redacted_payload_masks_token() {
        let request = CheckoutRequest {
            first_name: "Ada".into(),
            last_name: "L".into(),
            email: "a@x.com".into(),
            phone: "555".into(),
            address: "1 Main".into(),
            zipcode: "12345".into(),
            city: "Town".into(),
            state: "CA".into(),
            country: "US".into(),
            payment_token: "tok_secret".into(),
            idempotency_key: None,
            lines: vec![],
        };
        let payload = request.redacted_payload();
        assert_eq!(payload["payment_token"], "[redacted]");
        assert_eq!(payload["email"], "a@x.com");
    }
}
