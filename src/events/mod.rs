use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::Identity;

/// Why a checkout needs operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// The gateway confirmed the charge but the order could not be written.
    ChargedButNotRecorded,
    /// The charge call timed out or returned an unreadable result.
    PaymentAmbiguous,
}

/// Record handed to whatever reconciles payments against orders.
///
/// Nothing in this crate consumes these beyond logging; a retry or refund
/// worker would subscribe to `Event::ReconciliationRequired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationEvent {
    pub kind: ReconciliationKind,
    pub idempotency_key: String,
    pub amount_minor: i64,
    pub currency: String,
    pub charge_id: Option<String>,
    pub identity: Option<Identity>,
    pub contact_email: String,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// Domain events published by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartLineAdded {
        owner_key: String,
        product_id: i32,
        quantity: i32,
    },
    CartLineUpdated {
        owner_key: String,
        product_id: i32,
        quantity: i32,
    },
    CartLineRemoved {
        owner_key: String,
        product_id: i32,
    },
    CartCleared {
        owner_key: String,
        lines_removed: u64,
    },
    /// A checkout completed. `recipient` is the order's contact email, for
    /// the notification service.
    OrderPlaced {
        order_id: i32,
        user_id: Option<i32>,
        recipient: String,
        paid_amount_minor: i64,
        payment_reference: String,
    },
    /// Ask the notification service to send an order confirmation.
    OrderConfirmationRequested {
        order_id: i32,
        recipient: String,
        order_url: String,
    },
    ReconciliationRequired(ReconciliationEvent),
    UserRegistered {
        user_id: i32,
        username: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the bounded receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Consumes domain events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced {
                order_id,
                user_id,
                paid_amount_minor,
                ref payment_reference,
                ..
            } => {
                info!(
                    order_id,
                    user_id = ?user_id,
                    paid_amount_minor,
                    payment_reference = %payment_reference,
                    "Order placed"
                );
            }
            Event::OrderConfirmationRequested {
                order_id,
                ref order_url,
                ..
            } => {
                info!(order_id, order_url = %order_url, "Order confirmation requested");
            }
            Event::ReconciliationRequired(ref record) => {
                error!(
                    kind = ?record.kind,
                    idempotency_key = %record.idempotency_key,
                    amount_minor = record.amount_minor,
                    charge_id = ?record.charge_id,
                    detail = %record.detail,
                    "Payment requires reconciliation"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}
