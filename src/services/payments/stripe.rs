use super::gateway::{ChargeReceipt, ChargeRequest, PaymentError, PaymentGateway};
use crate::config::AppConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

const CHARGES_PATH: &str = "/v1/charges";

/// Stripe-compatible charges API adapter.
///
/// Sends one form-encoded `POST /v1/charges` per call with the submission's
/// idempotency key; it never retries.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Configuration(e.to_string()))?;

        Ok(Self::with_client(base_url, secret_key, client))
    }

    /// Build a gateway from an existing client (useful for testing).
    pub fn with_client(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PaymentError> {
        let secret_key = config
            .payment_secret_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::Configuration("payment_secret_key is not set".into()))?;

        Self::new(
            config.payment_gateway_url.clone(),
            secret_key,
            config.payment_timeout(),
        )
    }

    fn classify_send_error(err: reqwest::Error) -> PaymentError {
        // A connect timeout reports both flags; the request never left.
        if err.is_connect() || err.is_builder() {
            PaymentError::Network(err.to_string())
        } else if err.is_timeout() {
            PaymentError::Timeout
        } else {
            // The request may have reached the provider.
            PaymentError::Unknown(err.to_string())
        }
    }

    fn classify_error_status(status: StatusCode, body: Option<StripeErrorBody>) -> PaymentError {
        let detail = body.map(|b| b.error);
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        let is_card_error = detail
            .as_ref()
            .and_then(|d| d.kind.as_deref())
            .map(|k| k == "card_error")
            .unwrap_or(false);

        if status == StatusCode::PAYMENT_REQUIRED || is_card_error {
            let code = detail.and_then(|d| d.decline_code.or(d.code));
            return PaymentError::Declined { code, message };
        }

        PaymentError::Gateway {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount_minor = request.amount_minor, idempotency_key = %request.idempotency_key))]
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, PaymentError> {
        let url = format!("{}{}", self.base_url, CHARGES_PATH);
        let form = [
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("description", request.description.clone()),
            ("source", request.token.clone()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(Self::classify_send_error)?;

        let status = response.status();
        if status.is_success() {
            let charge: StripeCharge = response
                .json()
                .await
                .map_err(|e| PaymentError::Unknown(format!("unreadable charge response: {}", e)))?;

            if charge.status == "failed" {
                return Err(PaymentError::Declined {
                    code: None,
                    message: format!("charge {} failed", charge.id),
                });
            }

            info!(charge_id = %charge.id, status = %charge.status, "Charge captured");
            return Ok(ChargeReceipt {
                charge_id: charge.id,
                amount_minor: charge.amount,
                currency: charge.currency.to_uppercase(),
                status: charge.status,
            });
        }

        let body = response.json::<StripeErrorBody>().await.ok();
        let err = Self::classify_error_status(status, body);
        warn!(status = status.as_u16(), error = %err, "Charge rejected");
        Err(err)
    }
}
