use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single charge against a payment token, amount in minor units.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    #[serde(skip_serializing)]
    pub token: String,
    /// Forwarded to the provider so a repeated request cannot charge twice.
    pub idempotency_key: String,
    pub description: String,
}

impl fmt::Debug for ChargeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChargeRequest")
            .field("amount_minor", &self.amount_minor)
            .field("currency", &self.currency)
            .field("token", &"[redacted]")
            .field("idempotency_key", &self.idempotency_key)
            .field("description", &self.description)
            .finish()
    }
}

/// Proof of a captured charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    /// Provider's charge reference.
    pub charge_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
}

/// Charge failures. Only `Declined`, `Network` and `Gateway` are definite
/// non-charges; `Timeout` and `Unknown` leave the outcome open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("card declined: {message}")]
    Declined {
        code: Option<String>,
        message: String,
    },

    #[error("payment provider timed out")]
    Timeout,

    #[error("could not reach payment provider: {0}")]
    Network(String),

    #[error("payment provider returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("payment outcome unknown: {0}")]
    Unknown(String),

    #[error("payment gateway misconfigured: {0}")]
    Configuration(String),
}

impl PaymentError {
    /// Whether the provider may have captured the charge anyway.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, PaymentError::Timeout | PaymentError::Unknown(_))
    }
}

/// Payment provider port. Implementations must not retry on their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_token() {
        let request = ChargeRequest {
            amount_minor: 2500,
            currency: "USD".into(),
            token: "tok_visa_secret".into(),
            idempotency_key: "k1".into(),
            description: "Charge".into(),
        };
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("tok_visa_secret"));
        assert!(rendered.contains("2500"));
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("tok_visa_secret"));
    }

    #[test]
    fn only_timeout_and_unknown_are_ambiguous() {
        assert!(PaymentError::Timeout.is_ambiguous());
        assert!(PaymentError::Unknown("eof".into()).is_ambiguous());
        assert!(!PaymentError::Network("refused".into()).is_ambiguous());
        assert!(!PaymentError::Declined {
            code: None,
            message: "no".into()
        }
        .is_ambiguous());
    }
}
