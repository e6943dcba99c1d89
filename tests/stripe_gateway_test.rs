use std::time::Duration;

use assert_matches::assert_matches;
use powerpet_api::services::payments::{ChargeRequest, PaymentError, PaymentGateway, StripeGateway};
use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn charge(amount_minor: i64) -> ChargeRequest {
    ChargeRequest {
        amount_minor,
        currency: "USD".into(),
        token: "tok_visa".into(),
        idempotency_key: "chk_test_key".into(),
        description: "Charge from Pet Power Pro".into(),
    }
}

fn gateway(server: &MockServer, timeout: Duration) -> StripeGateway {
    StripeGateway::new(server.uri(), "sk_test_123", timeout).expect("client builds")
}

#[tokio::test]
async fn successful_charge_returns_a_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header("Idempotency-Key", "chk_test_key"))
        .and(body_string_contains("amount=2500"))
        .and(body_string_contains("currency=usd"))
        .and(body_string_contains("source=tok_visa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ch_123",
            "amount": 2500,
            "currency": "usd",
            "status": "succeeded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway(&server, Duration::from_secs(5))
        .charge(charge(2_500))
        .await
        .unwrap();

    assert_eq!(receipt.charge_id, "ch_123");
    assert_eq!(receipt.amount_minor, 2_500);
    assert_eq!(receipt.currency, "USD");
}

#[tokio::test]
async fn card_decline_is_declined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "decline_code": "insufficient_funds",
                "message": "Your card has insufficient funds."
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_secs(5))
        .charge(charge(1_000))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PaymentError::Declined {
            code: Some("insufficient_funds".into()),
            message: "Your card has insufficient funds.".into()
        }
    );
    assert!(!err.is_ambiguous());
}

#[tokio::test]
async fn server_error_is_a_gateway_error_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "type": "api_error", "message": "Something went wrong" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_secs(5))
        .charge(charge(1_000))
        .await
        .unwrap_err();

    assert_matches!(err, PaymentError::Gateway { status: 500, .. });
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "id": "ch_late",
                    "amount": 1000,
                    "currency": "usd",
                    "status": "succeeded"
                }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_millis(200))
        .charge(charge(1_000))
        .await
        .unwrap_err();

    assert_eq!(err, PaymentError::Timeout);
    assert!(err.is_ambiguous());
}

#[tokio::test]
async fn unreadable_success_body_is_ambiguous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server, Duration::from_secs(5))
        .charge(charge(1_000))
        .await
        .unwrap_err();

    assert_matches!(err, PaymentError::Unknown(_));
}

#[tokio::test]
async fn unreachable_provider_is_a_network_error() {
    let gateway = StripeGateway::new("http://127.0.0.1:9", "sk_test_123", Duration::from_secs(2))
        .expect("client builds");

    let err = gateway.charge(charge(1_000)).await.unwrap_err();

    assert_matches!(err, PaymentError::Network(_));
}

#[tokio::test]
async fn connect_timeout_is_a_network_error_not_ambiguous() {
    // Non-routable address: the connection attempt stalls until the connect timeout.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(200))
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client builds");
    let gateway = StripeGateway::with_client("http://10.255.255.1:81", "sk_test_123", client);

    let err = gateway.charge(charge(1_000)).await.unwrap_err();

    assert_matches!(err, PaymentError::Network(_));
    assert!(!err.is_ambiguous());
}
