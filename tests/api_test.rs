//! Webhook endpoints driven through the axum router

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use kytapay_webhook::api::{router, AppState};
use kytapay_webhook::payments::providers::ProviderProfile;
use kytapay_webhook::payments::signature::{
    canonical_string, sign_symmetric, DigestCredentials, ProviderCredentials, SignatureVerifier,
    StaticCredentials,
};
use kytapay_webhook::payments::types::{Flow, Provider};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::ServiceExt;

const ACK: &str = r#"{"responseCode":"2002800","responseMessage":"Successful"}"#;
const LINKQU_CLIENT_ID: &str = "linkqu-client";
const LINKQU_CLIENT_SECRET: &str = "linkqu-secret";
const PAKAILINK_SECRET: &str = "pakailink-secret";

fn app(
    store: &Arc<MemoryStore>,
    notifier: &Arc<RecordingNotifier>,
    pakailink_signed: bool,
) -> Router {
    let verifier = SignatureVerifier::new()
        .with_credentials(
            Provider::LinkQu,
            ProviderCredentials::Static(StaticCredentials::new(
                LINKQU_CLIENT_ID,
                LINKQU_CLIENT_SECRET,
            )),
        )
        .with_credentials(
            Provider::PakaiLink,
            ProviderCredentials::Digest(DigestCredentials::symmetric(PAKAILINK_SECRET)),
        );

    let state = AppState::new(
        Arc::new(reconciler(store, notifier)),
        verifier,
        notifier.clone(),
        [
            ProviderProfile::linkqu(),
            ProviderProfile::pakailink(pakailink_signed),
        ],
    );
    router(state)
}

fn linkqu_body(reference: &str, status: &str, amount: u64) -> String {
    format!(
        r#"{{"partner_reff":"{}","status":"{}","amount":{},"transaction_time":"2024-05-01 10:00:00","type":"payment"}}"#,
        reference, status, amount
    )
}

fn linkqu_request(path: &str, secret: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("client-id", LINKQU_CLIENT_ID)
        .header("client-secret", secret)
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_every_branch_gets_the_same_acknowledgement() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payment("GR-700", 3, "QRIS", dec!(100000));
    store.add_payment("GR-701", 3, "QRIS", dec!(100000));
    let app = app(&store, &notifier, false);
    let path = "/payments/linkqu/qris";

    let mut responses = Vec::new();

    // Authentication failure
    responses.push(
        send(&app, linkqu_request(path, "wrong", linkqu_body("GR-700", "SUCCESS", 100000))).await,
    );
    // Malformed body
    responses.push(send(&app, linkqu_request(path, LINKQU_CLIENT_SECRET, "{oops".to_string())).await);
    // Unknown reference
    responses.push(
        send(&app, linkqu_request(path, LINKQU_CLIENT_SECRET, linkqu_body("GR-404", "SUCCESS", 100000)))
            .await,
    );
    // Applied, then duplicate
    responses.push(
        send(&app, linkqu_request(path, LINKQU_CLIENT_SECRET, linkqu_body("GR-700", "SUCCESS", 100000)))
            .await,
    );
    responses.push(
        send(&app, linkqu_request(path, LINKQU_CLIENT_SECRET, linkqu_body("GR-700", "SUCCESS", 100000)))
            .await,
    );
    // Persistence failure
    store.fail_commit(true);
    responses.push(
        send(&app, linkqu_request(path, LINKQU_CLIENT_SECRET, linkqu_body("GR-701", "SUCCESS", 100000)))
            .await,
    );

    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(body, ACK);
    }

    let titles = notifier.titles();
    assert!(titles.contains(&"Unauthorized Callback Attempt".to_string()));
    assert!(titles.contains(&"Callback Error".to_string()));
    assert!(titles.contains(&"Transaction Not Found".to_string()));
    assert!(titles.contains(&"Payment Success".to_string()));
    assert!(titles.contains(&"Duplicate Callback Prevented".to_string()));
    assert!(titles.contains(&"Reconciliation Failed".to_string()));
    assert_eq!(store.wallet_mutations(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_raise_security_alert() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payment("GR-710", 3, "QRIS", dec!(100000));
    let app = app(&store, &notifier, false);

    send(
        &app,
        linkqu_request(
            "/payouts/linkqu/bank",
            "guessed-secret",
            linkqu_body("GR-710", "SUCCESS", 100000),
        ),
    )
    .await;

    let alert = notifier.find("Unauthorized Callback Attempt").unwrap();
    assert_eq!(alert.get("Source"), Some("Bank Payout LinkQu"));
    assert_eq!(alert.get("IP Address"), Some("203.0.113.7"));
    assert_eq!(alert.get("Client ID"), Some(LINKQU_CLIENT_ID));
    assert_eq!(store.ledger_status(Flow::Payment, "GR-710").as_deref(), Some("Pending"));
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn test_missing_reference_raises_callback_error() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    let app = app(&store, &notifier, false);

    let (status, body) = send(
        &app,
        linkqu_request(
            "/payments/linkqu/ewallet",
            LINKQU_CLIENT_SECRET,
            r#"{"status":"SUCCESS","amount":1000}"#.to_string(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACK);
    let warning = notifier.find("Callback Error").unwrap();
    assert_eq!(warning.get("Source"), Some("E-Wallet LinkQu"));
    assert!(warning.get("Issue").unwrap().contains("partner_reff"));
}

#[tokio::test]
async fn test_unsigned_pakailink_callback_is_accepted() {
    // PakaiLink does not sign callbacks unless verification is switched on,
    // so anyone who knows a reference can settle it
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payment("GR-720", 3, "VA", dec!(150000));
    let app = app(&store, &notifier, false);

    let request = Request::builder()
        .method("POST")
        .uri("/payments/pakailink/va")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"transactionData":{"partnerReferenceNo":"GR-720","paymentFlagStatus":"00","callbackType":"payment","paidAmount":{"value":"150000.00"}}}"#,
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACK);
    assert_eq!(store.ledger_status(Flow::Payment, "GR-720").as_deref(), Some("Success"));
    assert!(notifier.find("Unauthorized Callback Attempt").is_none());
}

#[tokio::test]
async fn test_negative_pakailink_payout_is_rejected() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payout("GR-725", 4, "014", dec!(500000));
    let app = app(&store, &notifier, false);

    let request = Request::builder()
        .method("POST")
        .uri("/payouts/pakailink/bank")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"transactionData":{"partnerReferenceNo":"GR-725","paymentFlagStatus":"00","paidAmount":{"value":"-500000.00"}}}"#,
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACK);
    let warning = notifier.find("Callback Error").unwrap();
    assert!(warning.get("Issue").unwrap().contains("greater than zero"));
    assert_eq!(store.ledger_status(Flow::Payout, "GR-725").as_deref(), Some("Pending"));
    assert_eq!(store.wallet_balance(MERCHANT_USER_ID), Some(dec!(1000000)));
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn test_signed_pakailink_callbacks_when_required() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payout("GR-730", 4, "014", dec!(100000));
    let app = app(&store, &notifier, true);
    let path = "/payouts/pakailink/bank";
    let body = r#"{"transactionData": {"partnerReferenceNo": "GR-730", "paymentFlagStatus": "00", "paidAmount": {"value": "100000.00"}}}"#;
    let timestamp = "2024-05-01T10:00:00+07:00";

    let unsigned = Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::from(body))
        .unwrap();
    send(&app, unsigned).await;
    assert_eq!(store.ledger_status(Flow::Payout, "GR-730").as_deref(), Some("Pending"));
    assert_eq!(
        notifier
            .find("Unauthorized Callback Attempt")
            .unwrap()
            .get("Reason"),
        Some("missing signature headers")
    );

    let canonical = canonical_string("POST", path, body.as_bytes(), timestamp).unwrap();
    let signed = Request::builder()
        .method("POST")
        .uri(path)
        .header("x-timestamp", timestamp)
        .header("x-signature", sign_symmetric(PAKAILINK_SECRET, &canonical))
        .body(Body::from(body))
        .unwrap();
    let (status, response) = send(&app, signed).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, ACK);
    assert_eq!(store.ledger_status(Flow::Payout, "GR-730").as_deref(), Some("Success"));
}

#[tokio::test]
async fn test_settlement_notice_through_router() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    store.add_payment("GR-740", 3, "QRIS", dec!(100000));
    let app = app(&store, &notifier, false);

    let body = r#"{"partner_reff":"GR-740","status":"SUCCESS","amount":100000,"type":"SETTLE"}"#;
    send(
        &app,
        linkqu_request("/payments/linkqu/qris", LINKQU_CLIENT_SECRET, body.to_string()),
    )
    .await;

    assert!(notifier.find("Settlement Notification").is_some());
    assert_eq!(store.ledger_status(Flow::Payment, "GR-740").as_deref(), Some("Pending"));
}

#[tokio::test]
async fn test_health_check() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    let app = app(&store, &notifier, false);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "kytapay-webhook");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_not_served() {
    let store = Arc::new(MemoryStore::seeded());
    let notifier = Arc::new(RecordingNotifier::default());
    let app = app(&store, &notifier, false);

    let request = Request::builder()
        .method("POST")
        .uri("/payments/unknown/qris")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
