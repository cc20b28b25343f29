use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use paybridge::adapters::InMemoryTransactionRepository;
use paybridge::clients::{BankGateway, ClientError, MerchantNotifier};
use paybridge::clock::SystemClock;
use paybridge::contracts::{BankInitRequest, BankInitResponse, MerchantCallback};
use paybridge::create_switch_app;
use paybridge::middleware::AdminKey;
use paybridge::services::{MerchantRegistry, SwitchService, SwitchSettings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct StubBank {
    requests: Mutex<Vec<BankInitRequest>>,
    fail: AtomicBool,
}

#[async_trait]
impl BankGateway for StubBank {
    async fn init_session(&self, request: &BankInitRequest) -> Result<BankInitResponse, ClientError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Status(503, "bank unavailable".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        let id = Uuid::new_v4();
        Ok(BankInitResponse {
            payment_id: id,
            payment_url: format!("http://bank.local/api/bank/payments/{}", id),
        })
    }
}

#[derive(Default)]
struct RecordingMerchant {
    deliveries: Mutex<Vec<(String, MerchantCallback)>>,
    fail: AtomicBool,
}

#[async_trait]
impl MerchantNotifier for RecordingMerchant {
    async fn deliver(&self, url: &str, callback: &MerchantCallback) -> Result<(), ClientError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Status(500, "merchant down".to_string()));
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((url.to_string(), callback.clone()));
        Ok(())
    }
}

struct TestApp {
    app: Router,
    bank: Arc<StubBank>,
    merchant: Arc<RecordingMerchant>,
}

fn test_app(admin_key: Option<&str>) -> TestApp {
    let bank = Arc::new(StubBank::default());
    let merchant = Arc::new(RecordingMerchant::default());
    let service = SwitchService::new(
        Arc::new(InMemoryTransactionRepository::new()),
        bank.clone(),
        merchant.clone(),
        MerchantRegistry::new(HashMap::from([(
            "webshop-1".to_string(),
            "s3cret".to_string(),
        )])),
        Arc::new(SystemClock),
        SwitchSettings {
            bank_merchant_id: "switch-001".to_string(),
            checkout_base_url: "http://switch.local".to_string(),
        },
    );
    TestApp {
        app: create_switch_app(service, AdminKey::new(admin_key.map(str::to_string))),
        bank,
        merchant,
    }
}

fn init_body() -> Value {
    json!({
        "merchant_id": "webshop-1",
        "merchant_secret": "s3cret",
        "amount": "35.00",
        "currency": "eur",
        "order_id": "order-42",
        "timestamp": Utc::now(),
        "success_url": "http://shop.local/payment/success",
        "fail_url": "http://shop.local/payment/fail",
        "error_url": "http://shop.local/payment/error",
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_transaction(app: &Router) -> String {
    let (status, body) = send(app, post_json("/api/switch/transactions/init", &init_body())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["transaction_id"].as_str().unwrap().to_string()
}

/// Creates a transaction and opens its bank session. Returns the
/// transaction id, the bank session id and the STAN sent to the bank.
async fn redirected_transaction(t: &TestApp) -> (String, String, String) {
    let id = create_transaction(&t.app).await;
    let (status, body) = send(
        &t.app,
        post_json(&format!("/api/switch/checkout/{}/card", id), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let session_id = body["bank_payment_id"].as_str().unwrap().to_string();
    let stan = t.bank.requests.lock().unwrap().last().unwrap().stan.clone().unwrap();
    (id, session_id, stan)
}

fn notification(transaction_id: &str, session_id: &str, stan: &str, status: &str) -> Value {
    json!({
        "transaction_id": transaction_id,
        "session_id": session_id,
        "status": status,
        "stan": stan,
        "bank_timestamp": Utc::now(),
    })
}

#[tokio::test]
async fn test_health() {
    let t = test_app(None);
    let (status, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "switch");
}

#[tokio::test]
async fn test_init_returns_checkout_url() {
    let t = test_app(None);
    let (status, body) = send(&t.app, post_json("/api/switch/transactions/init", &init_body())).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = body["transaction_id"].as_str().unwrap();
    assert_eq!(
        body["checkout_url"],
        format!("http://switch.local/api/switch/checkout/{}", id)
    );

    let (status, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["status"], "Created");
    assert_eq!(tx["currency"], "EUR");
    assert_eq!(tx["merchant_order_id"], "order-42");
    assert!(tx.get("merchant_secret").is_none());
}

#[tokio::test]
async fn test_init_validation_errors() {
    let t = test_app(None);

    let mut body = init_body();
    body["amount"] = json!("0");
    let (status, error) = send(&t.app, post_json("/api/switch/transactions/init", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["status"], 400);

    let mut body = init_body();
    body["amount"] = json!("35.005");
    let (status, error) = send(&t.app, post_json("/api/switch/transactions/init", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("decimal places"));

    let mut body = init_body();
    body["currency"] = json!("EURO");
    let (status, _) = send(&t.app, post_json("/api/switch/transactions/init", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = init_body();
    body.as_object_mut().unwrap().remove("fail_url");
    let (status, _) = send(&t.app, post_json("/api/switch/transactions/init", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/switch/transactions/init")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_init_rejects_unknown_merchant() {
    let t = test_app(None);
    let mut body = init_body();
    body["merchant_id"] = json!("webshop-9");
    let (status, _) = send(&t.app, post_json("/api/switch/transactions/init", &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let t = test_app(None);
    let (status, _) = send(&t.app, get(&format!("/api/switch/transactions/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_path_and_query_are_json_errors() {
    let t = test_app(None);

    let (status, error) = send(&t.app, get("/api/switch/transactions/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["status"], 400);

    let (status, error) = send(&t.app, get("/api/switch/transactions?merchant_id=webshop-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["status"], 400);
}

#[tokio::test]
async fn test_start_payment_redirects_once() {
    let t = test_app(None);
    let (id, session_id, stan) = redirected_transaction(&t).await;
    assert_eq!(stan.len(), 6);

    let sent = t.bank.requests.lock().unwrap()[0].clone();
    assert_eq!(sent.merchant_id.as_deref(), Some("switch-001"));
    assert_eq!(sent.transaction_id.map(|u| u.to_string()), Some(id.clone()));

    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["status"], "Redirected");
    assert_eq!(tx["bank_payment_id"], session_id);
    assert_eq!(tx["stan"], stan);

    let (status, _) = send(
        &t.app,
        post_json(&format!("/api/switch/checkout/{}/qr", id), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bank_failure_escalates_to_error() {
    let t = test_app(None);
    let id = create_transaction(&t.app).await;
    t.bank.fail.store(true, Ordering::SeqCst);

    let (status, _) = send(
        &t.app,
        post_json(&format!("/api/switch/checkout/{}/card", id), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["status"], "Error");

    let deliveries = t.merchant.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "http://shop.local/payment/error");
}

#[tokio::test]
async fn test_bank_notify_applies_outcome_and_notifies_merchant() {
    let t = test_app(None);
    let (id, session_id, stan) = redirected_transaction(&t).await;

    let (status, ack) = send(
        &t.app,
        post_json("/api/switch/bank/notify", &notification(&id, &session_id, &stan, "Paid")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["acknowledged"], true);
    assert_eq!(ack["status"], "Paid");

    // A repeat of the applied status is acknowledged without a second callback.
    let (status, _) = send(
        &t.app,
        post_json("/api/switch/bank/notify", &notification(&id, &session_id, &stan, "Paid")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    {
        let deliveries = t.merchant.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "http://shop.local/payment/success");
        assert_eq!(deliveries[0].1.merchant_order_id, "order-42");
    }

    // A different outcome on a terminal transaction is refused.
    let (status, _) = send(
        &t.app,
        post_json("/api/switch/bank/notify", &notification(&id, &session_id, &stan, "Failed")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["status"], "Paid");
    assert_eq!(tx["merchant_notified"], true);
}

#[tokio::test]
async fn test_bank_notify_rejects_mismatches() {
    let t = test_app(None);
    let (id, session_id, stan) = redirected_transaction(&t).await;

    let body = notification(&Uuid::new_v4().to_string(), &session_id, &stan, "Paid");
    let (status, _) = send(&t.app, post_json("/api/switch/bank/notify", &body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = notification(&id, &Uuid::new_v4().to_string(), &stan, "Paid");
    let (status, _) = send(&t.app, post_json("/api/switch/bank/notify", &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let body = notification(&id, &session_id, "999999", "Paid");
    let (status, _) = send(&t.app, post_json("/api/switch/bank/notify", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["status"], "Redirected");
}

#[tokio::test]
async fn test_expired_maps_to_failed() {
    let t = test_app(None);
    let (id, session_id, stan) = redirected_transaction(&t).await;

    let (status, ack) = send(
        &t.app,
        post_json("/api/switch/bank/notify", &notification(&id, &session_id, &stan, "Expired")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "Failed");
    assert_eq!(
        t.merchant.deliveries.lock().unwrap()[0].0,
        "http://shop.local/payment/fail"
    );
}

#[tokio::test]
async fn test_failed_merchant_delivery_is_retried_on_read() {
    let t = test_app(None);
    let (id, session_id, stan) = redirected_transaction(&t).await;
    t.merchant.fail.store(true, Ordering::SeqCst);

    let (status, _) = send(
        &t.app,
        post_json("/api/switch/bank/notify", &notification(&id, &session_id, &stan, "Paid")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["merchant_notified"], false);
    assert!(tx["notification"]["last_error"].is_string());

    t.merchant.fail.store(false, Ordering::SeqCst);
    let (_, tx) = send(&t.app, get(&format!("/api/switch/transactions/{}", id))).await;
    assert_eq!(tx["merchant_notified"], true);
    assert_eq!(tx["notification"]["last_notified_status"], "Paid");
    assert_eq!(t.merchant.deliveries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_renotify_requires_key() {
    let t = test_app(Some("adm1n"));
    let id = create_transaction(&t.app).await;
    let uri = format!("/api/switch/transactions/{}/notify-merchant", id);

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer adm1n")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "nothing_pending");
    assert_eq!(body["transaction"]["status"], "Created");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let t = test_app(None);
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}
