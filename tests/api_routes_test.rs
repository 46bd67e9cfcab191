//! HTTP routes driven through the router with `oneshot`

mod common;

use axum::body::{to_bytes, Body};
use common::{amount_at, app_state, seeded_store, ScriptedGateway};
use driver_commission_relay::api::router;
use driver_commission_relay::database::DocumentStore;
use http::{header, Request, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;
use tower::util::ServiceExt;

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, http::HeaderMap, JsonValue) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, headers, body)
}

fn json_post(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn seed_mapping(store: &Arc<driver_commission_relay::database::memory::MemoryStore>) {
    store
        .put(
            "bill_mappings/rp123",
            &json!({"driverId": "drv_abcdef12", "amount": 25.5, "reference": "REF"}),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_reports_store() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, headers, body) = send(app, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("Healthy"));
    assert!(body["checks"]["database"].is_object());
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_verify_masks_credentials() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(app, get("/api/toyyibpay/verify")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["environment"], json!("sandbox"));
    assert_eq!(body["secretKeyConfigured"], json!(true));
    assert_eq!(body["secretKeyPreview"], json!("test-sec..."));
    assert!(!body.to_string().contains("test-secret-key-123"));
}

#[tokio::test]
async fn test_create_bill_route() {
    let gateway = Arc::new(ScriptedGateway::returning("rp123"));
    let store = seeded_store();
    let app = router(app_state(store.clone(), gateway.clone()));

    let (status, _, body) = send(
        app,
        json_post(
            "/api/toyyibpay/create-bill",
            json!({"amount": 25.5, "driverId": "drv_abcdef12", "reference": "REF"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["billCode"], json!("rp123"));
    assert_eq!(body["paymentUrl"], json!("https://dev.toyyibpay.com/rp123"));
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_create_bill_route_rejects_amount_out_of_range() {
    let gateway = Arc::new(ScriptedGateway::returning("rp123"));
    let app = router(app_state(seeded_store(), gateway.clone()));

    let mut request = json_post(
        "/api/toyyibpay/create-bill",
        json!({"amount": "10000.01", "driverId": "drv_abcdef12", "reference": "REF"}),
    );
    request
        .headers_mut()
        .insert("x-request-id", "req-123".parse().unwrap());
    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("AMOUNT_OUT_OF_RANGE"));
    assert_eq!(body["request_id"], json!("req-123"));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_form_callback_settles_and_returns_200() {
    let store = seeded_store();
    seed_mapping(&store).await;
    let app = router(app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        form_post(
            "/api/toyyibpay/callback",
            "refno=TP1&status=1&billcode=rp123&order_id=REF_drv_abcd_25.5_1700000000000",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));
    assert_eq!(body["success"], json!(true));
    let snapshot = store.snapshot().await;
    assert_eq!(
        amount_at(&snapshot, "driver_commissions/drv_abcdef12/commission_summary/unpaid_commission"),
        Some(Decimal::from_str("74.5").unwrap())
    );
}

#[tokio::test]
async fn test_json_callback_with_query_bill_code() {
    let store = seeded_store();
    seed_mapping(&store).await;
    let app = router(app_state(store, Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post("/api/toyyibpay/callback?billcode=rp123", json!({"status_id": "1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["billCode"], json!("rp123"));
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_multipart_callback() {
    let store = seeded_store();
    seed_mapping(&store).await;
    let app = router(app_state(store, Arc::new(ScriptedGateway::returning("rp1"))));

    let boundary = "X-RELAY-BOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"billcode\"\r\n\r\nrp123\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"status_id\"\r\n\r\n1\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/toyyibpay/callback")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_unreadable_callback_is_still_200() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post_raw("/api/toyyibpay/callback", "{not json"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], json!("UnreadablePayload"));
}

fn json_post_raw(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_callback_without_bill_code_is_200() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(app, form_post("/api/toyyibpay/callback", "status=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true, "error": "NoBillCode"}));
}

#[tokio::test]
async fn test_return_redirect_is_read_only() {
    let store = seeded_store();
    seed_mapping(&store).await;
    let app = router(app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        get("/api/toyyibpay/return?status_id=1&billcode=rp123&order_id=REF&msg=ok&transaction_id=TP9"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("paid"));
    assert_eq!(body["mappingFound"], json!(true));
    assert_eq!(body["driverId"], json!("drv_abcdef12"));
    assert_eq!(body["settled"], json!(false));
    let snapshot = store.snapshot().await;
    assert_eq!(
        amount_at(&snapshot, "driver_commissions/drv_abcdef12/commission_summary/unpaid_commission"),
        Some(Decimal::from(100))
    );
}

#[tokio::test]
async fn test_manual_process_then_duplicate() {
    let store = seeded_store();
    seed_mapping(&store).await;
    let state = app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1")));

    let (status, _, body) = send(
        router(state.clone()),
        json_post("/api/payment/process", json!({"billCode": "rp123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driverId"], json!("drv_abcdef12"));
    assert_eq!(body["source"], json!("mapping"));
    assert_eq!(body["paymentRecorded"], json!(true));

    let (status, _, body) = send(
        router(state),
        json_post("/api/payment/process", json!({"billCode": "rp123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("DUPLICATE_SETTLEMENT"));
}

#[tokio::test]
async fn test_manual_process_unknown_bill_is_404() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post("/api/payment/process", json!({"billCode": "rp404"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"]["billCode"], json!("rp404"));
}

#[tokio::test]
async fn test_recover_rewrites_mapping_and_settles() {
    let store = seeded_store();
    let app = router(app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post(
            "/api/payment/recover",
            json!({"billCode": "rp321", "driverId": "drv_abcdef12", "amount": "40", "reference": "LOST"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commissionUpdated"], json!(true));
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot["bill_mappings"]["rp321"]["recovered"], json!(true));
    assert_eq!(
        amount_at(&snapshot, "driver_commissions/drv_abcdef12/commission_summary/unpaid_commission"),
        Some(Decimal::from(60))
    );
}

#[tokio::test]
async fn test_recover_requires_fields() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post("/api/payment/recover", json!({"billCode": "rp321"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("MISSING_FIELDS"));
    assert_eq!(body["details"]["fields"], json!(["driverId", "amount"]));
}

#[tokio::test]
async fn test_commission_update_route() {
    let store = seeded_store();
    let app = router(app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        json_post(
            "/api/commission/update",
            json!({"driverId": "drv_abcdef12", "amount": 30}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previousUnpaid"], json!(100.0));
    assert_eq!(body["unpaidCommission"], json!(70.0));
    let snapshot = store.snapshot().await;
    assert!(snapshot.get("commission_payment").is_none());
}

#[tokio::test]
async fn test_malformed_json_gets_error_envelope() {
    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));

    let mut request = json_post_raw("/api/commission/update", r#"{"driverId": 12345, "amount": 5}"#);
    request
        .headers_mut()
        .insert("x-request-id", "req-json".parse().unwrap());
    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));
    assert_eq!(body["request_id"], json!("req-json"));

    let app = router(app_state(seeded_store(), Arc::new(ScriptedGateway::returning("rp1"))));
    let (status, _, body) = send(app, json_post_raw("/api/toyyibpay/create-bill", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_path_separators_in_operator_input_are_rejected() {
    let store = seeded_store();
    let before = store.snapshot().await;
    let state = app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1")));

    let (status, _, body) = send(
        router(state.clone()),
        json_post(
            "/api/payment/recover",
            json!({"billCode": "../drivers/drv_x", "driverId": "drv_abcdef12", "amount": 5}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("VALIDATION_ERROR"));

    let (status, _, _) = send(
        router(state),
        json_post(
            "/api/commission/update",
            json!({"driverId": "drv_abcdef12#x", "amount": 5}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn test_callback_with_traversal_bill_code_is_200_no_bill_code() {
    let store = seeded_store();
    let before = store.snapshot().await;
    let app = router(app_state(store.clone(), Arc::new(ScriptedGateway::returning("rp1"))));

    let (status, _, body) = send(
        app,
        form_post(
            "/api/toyyibpay/callback",
            "billcode=..%2F..%2Fdrivers%2Fdrv_new&status_id=1",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true, "error": "NoBillCode"}));
    assert_eq!(store.snapshot().await, before);
}
