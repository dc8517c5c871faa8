use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use webhook_store::{http_server, MemoryKv, StoreConfig, WebhookStore};

fn app_with(config: StoreConfig) -> Router {
    let store = WebhookStore::new(Arc::new(MemoryKv::new()), config);
    http_server::router(Arc::new(store))
}

fn app() -> Router {
    app_with(StoreConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn create_in_default_category() {
    let app = app();
    let (status, body) = send(&app, "POST", "/webhook", Some(json!({"test": "data", "value": 42}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stored");
    assert_eq!(body["category"], "default");
    assert_eq!(body["ttl"], 259_200);
    assert_eq!(body["callback_registered"], false);
    assert!(body["key"].as_str().unwrap().starts_with("default:"));
}

#[tokio::test]
async fn create_get_patch_delete() {
    let app = app();
    let (_, created) = send(
        &app,
        "POST",
        "/webhook/test?ttl=3600&callback_url=https://example.com/notify",
        Some(json!({"test": "retrieval"})),
    )
    .await;
    assert_eq!(created["ttl"], 3600);
    assert_eq!(created["callback_registered"], true);
    let key = created["key"].as_str().unwrap().to_string();

    let (status, got) = send(&app, "GET", &format!("/webhook/test/{key}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["key"], key.as_str());
    assert_eq!(got["value"]["test"], "retrieval");
    assert!(got["ttl"].as_u64().unwrap() <= 3600);
    assert_eq!(got["callback_url"], "https://example.com/notify");

    let (status, patched) = send(&app, "PATCH", &format!("/webhook/test/{key}"), Some(json!({"ttl": 7200}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["status"], "updated");
    assert_eq!(patched["ttl"], 7200);

    let (status, patched) = send(
        &app,
        "PATCH",
        &format!("/webhook/test/{key}"),
        Some(json!({"callback_url": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["changes"]["callback_url"], Value::Null);

    let (status, deleted) = send(&app, "DELETE", &format!("/webhook/test/{key}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["status"], "deleted");

    let (status, body) = send(&app, "GET", &format!("/webhook/test/{key}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "KEY_NOT_FOUND");
}

#[tokio::test]
async fn patch_callback_reports_change() {
    let app = app();
    let (_, created) = send(&app, "POST", "/webhook/test", Some(json!({"data": "callback-test"}))).await;
    let key = created["key"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/webhook/test/{key}"),
        Some(json!({"callback_url": "https://example.com/notify"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changes"]["callback_url"], "https://example.com/notify");
    assert_eq!(body["ttl"], 259_200);
}

#[tokio::test]
async fn request_errors() {
    let app = app();

    let (status, body) = send(&app, "POST", "/webhook", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "NO_BODY");

    let request = Request::post("/webhook")
        .header("content-type", "application/json")
        .body(Body::from("{invalid json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error_code"], "INVALID_JSON");

    let (status, body) = send(&app, "GET", "/webhook/test/nonexistent:key", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "KEY_NOT_FOUND");

    let (status, body) = send(&app, "DELETE", "/webhook/test/nonexistent:key", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "KEY_NOT_FOUND");

    let (status, body) = send(&app, "GET", "/webhook/_search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "MISSING_QUERY");

    let (status, body) = send(&app, "POST", "/webhook/test/_batch", Some(json!({"invalid": "format"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_BATCH_FORMAT");

    let (status, body) = send(&app, "POST", "/webhook/test?ttl=soon", Some(json!({"a": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
}

#[tokio::test]
async fn non_positive_ttl_patch_is_rejected() {
    let app = app();
    let (_, created) = send(&app, "POST", "/webhook/test", Some(json!({"a": 1}))).await;
    let key = created["key"].as_str().unwrap();

    let (status, body) = send(&app, "PATCH", &format!("/webhook/test/{key}"), Some(json!({"ttl": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
}

#[tokio::test]
async fn oversized_payload_and_quota() {
    let app = app_with(StoreConfig {
        max_payload_bytes: 64,
        total_payload_limit: 100,
        ..StoreConfig::default()
    });

    let (status, body) = send(&app, "POST", "/webhook", Some(json!({"pad": "x".repeat(80)}))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error_code"], "PAYLOAD_TOO_LARGE");

    let fill = json!({"pad": "x".repeat(50)});
    let (status, _) = send(&app, "POST", "/webhook", Some(fill.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "POST", "/webhook", Some(fill)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error_code"], "STORAGE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn list_and_since_filter() {
    let app = app();
    send(&app, "POST", "/webhook/test-list", Some(json!({"data": "test"}))).await;
    send(&app, "POST", "/webhook/other", Some(json!({"data": "other"}))).await;

    let (status, body) = send(&app, "GET", "/webhook/test-list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["keys"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", "/webhook", None).await;
    assert_eq!(body["count"], 2);

    let future = chrono::Utc::now().timestamp() + 3600;
    let (_, body) = send(&app, "GET", &format!("/webhook/test-list?since={future}"), None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn batch_create_and_delete() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/webhook/batch-test/_batch",
        Some(json!({"items": [
            {"order_id": 1, "total": 100},
            {"order_id": 2, "total": 200},
            {"order_id": 3, "total": 300}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_created"], 3);
    assert_eq!(body["total_failed"], 0);

    let keys: Vec<Value> = body["success"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].clone())
        .collect();
    let (status, body) = send(&app, "DELETE", "/webhook/batch-test/_batch", Some(json!({"keys": keys}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_deleted"], 3);
    assert_eq!(body["total_not_found"], 0);
}

#[tokio::test]
async fn batch_with_mixed_outcome_is_multi_status() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/webhook/mixed/_batch",
        Some(json!({"items": [{"ok": 1}, "not an object"]})),
    )
    .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["total_created"], 1);
    assert_eq!(body["failed"][0]["index"], 1);
    assert_eq!(body["failed"][0]["error_code"], "INVALID_ITEM_TYPE");

    let (status, body) = send(&app, "POST", "/webhook/mixed/_batch", Some(json!({"items": [1, 2]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["total_failed"], 2);
}

#[tokio::test]
async fn replay_routes() {
    let app = app();
    let (_, created) = send(
        &app,
        "POST",
        "/webhook/orders",
        Some(json!({"order_id": 12345, "customer": "John Doe"})),
    )
    .await;
    let key = created["key"].as_str().unwrap();

    let (status, body) = send(&app, "POST", &format!("/webhook/orders/{key}/_replay"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "replayed");
    assert_eq!(body["original_key"], key);
    assert_ne!(body["new_key"], key);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/webhook/orders/{key}/_replay?category=replays&ttl=7200"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "replays");
    assert_eq!(body["ttl"], 7200);
}

#[tokio::test]
async fn search_and_stats() {
    let app = app();
    send(
        &app,
        "POST",
        "/webhook/products",
        Some(json!({"product": "laptop", "brand": "Apple", "price": 999})),
    )
    .await;
    send(&app, "POST", "/webhook/products", Some(json!({"product": "phone"}))).await;

    let (status, body) = send(&app, "GET", "/webhook/_search?q=LAPTOP", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["payload"]["product"], "laptop");

    let (status, body) = send(&app, "GET", "/webhook/_stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_webhooks"], 2);
    assert_eq!(body["categories"]["products"], 2);
    assert!(body["total_size_bytes"].as_u64().unwrap() > 0);
    assert_eq!(body["storage_limit_bytes"], 104_857_600);
}

#[tokio::test]
async fn export_and_import_routes() {
    let source = app();
    for i in 0..3 {
        send(&source, "POST", "/webhook/export-test", Some(json!({"item": i}))).await;
    }
    send(&source, "POST", "/webhook/export-cat", Some(json!({"data": "test"}))).await;

    let (status, all) = send(&source, "GET", "/webhook/_export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["version"], "1.0");
    assert!(all["exported_at"].is_string());
    assert_eq!(all["total_exported"], 4);

    let (status, one) = send(&source, "GET", "/webhook/export-cat/_export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["category"], "export-cat");
    assert_eq!(one["total_exported"], 1);

    let target = app();
    let (status, report) = send(&target, "POST", "/webhook/_import", Some(all)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_imported"], 4);
    assert_eq!(report["total_failed"], 0);

    let (_, stats) = send(&target, "GET", "/webhook/_stats", None).await;
    assert_eq!(stats["categories"]["export-test"], 3);
    assert_eq!(stats["categories"]["export-cat"], 1);

    let (status, body) = send(&target, "POST", "/webhook/_import", Some(json!({"nothing": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_INPUT");
}

#[tokio::test]
async fn large_array_payload() {
    let app = app();
    let items: Vec<Value> = (0..1000)
        .map(|i| {
            json!({
                "id": format!("ID{i:016}"),
                "name": format!("User {i}"),
                "bio": "Lorem ipsum ".repeat(50),
                "data": {"field": i, "value": i * 2}
            })
        })
        .collect();

    let (status, created) = send(&app, "POST", "/webhook/large-test", Some(Value::Array(items))).await;
    assert_eq!(status, StatusCode::OK);
    let key = created["key"].as_str().unwrap();

    let (status, got) = send(&app, "GET", &format!("/webhook/large-test/{key}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let value = got["value"].as_array().unwrap();
    assert_eq!(value.len(), 1000);
    assert!(value[0]["id"].as_str().unwrap().starts_with("ID"));
}
