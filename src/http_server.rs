use crate::error::StoreError;
use crate::store::WebhookStore;
use crate::types::{NewWebhook, ReplayOptions, WebhookUpdate};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

type ApiResult = Result<Response, ApiError>;

/// Error as sent over HTTP: `{"error": ..., "error_code": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidInput(_) | StoreError::InvalidItemType { .. } => {
                StatusCode::BAD_REQUEST
            }
            StoreError::StorageLimitExceeded { .. } | StoreError::PayloadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            StoreError::Backend(e) => {
                error!(error = %e, "store backend failed");
                StatusCode::BAD_GATEWAY
            }
        };
        Self {
            status,
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "error_code": self.code })),
        )
            .into_response()
    }
}

/// Build the HTTP API over a shared store.
pub fn router(store: Arc<WebhookStore>) -> Router {
    // Leave room for pretty-printed bodies; the store enforces the real cap.
    let body_limit = usize::try_from(store.config().max_payload_bytes.saturating_mul(2))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/webhook", post(create_default).get(list_all))
        .route("/webhook/_search", get(search))
        .route("/webhook/_stats", get(stats))
        .route("/webhook/_export", get(export_all))
        .route("/webhook/_import", post(import))
        .route("/webhook/{category}", post(create).get(list_category))
        .route("/webhook/{category}/_batch", post(batch_create).delete(batch_delete))
        .route("/webhook/{category}/_export", get(export_category))
        .route(
            "/webhook/{category}/{key}",
            get(get_webhook).patch(update_webhook).delete(delete_webhook),
        )
        .route("/webhook/{category}/{key}/_replay", post(replay))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(store)
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(store: Arc<WebhookStore>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "webhook store listening");
    axum::serve(listener, router(store)).await
}

// ─── Body and query helpers ─────────────────────────────────────────────────

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("NO_BODY", "request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request("INVALID_JSON", format!("invalid JSON body: {e}")))
}

fn parse_int(name: &str, raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| {
            ApiError::from(StoreError::InvalidInput(format!("{name} must be an integer, got {s}")))
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateQuery {
    ttl: Option<String>,
    callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    since: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplayQuery {
    category: Option<String>,
    ttl: Option<String>,
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn create_default(
    State(store): State<Arc<WebhookStore>>,
    Query(query): Query<CreateQuery>,
    body: Bytes,
) -> ApiResult {
    store_webhook(&store, None, query, &body).await
}

async fn create(
    State(store): State<Arc<WebhookStore>>,
    Path(category): Path<String>,
    Query(query): Query<CreateQuery>,
    body: Bytes,
) -> ApiResult {
    store_webhook(&store, Some(category), query, &body).await
}

async fn store_webhook(
    store: &WebhookStore,
    category: Option<String>,
    query: CreateQuery,
    body: &Bytes,
) -> ApiResult {
    let payload = parse_body(body)?;
    let mut new = NewWebhook::new(payload);
    if let Some(category) = category {
        new = new.with_category(category);
    }
    if let Some(ttl) = parse_int("ttl", query.ttl.as_deref())? {
        new = new.with_ttl(ttl);
    }
    if let Some(url) = query.callback_url.filter(|u| !u.is_empty()) {
        new = new.with_callback_url(url);
    }

    let created = store.create(new).await?;
    Ok(Json(json!({
        "status": "stored",
        "key": created.key,
        "category": created.category,
        "ttl": created.ttl,
        "size": created.size,
        "callback_registered": created.callback_registered,
    }))
    .into_response())
}

async fn list_all(State(store): State<Arc<WebhookStore>>, Query(query): Query<ListQuery>) -> ApiResult {
    list_webhooks(&store, None, query).await
}

async fn list_category(
    State(store): State<Arc<WebhookStore>>,
    Path(category): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    list_webhooks(&store, Some(&category), query).await
}

async fn list_webhooks(store: &WebhookStore, category: Option<&str>, query: ListQuery) -> ApiResult {
    let since = parse_int("since", query.since.as_deref())?;
    let webhooks = store.list(category, since).await?;
    let keys: Vec<&str> = webhooks.iter().map(|w| w.key.as_str()).collect();
    Ok(Json(json!({
        "category": category,
        "count": webhooks.len(),
        "keys": keys,
        "webhooks": webhooks,
    }))
    .into_response())
}

async fn get_webhook(
    State(store): State<Arc<WebhookStore>>,
    Path((_category, key)): Path<(String, String)>,
) -> ApiResult {
    let webhook = store.get(&key).await?;
    Ok(Json(json!({
        "key": webhook.key,
        "category": webhook.category,
        "created_at": webhook.created_at,
        "value": webhook.payload,
        "size": webhook.size,
        "ttl": webhook.ttl,
        "callback_url": webhook.callback_url,
        "replayed_from": webhook.replayed_from,
        "original_created_at": webhook.original_created_at,
    }))
    .into_response())
}

async fn update_webhook(
    State(store): State<Arc<WebhookStore>>,
    Path((_category, key)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    let update = WebhookUpdate::from_json(&parse_body(&body)?)?;
    let changes = store.update(&key, update).await?;
    let ttl = match changes.ttl {
        Some(ttl) => Some(ttl),
        None => store.get(&key).await?.ttl,
    };
    Ok(Json(json!({
        "status": "updated",
        "key": key,
        "ttl": ttl,
        "changes": changes,
    }))
    .into_response())
}

async fn delete_webhook(
    State(store): State<Arc<WebhookStore>>,
    Path((_category, key)): Path<(String, String)>,
) -> ApiResult {
    let deleted = store.delete(&key).await?;
    Ok(Json(json!({
        "status": "deleted",
        "key": deleted.key,
        "category": deleted.category,
        "size": deleted.size,
    }))
    .into_response())
}

async fn batch_create(
    State(store): State<Arc<WebhookStore>>,
    Path(category): Path<String>,
    body: Bytes,
) -> ApiResult {
    let mut body = parse_body(&body)?;
    let items = match body.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(ApiError::bad_request(
                "INVALID_BATCH_FORMAT",
                "body must be {\"items\": [...]} with at least one item",
            ))
        }
    };

    let report = store.batch_create(Some(&category), items).await?;
    let status = if report.success.is_empty() {
        StatusCode::BAD_REQUEST
    } else if report.is_partial() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    let body = json!({
        "category": category,
        "total_created": report.success.len(),
        "total_failed": report.failed.len(),
        "success": report.success,
        "failed": report.failed,
    });
    Ok((status, Json(body)).into_response())
}

async fn batch_delete(
    State(store): State<Arc<WebhookStore>>,
    Path(_category): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body = parse_body(&body)?;
    let keys: Option<Vec<String>> = body
        .get("keys")
        .and_then(Value::as_array)
        .filter(|keys| !keys.is_empty())
        .and_then(|keys| keys.iter().map(|k| k.as_str().map(str::to_string)).collect());
    let Some(keys) = keys else {
        return Err(ApiError::bad_request(
            "INVALID_BATCH_FORMAT",
            "body must be {\"keys\": [\"...\"]} with at least one key",
        ));
    };

    let report = store.batch_delete(&keys).await?;
    Ok(Json(json!({
        "total_deleted": report.deleted.len(),
        "total_not_found": report.not_found.len(),
        "deleted": report.deleted,
        "not_found": report.not_found,
    }))
    .into_response())
}

async fn replay(
    State(store): State<Arc<WebhookStore>>,
    Path((_category, key)): Path<(String, String)>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult {
    let options = ReplayOptions {
        category: query.category.filter(|c| !c.is_empty()),
        ttl: parse_int("ttl", query.ttl.as_deref())?,
    };
    let replayed = store.replay(&key, options).await?;
    Ok(Json(json!({
        "status": "replayed",
        "original_key": replayed.original_key,
        "new_key": replayed.new_key,
        "category": replayed.category,
        "ttl": replayed.ttl,
    }))
    .into_response())
}

async fn search(State(store): State<Arc<WebhookStore>>, Query(query): Query<SearchQuery>) -> ApiResult {
    let Some(q) = query.q.filter(|q| !q.trim().is_empty()) else {
        return Err(ApiError::bad_request("MISSING_QUERY", "query parameter q is required"));
    };
    let results = store.search(&q).await?;
    Ok(Json(json!({
        "query": q,
        "count": results.len(),
        "results": results,
    }))
    .into_response())
}

async fn stats(State(store): State<Arc<WebhookStore>>) -> ApiResult {
    Ok(Json(store.stats().await?).into_response())
}

async fn export_all(State(store): State<Arc<WebhookStore>>) -> ApiResult {
    Ok(Json(store.export(None).await?).into_response())
}

async fn export_category(
    State(store): State<Arc<WebhookStore>>,
    Path(category): Path<String>,
) -> ApiResult {
    Ok(Json(store.export(Some(&category)).await?).into_response())
}

async fn import(State(store): State<Arc<WebhookStore>>, body: Bytes) -> ApiResult {
    let document = parse_body(&body)?;
    let report = store.import(&document).await?;
    Ok(Json(json!({
        "status": "imported",
        "total_imported": report.imported.len(),
        "total_failed": report.failed.len(),
        "imported": report.imported,
        "failed": report.failed,
    }))
    .into_response())
}
