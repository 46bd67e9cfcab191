//! Gateway payment callback. Always answers 200; the body says what happened.

use axum::{
    extract::{FromRequest, Multipart, RawQuery, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value as JsonValue};
use tracing::{error, warn};

use crate::api::AppState;
use crate::services::{CallbackAck, CallbackPayload};

/// Upper bound for a callback body
const MAX_CALLBACK_BODY: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
}

fn body_kind(content_type: Option<&str>, body: &[u8]) -> BodyKind {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.starts_with("multipart/form-data") {
        BodyKind::Multipart
    } else if content_type.contains("json") {
        BodyKind::Json
    } else if content_type.is_empty() && body.trim_ascii_start().starts_with(b"{") {
        BodyKind::Json
    } else {
        BodyKind::Form
    }
}

/// Parse a JSON object or a urlencoded form into body fields
fn parse_body(kind: &BodyKind, body: &[u8]) -> Result<Map<String, JsonValue>, String> {
    if body.trim_ascii().is_empty() {
        return Ok(Map::new());
    }
    match kind {
        BodyKind::Json => match serde_json::from_slice::<JsonValue>(body) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(format!("expected a JSON object, got {}", other)),
            Err(e) => Err(e.to_string()),
        },
        _ => serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .map(|pairs| {
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, JsonValue::String(v)))
                    .collect()
            })
            .map_err(|e| e.to_string()),
    }
}

async fn parse_multipart(
    request: Request,
    state: &AppState,
) -> Result<Map<String, JsonValue>, String> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| e.body_text())?;

    let mut fields = Map::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        // File parts are not part of the callback contract
        if field.file_name().is_some() {
            continue;
        }
        let value = field.text().await.map_err(|e| e.body_text())?;
        fields.insert(name, JsonValue::String(value));
    }
    Ok(fields)
}

fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .unwrap_or_default()
}

/// POST /api/toyyibpay/callback
pub async fn handle_callback(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    request: Request,
) -> impl IntoResponse {
    let query = query_pairs(raw_query.as_deref());
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = if body_kind(content_type.as_deref(), &[]) == BodyKind::Multipart {
        parse_multipart(request, &state).await
    } else {
        match axum::body::to_bytes(request.into_body(), MAX_CALLBACK_BODY).await {
            Ok(bytes) => parse_body(&body_kind(content_type.as_deref(), &bytes), &bytes),
            Err(e) => Err(e.to_string()),
        }
    };

    let body = match body {
        Ok(body) => body,
        Err(reason) if query.is_empty() => {
            error!(
                content_type = content_type.as_deref().unwrap_or("-"),
                reason = %reason,
                "unreadable callback payload"
            );
            return (StatusCode::OK, Json(CallbackAck::unreadable_payload()));
        }
        Err(reason) => {
            warn!(reason = %reason, "callback body unreadable, using query string only");
            Map::new()
        }
    };

    let payload = CallbackPayload::new(body, query);
    let ack = state.reconciler.handle(&payload).await;
    (StatusCode::OK, Json(ack))
}
