//! REST client for a Firebase Realtime Database

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{DatabaseError, DatabaseResult};
use super::{path_segments, DocumentStore};

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

pub struct FirebaseStore {
    client: Client,
    base_url: Url,
    secret: Option<String>,
}

impl FirebaseStore {
    pub fn new(
        base_url: &str,
        secret: Option<String>,
        timeout: Duration,
    ) -> DatabaseResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DatabaseError::Transient {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                DatabaseError::invalid_input(format!("invalid database URL '{}'", base_url))
            })?;

        Ok(Self {
            client,
            base_url,
            secret,
        })
    }

    /// `{base}/{path}.json?{params}&auth={secret}`. Every segment is
    /// percent-encoded, so `#`, `?` and `%` inside a key stay in the path.
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        let mut segments: Vec<String> = path_segments(path)
            .into_iter()
            .map(str::to_string)
            .collect();
        match segments.last_mut() {
            Some(last) => last.push_str(".json"),
            None => segments.push(".json".to_string()),
        }
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.pop_if_empty().extend(&segments);
        }

        if !params.is_empty() || self.secret.is_some() {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(params);
            if let Some(secret) = self.secret.as_deref() {
                query.append_pair("auth", secret);
            }
        }
        url
    }

    fn request(&self, method: Method, path: &str, params: &[(&str, &str)]) -> RequestBuilder {
        self.client.request(method, self.url(path, params))
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> DatabaseResult<(u16, String)> {
        let response = request.send().await.map_err(|e| {
            warn!(path, error = %e, "store request failed");
            DatabaseError::from(e)
        })?;
        read_response(path, response).await
    }

    async fn write(&self, method: Method, path: &str, value: &JsonValue) -> DatabaseResult<String> {
        let (status, body) = self
            .send(path, self.request(method.clone(), path, &[]).json(value))
            .await?;
        if !(200..300).contains(&status) {
            let err = DatabaseError::from_status(path, status, &body);
            log_failure(&method, path, status, &body, &err);
            return Err(err);
        }
        Ok(body)
    }
}

async fn read_response(path: &str, response: Response) -> DatabaseResult<(u16, String)> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| DatabaseError::Transient {
        message: format!("failed to read store response for '{}': {}", path, e),
    })?;
    debug!(path, status, body_len = body.len(), "store responded");
    Ok((status, body))
}

fn log_failure(method: &Method, path: &str, status: u16, body: &str, err: &DatabaseError) {
    if err.is_permission_denied() {
        warn!(
            method = %method,
            path,
            status,
            body,
            "🔒 store permission denied, check database rules and secret"
        );
    } else {
        warn!(method = %method, path, status, body, "store write failed");
    }
}

/// Parse a GET body. Anything that is not JSON (the store sometimes answers
/// with plain-text redirects) or an error object counts as absent.
fn parse_document(path: &str, body: &str) -> Option<JsonValue> {
    match serde_json::from_str::<JsonValue>(body) {
        Ok(JsonValue::Null) => None,
        Ok(JsonValue::Object(map)) if map.len() == 1 && map.contains_key("error") => {
            warn!(path, body, "store returned an error payload, treating as absent");
            None
        }
        Ok(value) => Some(value),
        Err(_) => {
            warn!(path, body, "store returned a non-JSON payload, treating as absent");
            None
        }
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str) -> DatabaseResult<Option<JsonValue>> {
        let (status, body) = self.send(path, self.request(Method::GET, path, &[])).await?;
        if status == 404 {
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            let err = DatabaseError::from_status(path, status, &body);
            log_failure(&Method::GET, path, status, &body, &err);
            return Err(err);
        }
        Ok(parse_document(path, &body))
    }

    async fn put(&self, path: &str, value: &JsonValue) -> DatabaseResult<()> {
        self.write(Method::PUT, path, value).await.map(|_| ())
    }

    async fn patch(&self, path: &str, fields: &JsonValue) -> DatabaseResult<()> {
        if !fields.is_object() {
            return Err(DatabaseError::invalid_input("patch requires an object"));
        }
        self.write(Method::PATCH, path, fields).await.map(|_| ())
    }

    async fn push(&self, path: &str, value: &JsonValue) -> DatabaseResult<String> {
        let body = self.write(Method::POST, path, value).await?;
        serde_json::from_str::<JsonValue>(&body)
            .ok()
            .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .ok_or_else(|| DatabaseError::Malformed {
                path: path.to_string(),
                message: format!("push response without a key: {}", body),
            })
    }

    async fn delete(&self, path: &str) -> DatabaseResult<()> {
        let (status, body) = self
            .send(path, self.request(Method::DELETE, path, &[]))
            .await?;
        if !(200..300).contains(&status) {
            let err = DatabaseError::from_status(path, status, &body);
            log_failure(&Method::DELETE, path, status, &body, &err);
            return Err(err);
        }
        Ok(())
    }

    async fn child_keys(&self, path: &str) -> DatabaseResult<Vec<String>> {
        let (status, body) = self
            .send(path, self.request(Method::GET, path, &[("shallow", "true")]))
            .await?;
        if !(200..300).contains(&status) {
            let err = DatabaseError::from_status(path, status, &body);
            log_failure(&Method::GET, path, status, &body, &err);
            return Err(err);
        }

        let mut keys: Vec<String> = match parse_document(path, &body) {
            Some(JsonValue::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        Ok(keys)
    }

    async fn put_if_absent(&self, path: &str, value: &JsonValue) -> DatabaseResult<bool> {
        let response = self
            .request(Method::GET, path, &[])
            .header(ETAG_REQUEST_HEADER, "true")
            .send()
            .await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let (status, body) = read_response(path, response).await?;
        if !(200..300).contains(&status) {
            return Err(DatabaseError::from_status(path, status, &body));
        }
        if parse_document(path, &body).is_some() {
            return Ok(false);
        }

        let etag = etag.ok_or_else(|| DatabaseError::Malformed {
            path: path.to_string(),
            message: "store did not return an ETag".to_string(),
        })?;

        let (status, body) = self
            .send(
                path,
                self.request(Method::PUT, path, &[])
                    .header(reqwest::header::IF_MATCH, etag)
                    .json(value),
            )
            .await?;

        match status {
            200..=299 => Ok(true),
            // Another writer got there first
            412 => Ok(false),
            _ => {
                let err = DatabaseError::from_status(path, status, &body);
                log_failure(&Method::PUT, path, status, &body, &err);
                Err(err)
            }
        }
    }
}
