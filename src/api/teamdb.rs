//! Team database document endpoints.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::auth::{EMAIL_HEADER, TOKEN_HEADER};
use crate::db::{format_timestamp, parse_timestamp};
use crate::errors::AppError;
use crate::models::{TeamDbResponse, WriteResponse};
use crate::schema;
use crate::AppState;

/// Preferred staleness header; `If-Unmodified-Since` is accepted as a fallback.
pub const CLIENT_MODIFIED_HEADER: &str = "x-client-modified-at";

/// GET /api/teamdb - Get the document and its modification time.
pub async fn get_teamdb(State(state): State<AppState>) -> Result<Json<TeamDbResponse>, AppError> {
    let database = state.store.load()?;
    let last_modified = state.store.last_modified().map(|ts| format_timestamp(&ts));

    Ok(Json(TeamDbResponse {
        database,
        last_modified,
    }))
}

/// PUT /api/teamdb - Replace the document.
///
/// The body is parsed, validated, authenticated and checked for staleness, in
/// that order, before anything is written.
pub async fn put_teamdb(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WriteResponse>, AppError> {
    let document = parse_payload(&body)?;

    if let Err(e) = schema::validate(&document) {
        tracing::warn!("Rejected document: {}", e);
        return Err(e.into());
    }

    let email = header_str(&headers, EMAIL_HEADER);
    let token = header_str(&headers, TOKEN_HEADER);
    let (Some(email), Some(token)) = (email, token) else {
        return Err(AppError::Unauthorized(
            "Missing authentication headers".to_string(),
        ));
    };

    if !verify_token(&state, email, token).await? {
        tracing::warn!("Rejected write with invalid token for {}", email);
        return Err(AppError::Forbidden("Invalid token".to_string()));
    }

    match client_modified_at(&headers) {
        Some(since) => state.store.save_if_unmodified_since(&document, since)?,
        None => state.store.save(&document)?,
    }

    tracing::info!("Team database updated by {}", email);
    Ok(Json(WriteResponse { ok: true }))
}

/// PBKDF2 is CPU-bound, so verification runs on the blocking pool.
async fn verify_token(state: &AppState, email: &str, token: &str) -> Result<bool, AppError> {
    let tokens = Arc::clone(&state.tokens);
    let (email, token) = (email.to_string(), token.to_string());

    tokio::task::spawn_blocking(move || tokens.verify(&email, &token))
        .await
        .map_err(|e| AppError::Storage(format!("Token verification failed: {}", e)))?
}

/// Decode the body as JSON, falling back to YAML.
fn parse_payload(body: &[u8]) -> Result<Value, AppError> {
    if let Ok(document) = serde_json::from_slice::<Value>(body) {
        return Ok(document);
    }

    std::str::from_utf8(body)
        .ok()
        .and_then(|text| serde_yaml::from_str::<Value>(text).ok())
        .ok_or_else(|| {
            tracing::warn!("Failed to parse payload as JSON or YAML");
            AppError::Payload("Invalid JSON/YAML payload".to_string())
        })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// Client's view of the document's modification time. Unparsable values are ignored.
fn client_modified_at(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let raw = header_str(headers, CLIENT_MODIFIED_HEADER)
        .or_else(|| header_str(headers, axum::http::header::IF_UNMODIFIED_SINCE.as_str()))?;

    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        tracing::debug!("Ignoring unparsable modification timestamp {:?}", raw);
    }
    parsed
}
