//! Token issuance endpoint.

use axum::{body::Bytes, extract::State, Json};

use crate::errors::AppError;
use crate::models::{TokenRequest, TokenResponse};
use crate::AppState;

/// POST /api/token - Issue a write token for an email.
///
/// Mounted behind the loopback-only middleware.
pub async fn issue_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let request: TokenRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON payload: {}", e)))?;

    let email = request
        .email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing email".to_string()))?;

    let token = state.tokens.issue(&email)?;
    tracing::info!("Issued write token for {}", email);

    Ok(Json(TokenResponse { email, token }))
}
