//! Write-token models.

use serde::{Deserialize, Serialize};

/// PBKDF2 rounds used for newly issued tokens.
pub const DEFAULT_TOKEN_ITERATIONS: u32 = 100_000;

fn default_iterations() -> u32 {
    DEFAULT_TOKEN_ITERATIONS
}

/// Stored verifier for one user's token. The plaintext token is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Hex-encoded random salt
    pub salt: String,
    /// Hex-encoded PBKDF2-HMAC-SHA256 derived key
    pub hash: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

/// Request body of `POST /api/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// Response body of `POST /api/token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub email: String,
    pub token: String,
}
