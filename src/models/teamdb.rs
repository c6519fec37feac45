//! Document and health response models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body of `GET /api/teamdb`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDbResponse {
    pub database: Value,
    /// Modification time of the stored document; echo it back as
    /// `X-Client-Modified-At` on the next write.
    pub last_modified: Option<String>,
}

/// Response body of a successful write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub ok: bool,
}

/// Response body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}
