//! Token-based write authentication.
//!
//! Tokens are issued once per email and stored only as a salted
//! PBKDF2-HMAC-SHA256 verifier. Verification uses constant-time comparison to
//! mitigate timing attacks.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Mutex;

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::db::JsonStore;
use crate::errors::AppError;
use crate::models::{TokenEntry, DEFAULT_TOKEN_ITERATIONS};

/// Header carrying the plaintext write token.
pub const TOKEN_HEADER: &str = "x-teamdb-token";
/// Header carrying the email the token was issued to.
pub const EMAIL_HEADER: &str = "x-teamdb-email";

const TOKENS_NAMESPACE: &str = "tokens";
const TOKENS_KEY: &str = "tokens";

const TOKEN_BYTES: usize = 24;
const SALT_BYTES: usize = 16;
const KEY_BYTES: usize = 32;

/// Persistent map of email to token verifier.
pub struct TokenStore {
    storage: JsonStore,
    iterations: u32,
    write_lock: Mutex<()>,
}

impl TokenStore {
    /// Open the token store under `data_root`.
    pub fn open(data_root: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self::new(JsonStore::open(data_root)?))
    }

    /// Wrap an existing JSON store; new tokens use the default round count.
    pub fn new(storage: JsonStore) -> Self {
        Self {
            storage,
            iterations: DEFAULT_TOKEN_ITERATIONS,
            write_lock: Mutex::new(()),
        }
    }

    /// Use a different PBKDF2 round count for newly issued tokens.
    #[cfg(test)]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Issue a fresh token for `email`, replacing any previous one.
    ///
    /// The plaintext token is returned once and cannot be recovered later.
    pub fn issue(&self, email: &str) -> Result<String, AppError> {
        let mut rng = rand::thread_rng();

        let mut token_bytes = [0u8; TOKEN_BYTES];
        rng.fill_bytes(&mut token_bytes);
        let token = URL_SAFE_NO_PAD.encode(token_bytes);

        let mut salt = [0u8; SALT_BYTES];
        rng.fill_bytes(&mut salt);
        let key = derive_key(&token, &salt, self.iterations);

        let entry = TokenEntry {
            salt: hex::encode(salt),
            hash: hex::encode(key),
            iterations: self.iterations,
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut tokens = self.load_tokens()?;
        tokens.insert(email.to_string(), serde_json::to_value(&entry)?);
        self.storage.save(TOKENS_NAMESPACE, TOKENS_KEY, &tokens)?;

        Ok(token)
    }

    /// Check `token` against the verifier stored for `email`.
    ///
    /// Unknown emails and malformed entries never verify.
    pub fn verify(&self, email: &str, token: &str) -> Result<bool, AppError> {
        let tokens = self.load_tokens()?;
        let Some(raw) = tokens.get(email) else {
            return Ok(false);
        };

        match serde_json::from_value::<TokenEntry>(raw.clone()) {
            Ok(entry) => Ok(entry_matches(&entry, token)),
            Err(e) => {
                tracing::warn!("Malformed token entry for {}: {}", email, e);
                Ok(false)
            }
        }
    }

    fn load_tokens(&self) -> Result<BTreeMap<String, serde_json::Value>, AppError> {
        Ok(self
            .storage
            .load(TOKENS_NAMESPACE, TOKENS_KEY)?
            .unwrap_or_default())
    }
}

fn derive_key(token: &str, salt: &[u8], iterations: u32) -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(token.as_bytes(), salt, iterations, &mut key);
    key
}

fn entry_matches(entry: &TokenEntry, token: &str) -> bool {
    if entry.iterations == 0 {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(&entry.salt), hex::decode(&entry.hash)) else {
        return false;
    };

    let derived = derive_key(token, &salt, entry.iterations);
    constant_time_eq(&derived, &expected)
}

/// Perform constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// True for 127.0.0.0/8, ::1 and IPv4-mapped loopback.
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

/// Middleware restricting a route to callers on the local machine.
pub async fn loopback_only(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if is_loopback(peer.ip()) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected token request from non-local peer {}", peer);
        AppError::Forbidden("Token generation allowed from localhost only".to_string())
            .into_response()
    }
}
