//! TeamDB Backend
//!
//! Serves a single YAML team database over HTTP. Writes are schema-validated,
//! authenticated with per-user tokens and rejected when based on a stale read.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod schema;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::TokenStore;
use config::{Config, LogFormat};
use db::{format_timestamp, DocumentStore};
use models::HealthResponse;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub tokens: Arc<TokenStore>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration; a missing file is fatal
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", LogFormat::Text);
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config.log_level, config.log_format);

    tracing::info!("Starting Team DB Service");
    tracing::info!("Data root: {:?}", config.data_root);
    tracing::info!("Bind address: {}", config.bind_addr());
    tracing::info!("Keeping up to {} backups", config.max_backups);

    let store = Arc::new(DocumentStore::from_config(&config)?);
    let tokens = Arc::new(TokenStore::open(&config.data_root)?);

    let state = AppState {
        store,
        tokens,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allow_origins);

    // Token issuance is restricted to local callers
    let token_routes = Router::new()
        .route("/token", post(api::issue_token))
        .layer(middleware::from_fn(auth::loopback_only));

    let api_routes = Router::new()
        .route("/teamdb", get(api::get_teamdb).put(api::put_teamdb))
        .route("/health", get(health_check))
        .merge(token_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS configuration; a `*` entry allows any origin, credentials are never allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "teamdb".to_string(),
        timestamp: format_timestamp(&Utc::now()),
    })
}
