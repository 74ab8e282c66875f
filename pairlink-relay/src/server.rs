//! Axum router setup.

use crate::config::RelayConfig;
use crate::handlers::exchange;
use crate::rate_limit::RateLimiter;
use crate::storage::RelayStorage;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: RelayStorage,
    pub limiter: RateLimiter,
    pub slot_ttl_secs: u64,
}

impl AppState {
    pub fn new(storage: RelayStorage, config: &RelayConfig) -> Self {
        Self {
            storage,
            limiter: RateLimiter::new(config.rate_limit_per_minute),
            slot_ttl_secs: config.slot_ttl_secs,
        }
    }
}

pub fn build_router(state: AppState, config: &RelayConfig) -> Router {
    // Pairing endpoints are unauthenticated; payloads are sealed end to end.
    Router::new()
        .route("/exchange", post(exchange::post_message))
        .route("/exchange/{key_id}", get(exchange::fetch_message))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
