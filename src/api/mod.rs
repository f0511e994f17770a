//! HTTP surface of the gateway service

pub mod health;

use crate::payments::plugin::MpesaPlugin;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub plugin: Arc<MpesaPlugin>,
    /// Name of the token store backend, for diagnostics
    pub token_store: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/payment-config", get(health::payment_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
