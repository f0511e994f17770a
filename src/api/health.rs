use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::payments::plugin::PaymentConfigField;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub gateway: String,
    pub gateway_active: bool,
    pub token_store: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version,
        gateway: state.plugin.gateway_config().gateway_name.clone(),
        gateway_active: state.plugin.is_active(),
        token_store: state.token_store.to_string(),
    })
}

pub async fn payment_config(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentConfigField>>, StatusCode> {
    state
        .plugin
        .get_payment_config(None)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
