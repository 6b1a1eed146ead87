use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::ShowcaseError;
use crate::middleware::auth::{RequireAdmin, expected_password, password_matches};
use crate::router::ShowcaseState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub counter: i64,
    pub configured: bool,
    pub model: String,
}

/// POST /api/admin/login
pub async fn login(
    State(state): State<ShowcaseState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ShowcaseError> {
    let expected = expected_password(&state).await?;
    if expected.is_none() {
        warn!("admin login attempted but no admin password is configured");
    }
    if !password_matches(expected.as_deref(), &req.password) {
        return Err(ShowcaseError::Unauthorized);
    }
    info!("admin logged in");
    Ok(Json(LoginResponse { ok: true }))
}

/// GET /api/admin/config -> every key, secrets included.
pub async fn full_config(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
) -> Result<Json<BTreeMap<String, String>>, ShowcaseError> {
    Ok(Json(state.storage.config_map().await?))
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
) -> Result<Json<StatsResponse>, ShowcaseError> {
    Ok(Json(StatsResponse {
        counter: state.storage.counter().await?,
        configured: state.relay.is_configured().await?,
        model: state.relay.model().to_string(),
    }))
}
