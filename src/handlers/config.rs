use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::KEY_ADMIN_PASSWORD;
use crate::db::{ConfigKey, models::public_view};
use crate::error::ShowcaseError;
use crate::middleware::auth::{RequireAdmin, ensure_admin, presented_password};
use crate::router::ShowcaseState;

pub type ConfigMap = BTreeMap<String, String>;

/// GET /api/config -> every non-secret key, or every key when the admin
/// password is presented. A wrong password is rejected rather than ignored.
pub async fn get_public_config(
    State(state): State<ShowcaseState>,
    headers: HeaderMap,
) -> Result<Json<ConfigMap>, ShowcaseError> {
    let map = state.storage.config_map().await?;
    if presented_password(&headers).is_some() {
        ensure_admin(&state, &headers).await?;
        return Ok(Json(map));
    }
    Ok(Json(public_view(&map)))
}

/// POST /api/config (admin) -> upsert a JSON object, return the public view.
pub async fn update_config(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
    Json(body): Json<BTreeMap<String, Value>>,
) -> Result<Json<ConfigMap>, ShowcaseError> {
    let values = normalize(body)?;
    state.storage.set_config_values(&values).await?;
    info!(keys = ?values.keys().collect::<Vec<_>>(), "config updated");
    if values.keys().any(|k| ConfigKey::affects_api(k)) {
        state.relay.invalidate().await;
    }
    let map = state.storage.config_map().await?;
    Ok(Json(public_view(&map)))
}

/// GET /api/config/{key} -> value as text. Secret keys need the admin password.
pub async fn get_config_value(
    State(state): State<ShowcaseState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<String, ShowcaseError> {
    if ConfigKey::is_secret(&key) {
        ensure_admin(&state, &headers).await?;
    }
    state
        .storage
        .config_value(&key)
        .await?
        .ok_or(ShowcaseError::NotFound(format!("config key {key}")))
}

/// POST /api/config/{key} (admin) -> store the text body, echo it back.
pub async fn set_config_value(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
    Path(key): Path<String>,
    body: String,
) -> Result<String, ShowcaseError> {
    validate_key(&key)?;
    validate_value(&key, &body)?;
    state.storage.set_config_value(&key, &body).await?;
    info!(key = %key, "config value set");
    if ConfigKey::affects_api(&key) {
        state.relay.invalidate().await;
    }
    Ok(body)
}

/// DELETE /api/config/{key} (admin).
pub async fn delete_config_value(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
    Path(key): Path<String>,
) -> Result<StatusCode, ShowcaseError> {
    if key == KEY_ADMIN_PASSWORD {
        return Err(ShowcaseError::BadRequest(
            "the admin password can be changed but not deleted".to_string(),
        ));
    }
    if !state.storage.delete_config_value(&key).await? {
        return Err(ShowcaseError::NotFound(format!("config key {key}")));
    }
    info!(key = %key, "config value deleted");
    if ConfigKey::affects_api(&key) {
        state.relay.invalidate().await;
    }
    Ok(StatusCode::NO_CONTENT)
}

fn validate_key(key: &str) -> Result<(), ShowcaseError> {
    if key.trim().is_empty() || key.len() > 128 {
        return Err(ShowcaseError::BadRequest(format!("invalid config key {key:?}")));
    }
    Ok(())
}

/// A blank admin password would lock every admin route.
fn validate_value(key: &str, value: &str) -> Result<(), ShowcaseError> {
    if key == KEY_ADMIN_PASSWORD && value.trim().is_empty() {
        return Err(ShowcaseError::BadRequest(
            "admin password must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Strings are stored as-is, numbers and booleans in their JSON form.
fn normalize(body: BTreeMap<String, Value>) -> Result<ConfigMap, ShowcaseError> {
    body.into_iter()
        .map(|(k, v)| {
            validate_key(&k)?;
            let value = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ShowcaseError::BadRequest(format!(
                        "value of {k} must be a string, number or boolean"
                    )));
                }
            };
            validate_value(&k, &value)?;
            Ok((k, value))
        })
        .collect()
}
