use axum::extract::State;
use tracing::info;

use crate::error::ShowcaseError;
use crate::middleware::auth::RequireAdmin;
use crate::router::ShowcaseState;

/// GET /api/counter -> current value as plain text.
pub async fn get_counter(State(state): State<ShowcaseState>) -> Result<String, ShowcaseError> {
    Ok(state.storage.counter().await?.to_string())
}

/// GET|POST /api/counter/increment -> new value as plain text.
pub async fn increment_counter(
    State(state): State<ShowcaseState>,
) -> Result<String, ShowcaseError> {
    let value = state.storage.increment_counter().await?;
    info!(value, "counter incremented");
    Ok(value.to_string())
}

/// POST /api/counter (admin) -> raise the counter to the posted value.
/// The counter never moves down; the resulting value is returned.
pub async fn raise_counter(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
    body: String,
) -> Result<String, ShowcaseError> {
    let requested: i64 = body
        .trim()
        .parse()
        .map_err(|_| ShowcaseError::BadRequest(format!("not an integer: {:?}", body.trim())))?;
    if requested < 0 {
        return Err(ShowcaseError::BadRequest(
            "counter value must not be negative".to_string(),
        ));
    }
    let value = state.storage.raise_counter(requested).await?;
    info!(requested, value, "counter raised");
    Ok(value.to_string())
}
