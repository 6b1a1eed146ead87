use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::KEY_ADMIN_PASSWORD;
use crate::error::ShowcaseError;
use crate::router::ShowcaseState;

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

/// Password presented by the caller.
/// Accepts either:
/// - Header: `x-admin-password: ...`
/// - Header: `Authorization: Bearer <password>`
pub fn presented_password(headers: &HeaderMap) -> Option<String> {
    if let Some(hv) = headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(hv.to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// The stored admin password wins over the configured fallback.
pub async fn expected_password(state: &ShowcaseState) -> Result<Option<String>, ShowcaseError> {
    let stored = state
        .storage
        .config_value(KEY_ADMIN_PASSWORD)
        .await?
        .filter(|pw| !pw.is_empty());
    Ok(stored.or_else(|| state.admin_fallback.as_deref().map(str::to_string)))
}

/// Constant-time comparison. An unset password never matches.
pub fn password_matches(expected: Option<&str>, presented: &str) -> bool {
    match expected {
        Some(expected) if !expected.is_empty() => {
            bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
        }
        _ => false,
    }
}

pub async fn ensure_admin(state: &ShowcaseState, headers: &HeaderMap) -> Result<(), ShowcaseError> {
    let Some(presented) = presented_password(headers) else {
        return Err(ShowcaseError::Unauthorized);
    };
    let expected = expected_password(state).await?;
    if password_matches(expected.as_deref(), &presented) {
        Ok(())
    } else {
        debug!("admin password rejected");
        Err(ShowcaseError::Unauthorized)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<ShowcaseState> for RequireAdmin {
    type Rejection = ShowcaseError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ShowcaseState,
    ) -> Result<Self, Self::Rejection> {
        ensure_admin(state, &parts.headers).await?;
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_password(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(presented_password(&headers).as_deref(), Some("s3cret"));
        headers.insert(ADMIN_PASSWORD_HEADER, HeaderValue::from_static("other"));
        assert_eq!(presented_password(&headers).as_deref(), Some("other"));
    }

    #[test]
    fn unset_password_never_matches() {
        assert!(!password_matches(None, ""));
        assert!(!password_matches(Some(""), ""));
        assert!(!password_matches(Some("a"), "b"));
        assert!(password_matches(Some("a"), "a"));
    }
}
