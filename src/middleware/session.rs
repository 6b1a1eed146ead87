use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::convert::Infallible;
use time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "showcase_session";
pub const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_LEN: usize = 128;

/// Identifies the browser session a chat message counts against.
///
/// Read from the `showcase_session` cookie or the `x-session-id` header. A
/// fresh id is minted otherwise; `jar` then carries the cookie to set, so
/// handlers return it alongside their response.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: String,
    pub jar: CookieJar,
}

fn valid(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl<S> FromRequestParts<S> for ChatSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned())
            && valid(&id)
        {
            return Ok(Self { id, jar });
        }

        if let Some(id) = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| valid(id))
        {
            return Ok(Self {
                id: id.to_string(),
                jar,
            });
        }

        let id = Uuid::new_v4().to_string();
        let jar = jar.add(build_cookie(id.clone()));
        Ok(Self { id, jar })
    }
}

fn build_cookie(value: String) -> Cookie<'static> {
    Cookie::build(Cookie::new(SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(1))
        .build()
}
