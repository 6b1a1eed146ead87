use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use axum_extra::extract::cookie::CookieJar;
use futures::{StreamExt, future, stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tracing::{info, warn};

use crate::error::ShowcaseError;
use crate::middleware::auth::RequireAdmin;
use crate::middleware::session::ChatSession;
use crate::router::ShowcaseState;
use crate::service::relay::ChatDelta;
use crate::types::openai::ChatRequest;
use crate::types::usage::UsageSnapshot;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub usage: UsageSnapshot,
}

/// POST /api/chat
///
/// Counts the message against the session's daily limit and the global
/// counter, then relays it. Streams `data: {"content": ...}` events followed
/// by `event: done`, or answers with JSON when `stream` is false. Failures
/// after the stream has started arrive as `event: error`.
pub async fn chat_handler(
    State(state): State<ShowcaseState>,
    session: ChatSession,
    Json(req): Json<ChatRequest>,
) -> Result<(CookieJar, Response), ShowcaseError> {
    if req.messages.is_empty() {
        return Err(ShowcaseError::BadRequest(
            "messages must not be empty".to_string(),
        ));
    }
    if !state.relay.is_configured().await? {
        return Err(ShowcaseError::NotConfigured);
    }

    let decision = state.usage.check_and_record(&session.id).await?;
    if !decision.allowed {
        return Err(ShowcaseError::LimitReached {
            used: decision.used,
            limit: decision.limit,
        });
    }
    let total = state.storage.increment_counter().await?;
    info!(
        session = %session.id,
        used = decision.used,
        limit = decision.limit,
        total,
        stream = req.stream,
        "chat message accepted"
    );
    let usage = UsageSnapshot::new(decision.used, decision.limit);

    if !req.stream {
        let content = state.relay.complete_chat(&req.messages).await?;
        return Ok((session.jar, Json(ChatReply { content, usage }).into_response()));
    }

    let deltas = state.relay.stream_chat(&req.messages).await?;
    let events = deltas
        .chain(stream::once(future::ready(Ok(ChatDelta::Done {
            finish_reason: None,
        }))))
        .scan(false, |finished, item| {
            if *finished {
                return future::ready(None);
            }
            if matches!(item, Ok(ChatDelta::Done { .. }) | Err(_)) {
                *finished = true;
            }
            future::ready(Some(Ok::<Event, Infallible>(to_event(item))))
        });

    let sse = Sse::new(events).keep_alive(KeepAlive::default());
    Ok((session.jar, sse.into_response()))
}

fn to_event(item: Result<ChatDelta, ShowcaseError>) -> Event {
    match item {
        Ok(ChatDelta::Content(content)) => {
            Event::default().data(json!({ "content": content }).to_string())
        }
        Ok(ChatDelta::Done { finish_reason }) => Event::default()
            .event("done")
            .data(finish_reason.unwrap_or_else(|| "stop".to_string())),
        Err(e) => {
            warn!(error = %e, "chat stream failed");
            Event::default().event("error").data(e.to_string())
        }
    }
}

/// GET /api/chat/usage
pub async fn usage_handler(
    State(state): State<ShowcaseState>,
    session: ChatSession,
) -> Result<(CookieJar, Json<UsageSnapshot>), ShowcaseError> {
    let snapshot = state.usage.snapshot(&session.id).await?;
    Ok((session.jar, Json(snapshot)))
}

/// POST /api/chat/reset (admin) -> zero the daily count of the session
/// named by the cookie or `x-session-id`.
pub async fn reset_handler(
    State(state): State<ShowcaseState>,
    _admin: RequireAdmin,
    session: ChatSession,
) -> Result<(CookieJar, Json<UsageSnapshot>), ShowcaseError> {
    state.usage.reset(&session.id).await;
    info!(session = %session.id, "chat usage reset");
    let snapshot = state.usage.snapshot(&session.id).await?;
    Ok((session.jar, Json(snapshot)))
}
