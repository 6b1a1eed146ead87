use crate::db::SiteStorage;
use crate::handlers::{admin, chat, config, counter};
use crate::service::relay::ChatRelay;
use crate::service::usage::UsageHandle;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct ShowcaseState {
    pub storage: SiteStorage,
    pub relay: Arc<ChatRelay>,
    pub usage: UsageHandle,
    /// Used when the database holds no `ADMIN_PASSWORD`.
    pub admin_fallback: Option<Arc<str>>,
    pub body_limit: usize,
}

impl ShowcaseState {
    pub fn new(
        storage: SiteStorage,
        relay: Arc<ChatRelay>,
        usage: UsageHandle,
        admin_fallback: Option<Arc<str>>,
        body_limit: usize,
    ) -> Self {
        Self {
            storage,
            relay,
            usage,
            admin_fallback,
            body_limit,
        }
    }
}

pub fn showcase_router(state: ShowcaseState) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/api/counter",
            get(counter::get_counter).post(counter::raise_counter),
        )
        .route(
            "/api/counter/increment",
            get(counter::increment_counter).post(counter::increment_counter),
        )
        .route(
            "/api/config",
            get(config::get_public_config).post(config::update_config),
        )
        .route(
            "/api/config/{key}",
            get(config::get_config_value)
                .post(config::set_config_value)
                .delete(config::delete_config_value),
        )
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/config", get(admin::full_config))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/chat/usage", get(chat::usage_handler))
        .route("/api/chat/reset", post(chat::reset_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
