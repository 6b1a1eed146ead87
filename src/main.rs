use mimalloc::MiMalloc;
use showcase::config::{KEY_ADMIN_PASSWORD, SITE_DEFAULTS};
use showcase::db::SiteStorage;
use showcase::service::config_watch::{ConfigWatcher, mirror_into};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &showcase::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        model = %cfg.model,
        daily_message_limit = cfg.daily_message_limit,
        watch_url = %cfg.watch_url.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
    );

    let storage = SiteStorage::connect(&cfg.database_url).await?;
    let seeded = storage.seed_defaults(SITE_DEFAULTS).await?;
    if seeded > 0 {
        info!(count = seeded, "seeded default site settings");
    }
    if let Some(pw) = cfg.admin_password.as_deref().filter(|pw| !pw.is_empty())
        && storage.seed_defaults(&[(KEY_ADMIN_PASSWORD, pw)]).await? > 0
    {
        info!("admin password seeded from configuration");
    }

    let usage = showcase::service::usage::spawn(cfg.daily_message_limit).await?;
    let relay = Arc::new(showcase::ChatRelay::new(storage.clone(), cfg)?);
    if !relay.is_configured().await? {
        warn!("chat endpoint or API key missing; /api/chat answers 503 until configured");
    }

    if let Some(url) = cfg.watch_url.clone() {
        let mut watcher = ConfigWatcher::new(url)?;
        if let Some(pw) = cfg.watch_password.clone() {
            watcher = watcher.with_admin_password(pw);
        }
        let initial = watcher.poll_once().await;
        if let Err(e) = mirror_into(&storage, &relay, &initial, true).await {
            warn!(error = %e, "failed to apply initial remote config");
        }

        let (storage, relay) = (storage.clone(), relay.clone());
        watcher.spawn(cfg.watch_interval(), move |outcome| {
            let (storage, relay) = (storage.clone(), relay.clone());
            async move {
                let reload = outcome.change.requires_reload();
                if let Err(e) = mirror_into(&storage, &relay, &outcome, reload).await {
                    warn!(error = %e, "failed to apply remote config");
                }
            }
        });
    }

    let state = showcase::router::ShowcaseState::new(
        storage,
        relay,
        usage,
        cfg.admin_password.as_deref().map(Arc::from),
        cfg.body_limit_bytes,
    );
    let app = showcase::router::showcase_router(state);

    let listener = TcpListener::bind(cfg.listen_addr.as_str()).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
