//! Polls a remote `/api/config` document and reports what changed.
//!
//! Each poll is reduced to two SHA-256 fingerprints, one over the chat API
//! keys and one over the contact card and company name. Comparing
//! fingerprints with the previous poll decides whether the chat client has to
//! be rebuilt or only the site content refreshed.

use crate::config::{KEY_ADMIN_PASSWORD, KEY_API_KEY, SITE_DEFAULTS};
use crate::db::{ConfigKey, SiteSettings, SiteStorage};
use crate::error::ShowcaseError;
use crate::service::relay::ChatRelay;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    Unchanged,
    ApiChanged,
    SiteChanged,
    Both,
}

impl ConfigChange {
    fn from_flags(api: bool, site: bool) -> Self {
        match (api, site) {
            (false, false) => Self::Unchanged,
            (true, false) => Self::ApiChanged,
            (false, true) => Self::SiteChanged,
            (true, true) => Self::Both,
        }
    }

    /// The chat client must be rebuilt with the new endpoint or key.
    pub fn requires_reload(self) -> bool {
        matches!(self, Self::ApiChanged | Self::Both)
    }

    pub fn is_changed(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub api: String,
    pub site: String,
}

impl Fingerprints {
    pub fn of(map: &BTreeMap<String, String>) -> Self {
        let api = map.iter().filter(|(k, _)| ConfigKey::affects_api(k));
        let site = map
            .iter()
            .filter(|(k, _)| ConfigKey::classify(k) == ConfigKey::Contact);
        Self {
            api: fingerprint(api),
            site: fingerprint(site),
        }
    }
}

/// SHA-256 hex digest over `key=value` lines in key order.
pub fn fingerprint<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let mut sorted: Vec<_> = pairs.collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for (k, v) in sorted {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub config: BTreeMap<String, String>,
    pub change: ConfigChange,
    /// False when the remote could not be read and `config` is a fallback.
    pub fetched: bool,
}

pub struct ConfigWatcher {
    client: reqwest::Client,
    url: Url,
    admin_password: Option<String>,
    last: Option<(BTreeMap<String, String>, Fingerprints)>,
}

impl ConfigWatcher {
    pub fn new(url: Url) -> Result<Self, ShowcaseError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            admin_password: None,
            last: None,
        })
    }

    /// Sent as `x-admin-password`, needed to read secret keys.
    pub fn with_admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = Some(password.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<BTreeMap<String, String>, ShowcaseError> {
        let mut req = self.client.get(self.url.clone());
        if let Some(pw) = self.admin_password.as_deref() {
            req = req.header("x-admin-password", pw);
        }
        let raw: BTreeMap<String, Value> = req.send().await?.error_for_status()?.json().await?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect())
    }

    /// Fetch once and compare with the previous successful fetch.
    ///
    /// Never fails: when the remote is unreachable the last known config (or
    /// the built-in defaults) is returned with `Unchanged`.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let config = match self.fetch().await {
            Ok(config) => config,
            Err(e) => {
                warn!(url = %self.url, error = %e, "config poll failed; using last known values");
                let config = match self.last.as_ref() {
                    Some((last, _)) => last.clone(),
                    None => default_config(),
                };
                return PollOutcome {
                    config,
                    change: ConfigChange::Unchanged,
                    fetched: false,
                };
            }
        };

        let prints = Fingerprints::of(&config);
        let change = match self.last.as_ref() {
            None => ConfigChange::Unchanged,
            Some((_, prev)) => {
                ConfigChange::from_flags(prev.api != prints.api, prev.site != prints.site)
            }
        };
        debug!(url = %self.url, ?change, "config polled");
        self.last = Some((config.clone(), prints));
        PollOutcome {
            config,
            change,
            fetched: true,
        }
    }

    /// Poll on `interval` in the background, calling `on_change` for every
    /// poll that reports a change.
    pub fn spawn<F, Fut>(mut self, interval: Duration, mut on_change: F) -> JoinHandle<()>
    where
        F: FnMut(PollOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        tokio::spawn(async move {
            info!(url = %self.url, every = ?interval, "config watcher started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = self.poll_once().await;
                if outcome.change.is_changed() {
                    info!(url = %self.url, change = ?outcome.change, "remote config changed");
                    on_change(outcome).await;
                }
            }
        })
    }
}

/// Copy a fetched remote config into local storage, never touching the local
/// admin password. With `reload` the relay switches to the remote endpoint.
pub async fn mirror_into(
    storage: &SiteStorage,
    relay: &ChatRelay,
    outcome: &PollOutcome,
    reload: bool,
) -> Result<(), ShowcaseError> {
    if !outcome.fetched {
        return Ok(());
    }
    let values: BTreeMap<String, String> = outcome
        .config
        .iter()
        .filter(|(k, _)| k.as_str() != KEY_ADMIN_PASSWORD)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    storage.set_config_values(&values).await?;
    if reload {
        let mut api = SiteSettings::from_map(&values).api;
        // the public document carries no key; keep ours
        if !values.contains_key(KEY_API_KEY) {
            api.api_key = relay.current_settings().await?.api_key;
        }
        relay.apply_settings(api).await;
    }
    Ok(())
}

pub fn default_config() -> BTreeMap<String, String> {
    SITE_DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::get};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Shared = Arc<Mutex<BTreeMap<String, String>>>;

    async fn serve(shared: Shared) -> Url {
        async fn config(State(s): State<Shared>) -> Json<BTreeMap<String, String>> {
            Json(s.lock().unwrap().clone())
        }
        let app = Router::new()
            .route("/api/config", get(config))
            .with_state(shared);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/api/config")).unwrap()
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_ignores_insertion_order_and_splits_sections() {
        let a = map(&[("API_KEY", "k"), ("COMPANY_NAME", "Acme")]);
        let b = map(&[("COMPANY_NAME", "Acme"), ("API_KEY", "k")]);
        assert_eq!(Fingerprints::of(&a), Fingerprints::of(&b));

        let c = map(&[("API_KEY", "k2"), ("COMPANY_NAME", "Acme")]);
        let (fa, fc) = (Fingerprints::of(&a), Fingerprints::of(&c));
        assert_ne!(fa.api, fc.api);
        assert_eq!(fa.site, fc.site);
        assert_eq!(fa.api.len(), 64);
    }

    #[test]
    fn admin_password_and_unknown_keys_do_not_count_as_change() {
        let a = map(&[("ADMIN_PASSWORD", "one"), ("COMPANY_NAME", "Acme")]);
        let b = map(&[
            ("ADMIN_PASSWORD", "two"),
            ("COMPANY_NAME", "Acme"),
            ("BANNER_TEXT", "hello"),
        ]);
        assert_eq!(Fingerprints::of(&a), Fingerprints::of(&b));
    }

    #[tokio::test]
    async fn detects_api_and_site_changes() {
        let shared: Shared = Arc::new(Mutex::new(map(&[
            ("API_ENDPOINT", "https://a.example/v1"),
            ("CONTACT_NAME", "Ada"),
        ])));
        let url = serve(shared.clone()).await;
        let mut watcher = ConfigWatcher::new(url).unwrap();

        let first = watcher.poll_once().await;
        assert!(first.fetched);
        assert_eq!(first.change, ConfigChange::Unchanged);
        assert_eq!(watcher.poll_once().await.change, ConfigChange::Unchanged);

        shared
            .lock()
            .unwrap()
            .insert("CONTACT_NAME".to_string(), "Grace".to_string());
        let site = watcher.poll_once().await;
        assert_eq!(site.change, ConfigChange::SiteChanged);
        assert!(!site.change.requires_reload());

        shared
            .lock()
            .unwrap()
            .insert("API_ENDPOINT".to_string(), "https://b.example/v1".to_string());
        let api = watcher.poll_once().await;
        assert_eq!(api.change, ConfigChange::ApiChanged);
        assert!(api.change.requires_reload());
        assert_eq!(
            api.config.get("API_ENDPOINT").map(String::as_str),
            Some("https://b.example/v1")
        );
    }

    #[tokio::test]
    async fn mirror_keeps_local_key_and_password() {
        let (storage, path) = crate::db::sqlite::tests::temp_storage("mirror").await;
        storage.set_config_value("API_KEY", "sk-local").await.unwrap();
        storage.set_config_value("ADMIN_PASSWORD", "local-pw").await.unwrap();
        let relay = ChatRelay::new(storage.clone(), &crate::config::Config::default()).unwrap();

        let outcome = PollOutcome {
            config: map(&[
                ("API_ENDPOINT", "https://remote.example/v1"),
                ("ADMIN_PASSWORD", "remote-pw"),
                ("COMPANY_NAME", "Remote GmbH"),
            ]),
            change: ConfigChange::Both,
            fetched: true,
        };
        mirror_into(&storage, &relay, &outcome, true).await.unwrap();

        let local = storage.config_map().await.unwrap();
        assert_eq!(local["ADMIN_PASSWORD"], "local-pw");
        assert_eq!(local["COMPANY_NAME"], "Remote GmbH");
        let api = relay.current_settings().await.unwrap();
        assert_eq!(api.endpoint, "https://remote.example/v1");
        assert_eq!(api.api_key, "sk-local");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn mirror_ignores_fallback_outcomes() {
        let (storage, path) = crate::db::sqlite::tests::temp_storage("mirror-fallback").await;
        storage.set_config_value("COMPANY_NAME", "Local").await.unwrap();
        let relay = ChatRelay::new(storage.clone(), &crate::config::Config::default()).unwrap();

        let outcome = PollOutcome {
            config: default_config(),
            change: ConfigChange::Both,
            fetched: false,
        };
        mirror_into(&storage, &relay, &outcome, true).await.unwrap();

        assert_eq!(
            storage.config_map().await.unwrap(),
            map(&[("COMPANY_NAME", "Local")])
        );
        assert_eq!(relay.current_settings().await.unwrap().endpoint, "");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn spawned_watcher_reports_only_changed_polls() {
        let shared: Shared = Arc::new(Mutex::new(map(&[
            ("API_KEY", "sk-1"),
            ("CONTACT_NAME", "Ada"),
        ])));
        let url = serve(shared.clone()).await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let started = tokio::time::Instant::now();
        // clamped up to one second
        let handle = ConfigWatcher::new(url)
            .unwrap()
            .spawn(Duration::from_millis(10), move |outcome| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((outcome.change, tokio::time::Instant::now()));
                }
            });

        // the baseline poll is not reported
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        shared
            .lock()
            .unwrap()
            .insert("API_KEY".to_string(), "sk-2".to_string());
        let (change, api_at) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change, ConfigChange::ApiChanged);
        assert!(api_at - started >= Duration::from_millis(900));

        shared
            .lock()
            .unwrap()
            .insert("CONTACT_NAME".to_string(), "Grace".to_string());
        let (change, site_at) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change, ConfigChange::SiteChanged);
        assert!(site_at - api_at >= Duration::from_millis(900));

        // unchanged polls stay silent
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(rx.try_recv().is_err());
        handle.abort();
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_defaults() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/api/config")).unwrap();
        let mut watcher = ConfigWatcher::new(url).unwrap();

        let outcome = watcher.poll_once().await;
        assert!(!outcome.fetched);
        assert_eq!(outcome.change, ConfigChange::Unchanged);
        assert_eq!(outcome.config, default_config());
    }
}
