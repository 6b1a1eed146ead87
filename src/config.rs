use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::error::ShowcaseError;

pub const KEY_API_ENDPOINT: &str = "API_ENDPOINT";
pub const KEY_API_KEY: &str = "API_KEY";
pub const KEY_ADMIN_PASSWORD: &str = "ADMIN_PASSWORD";
pub const KEY_CONTACT_NAME: &str = "CONTACT_NAME";
pub const KEY_CONTACT_TITLE: &str = "CONTACT_TITLE";
pub const KEY_CONTACT_PHOTO: &str = "CONTACT_PHOTO";
pub const KEY_CONTACT_MEETING: &str = "CONTACT_MEETING";
pub const KEY_CONTACT_LINKEDIN: &str = "CONTACT_LINKEDIN";
pub const KEY_COMPANY_NAME: &str = "COMPANY_NAME";

/// Values written into an empty `config` table so the site renders before
/// an administrator has configured anything.
pub const SITE_DEFAULTS: &[(&str, &str)] = &[
    (
        KEY_API_ENDPOINT,
        "https://deepseek-r1-distill-llama-70b.endpoints.kepler.ai.cloud.ovh.net/api/openai_compat/v1",
    ),
    (KEY_API_KEY, ""),
    (KEY_CONTACT_NAME, "Support Team"),
    (KEY_CONTACT_TITLE, "Customer Support"),
    (KEY_CONTACT_PHOTO, ""),
    (KEY_CONTACT_MEETING, "#"),
    (KEY_CONTACT_LINKEDIN, "#"),
    (KEY_COMPANY_NAME, "Synaigy GmbH"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Seeds `ADMIN_PASSWORD` when the database has none.
    pub admin_password: Option<String>,
    pub model: String,
    /// Messages a single chat session may send per UTC day. Zero disables chat.
    pub daily_message_limit: u32,
    pub upstream_per_minute: u32,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub proxy: Option<Url>,
    pub body_limit_bytes: usize,
    /// Remote `/api/config` endpoint whose settings this instance mirrors.
    pub watch_url: Option<Url>,
    /// Admin password of the remote. With it the remote `/api/config` also
    /// serves `API_KEY`, which is then mirrored.
    pub watch_password: Option<String>,
    pub watch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            database_url: "sqlite://showcase.sqlite".to_string(),
            loglevel: "info".to_string(),
            admin_password: None,
            model: "DeepSeek-R1-Distill-Llama-70B".to_string(),
            daily_message_limit: 10,
            upstream_per_minute: 60,
            request_timeout_secs: 120,
            connect_timeout_secs: 5,
            proxy: None,
            body_limit_bytes: 1024 * 1024,
            watch_url: None,
            watch_password: None,
            watch_interval_secs: 30,
        }
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `SHOWCASE_*` environment variables.
    pub fn load() -> Result<Self, ShowcaseError> {
        let cfg = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("SHOWCASE_"))
            .extract()?;
        Ok(cfg)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid showcase configuration"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_public_site_key() {
        for key in [
            KEY_API_ENDPOINT,
            KEY_CONTACT_NAME,
            KEY_CONTACT_TITLE,
            KEY_CONTACT_PHOTO,
            KEY_CONTACT_MEETING,
            KEY_CONTACT_LINKEDIN,
            KEY_COMPANY_NAME,
        ] {
            assert!(SITE_DEFAULTS.iter().any(|(k, _)| *k == key), "{key}");
        }
        assert!(!SITE_DEFAULTS.iter().any(|(k, _)| *k == KEY_ADMIN_PASSWORD));
    }

    #[test]
    fn durations_never_drop_to_zero() {
        let cfg = Config {
            watch_interval_secs: 0,
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(cfg.watch_interval(), Duration::from_secs(1));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(1));
    }
}
