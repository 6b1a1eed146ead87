use crate::api::openai_api::OpenAiApi;
use crate::config::Config;
use crate::db::{ApiSettings, SiteSettings, SiteStorage};
use crate::error::{ShowcaseError, UpstreamError};
use crate::types::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage};
use backon::ExponentialBuilder;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, future};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::fmt::Display;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One piece of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDelta {
    Content(String),
    Done { finish_reason: Option<String> },
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, ShowcaseError>> + Send>>;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(2)
        .with_jitter()
}

/// Forwards chat requests to the configured OpenAI-compatible endpoint.
///
/// The endpoint and key are cached and loaded lazily from storage on first
/// use; `apply_settings` or `invalidate` swap them after a config change.
pub struct ChatRelay {
    client: reqwest::Client,
    storage: SiteStorage,
    model: String,
    limiter: Arc<DefaultDirectRateLimiter>,
    settings: RwLock<Option<ApiSettings>>,
}

impl ChatRelay {
    pub fn new(storage: SiteStorage, cfg: &Config) -> Result<Self, ShowcaseError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("showcase/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.request_timeout());
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        let client = builder.build()?;

        let per_minute = NonZeroU32::new(cfg.upstream_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            storage,
            model: cfg.model.clone(),
            limiter,
            settings: RwLock::new(None),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Cached settings, loading them from storage when nothing is cached.
    pub async fn current_settings(&self) -> Result<ApiSettings, ShowcaseError> {
        {
            let cached = self.settings.read().await;
            if let Some(settings) = cached.as_ref() {
                return Ok(settings.clone());
            }
        }
        let map = self.storage.config_map().await?;
        let loaded = SiteSettings::from_map(&map).api;
        info!(
            endpoint = %loaded.endpoint,
            configured = loaded.is_configured(),
            "chat settings loaded from storage"
        );
        *self.settings.write().await = Some(loaded.clone());
        Ok(loaded)
    }

    /// Replace the cached settings. Returns whether anything changed.
    pub async fn apply_settings(&self, settings: ApiSettings) -> bool {
        let mut cached = self.settings.write().await;
        if cached.as_ref() == Some(&settings) {
            return false;
        }
        info!(endpoint = %settings.endpoint, "chat settings updated");
        *cached = Some(settings);
        true
    }

    /// Drop the cache; the next request reloads from storage.
    pub async fn invalidate(&self) {
        *self.settings.write().await = None;
        debug!("chat settings cache cleared");
    }

    pub async fn is_configured(&self) -> Result<bool, ShowcaseError> {
        Ok(self.current_settings().await?.is_configured())
    }

    pub async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ShowcaseError> {
        let resp = self.send(messages, true).await?;
        Ok(Box::pin(chat_deltas(resp.bytes_stream())))
    }

    pub async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<String, ShowcaseError> {
        let resp = self.send(messages, false).await?;
        let completion: ChatCompletion = resp.json().await?;
        Ok(completion.content())
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, ShowcaseError> {
        if messages.is_empty() {
            return Err(ShowcaseError::BadRequest("messages must not be empty".to_string()));
        }
        let settings = self.current_settings().await?;
        if !settings.is_configured() {
            return Err(ShowcaseError::NotConfigured);
        }
        let url = OpenAiApi::completions_url(&settings.endpoint).map_err(|e| {
            warn!(endpoint = %settings.endpoint, error = %e, "stored chat endpoint is not a URL");
            ShowcaseError::NotConfigured
        })?;

        self.limiter.until_ready().await;

        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream,
        };
        debug!(url = %url, stream, messages = messages.len(), "forwarding chat request");
        let resp = OpenAiApi::try_post_chat(
            self.client.clone(),
            url,
            &settings.api_key,
            default_retry_policy(),
            &body,
        )
        .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let bytes = resp.bytes().await?;
        warn!(%status, "chat endpoint rejected request");
        Err(match serde_json::from_slice::<UpstreamError>(&bytes) {
            Ok(error) => ShowcaseError::UpstreamError { status, error },
            Err(_) => ShowcaseError::UpstreamStatus(status),
        })
    }
}

enum Parsed {
    Chunk {
        content: Option<String>,
        finish_reason: Option<String>,
    },
    Done,
    Skip,
    Failed(String),
}

fn parse_event_data(data: &str) -> Parsed {
    let data = data.trim();
    if data == "[DONE]" {
        return Parsed::Done;
    }
    if data.is_empty() {
        return Parsed::Skip;
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) if !chunk.choices.is_empty() => Parsed::Chunk {
            content: chunk.content().map(str::to_string),
            finish_reason: chunk.finish_reason().map(str::to_string),
        },
        _ => match serde_json::from_str::<UpstreamError>(data) {
            Ok(err) => Parsed::Failed(err.error.message),
            Err(_) => {
                warn!(data, "skipping malformed completion chunk");
                Parsed::Skip
            }
        },
    }
}

#[derive(Default)]
struct StreamState {
    finish_reason: Option<String>,
    finished: bool,
}

/// Turn an OpenAI-style SSE body into `ChatDelta`s. The stream ends after
/// `[DONE]` or the first error.
pub fn chat_deltas<S, B, E>(body: S) -> impl Stream<Item = Result<ChatDelta, ShowcaseError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    body.eventsource()
        .scan(StreamState::default(), |state, event| {
            if state.finished {
                return future::ready(None);
            }
            let item = match event {
                Ok(event) => match parse_event_data(&event.data) {
                    Parsed::Chunk {
                        content,
                        finish_reason,
                    } => {
                        if finish_reason.is_some() {
                            state.finish_reason = finish_reason;
                        }
                        content.map(|c| Ok(ChatDelta::Content(c)))
                    }
                    Parsed::Done => {
                        state.finished = true;
                        Some(Ok(ChatDelta::Done {
                            finish_reason: state.finish_reason.take(),
                        }))
                    }
                    Parsed::Skip => None,
                    Parsed::Failed(message) => {
                        state.finished = true;
                        Some(Err(ShowcaseError::UpstreamStream(message)))
                    }
                },
                Err(e) => {
                    state.finished = true;
                    Some(Err(ShowcaseError::UpstreamStream(e.to_string())))
                }
            };
            future::ready(Some(item))
        })
        .filter_map(future::ready)
}
