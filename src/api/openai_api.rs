use backon::{ExponentialBuilder, Retryable};
use tracing::error;
use url::Url;

pub struct OpenAiApi;

impl OpenAiApi {
    /// `{endpoint}/chat/completions`, tolerating a trailing slash on the endpoint.
    pub fn completions_url(endpoint: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/chat/completions",
            endpoint.trim().trim_end_matches('/')
        ))
    }

    pub async fn try_post_chat<T>(
        client: reqwest::Client,
        url: Url,
        api_key: impl AsRef<str>,
        retry_policy: ExponentialBuilder,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error>
    where
        T: serde::Serialize,
    {
        (|| async {
            let resp = client
                .post(url.clone())
                .bearer_auth(api_key.as_ref())
                .json(body)
                .send()
                .await?;
            if resp.status().is_server_error() {
                let status = resp.status();
                let err = resp.error_for_status().unwrap_err();
                error!("Chat endpoint server error (will retry): {}", status);
                return Err(err);
            }
            Ok(resp)
        })
        .retry(retry_policy)
        .await
    }
}
