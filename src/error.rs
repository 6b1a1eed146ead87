use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ShowcaseError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Chat endpoint is not configured")]
    NotConfigured,

    #[error("Daily message limit reached ({used}/{limit})")]
    LimitReached { used: u32, limit: u32 },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Upstream stream error: {0}")]
    UpstreamStream(String),

    #[error("Upstream API error ({status}): {}", .error.error.message)]
    UpstreamError {
        status: StatusCode,
        error: UpstreamError,
    },
}

impl IntoResponse for ShowcaseError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            ShowcaseError::UpstreamError { status, error } => {
                let body = ApiErrorBody {
                    code: upstream_code(status).to_string(),
                    message: error.error.message,
                };
                (status, body)
            }
            ShowcaseError::DatabaseError(_)
            | ShowcaseError::RactorError(_)
            | ShowcaseError::Config(_) => {
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let body = ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                };
                (status, body)
            }
            ShowcaseError::NotConfigured => {
                let status = StatusCode::SERVICE_UNAVAILABLE;
                let body = ApiErrorBody {
                    code: "NOT_CONFIGURED".to_string(),
                    message: "The chat endpoint has not been configured yet.".to_string(),
                };
                (status, body)
            }
            ShowcaseError::LimitReached { used, limit } => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                let body = ApiErrorBody {
                    code: "LIMIT_REACHED".to_string(),
                    message: format!("Daily message limit reached ({used}/{limit})."),
                };
                (status, body)
            }
            ShowcaseError::Unauthorized => {
                let status = StatusCode::UNAUTHORIZED;
                let body = ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Invalid or missing admin password.".to_string(),
                };
                (status, body)
            }
            ShowcaseError::NotFound(what) => {
                let status = StatusCode::NOT_FOUND;
                let body = ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{what} not found."),
                };
                (status, body)
            }
            ShowcaseError::BadRequest(reason) => {
                let status = StatusCode::BAD_REQUEST;
                let body = ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: reason,
                };
                (status, body)
            }
            ShowcaseError::Json(_) => {
                let status = StatusCode::BAD_GATEWAY;
                let body = ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream returned a malformed payload.".to_string(),
                };
                (status, body)
            }
            ShowcaseError::Reqwest(_)
            | ShowcaseError::UrlParse(_)
            | ShowcaseError::UpstreamStream(_) => {
                let status = StatusCode::BAD_GATEWAY;
                let body = ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                };
                (status, body)
            }
            ShowcaseError::UpstreamStatus(code) => {
                let msg = match code {
                    StatusCode::TOO_MANY_REQUESTS => "Upstream rate limit exceeded.",
                    StatusCode::UNAUTHORIZED => "Upstream authentication failed.",
                    StatusCode::FORBIDDEN => "Upstream permission denied.",
                    StatusCode::NOT_FOUND => "Upstream resource not found.",
                    _ => "An upstream error occurred.",
                };

                (
                    code,
                    ApiErrorBody {
                        code: upstream_code(code).to_string(),
                        message: msg.to_string(),
                    },
                )
            }
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

fn upstream_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::TOO_MANY_REQUESTS => "RATE_LIMIT",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        _ => "UPSTREAM_ERROR",
    }
}

/// Standardized API error response body
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// OpenAI-compatible error envelope returned by the chat endpoint.
#[derive(Deserialize, Debug)]
pub struct UpstreamError {
    pub error: UpstreamErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct UpstreamErrorBody {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}
