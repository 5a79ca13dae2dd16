//! HTTP clients for the external services behind each capability.
//!
//! Every client issues exactly one request per call and reports failures as
//! [`ProviderError`]; retry and fallback policy lives in [`crate::relay`].

use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::AppConfig;
use crate::normalize::NormalizeError;

pub mod gemini;
pub mod huggingface;
pub mod libretranslate;
pub mod lingva;
pub mod sign_server;
pub mod tts;

/// Reasons a single provider attempt produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}")]
    Status { status: u16, detail: String },
    #[error(transparent)]
    Malformed(#[from] NormalizeError),
    #[error("{0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Upstream status and body as JSON, when the upstream answered at all.
    pub fn status_detail(&self) -> Option<(u16, Value)> {
        match self {
            Self::Status { status, detail } => Some((*status, detail_value(detail))),
            _ => None,
        }
    }
}

/// Text to translate with its language pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub source: String,
    pub target: String,
}

/// Uploaded image bytes with the content type the client declared.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ImagePayload {
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// Builds the shared outbound HTTP client.
pub fn build_http_client(cfg: &AppConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = cfg.upstream_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Sends a request and returns the body of a 2xx response.
pub(crate) async fn fetch_bytes(request: RequestBuilder) -> Result<Bytes, ProviderError> {
    let response = ensure_success(request.send().await?).await?;
    Ok(response.bytes().await?)
}

/// Converts a non-2xx response into [`ProviderError::Status`] carrying its body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Parses an upstream error body as JSON, falling back to a JSON string.
pub fn detail_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Percent-encodes each `/`-separated segment of a model id.
pub(crate) fn encode_model_path(model: &str) -> String {
    model
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
