//! Passthrough to an external sign-classification server.

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};

use crate::providers::{ImagePayload, ProviderError};

/// Answer from the sign server, passed back to the caller as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SignServerReply {
    pub status: u16,
    pub body: Value,
}

impl SignServerReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct SignServer {
    client: Client,
    url: String,
}

impl SignServer {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Forwards the raw image; a non-JSON answer is wrapped as `{"raw": text}`.
    pub async fn classify(&self, image: &ImagePayload) -> Result<SignServerReply, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, image.content_type_or_default())
            .body(image.bytes.clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok(SignServerReply { status, body })
    }
}
