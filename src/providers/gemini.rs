//! Gemini `generateContent` chat client.

use reqwest::Client;
use serde::Serialize;

use crate::normalize::chat_reply;
use crate::providers::{fetch_bytes, ProviderError};

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

/// Single-provider chat completion against Gemini.
pub struct GeminiChat {
    client: Client,
    url: String,
    api_key: String,
}

impl GeminiChat {
    pub fn new(client: Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// Sends one user turn, with optional conversation context as the system instruction.
    pub async fn reply(
        &self,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<String, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: context.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
        };

        let bytes = fetch_bytes(
            self.client
                .post(&self.url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )
        .await?;
        Ok(chat_reply(&bytes)?)
    }
}
