//! LibreTranslate `/translate` and `/detect` clients.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::normalize::{
    detection_result, translation_text, DetectionResult, TranslationKey, TranslationResult,
};
use crate::providers::{fetch_bytes, ProviderError, TranslationRequest};
use crate::relay::Provider;

#[derive(Debug, Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Serialize)]
struct DetectBody<'a> {
    q: &'a str,
}

/// Translation against one LibreTranslate host.
pub struct LibreTranslate {
    client: Client,
    base: String,
    name: String,
}

impl LibreTranslate {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            client,
            name: format!("libretranslate:{base}"),
            base,
        }
    }
}

#[async_trait]
impl Provider<TranslationRequest, TranslationResult> for LibreTranslate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, req: &TranslationRequest) -> Result<TranslationResult, ProviderError> {
        let body = TranslateBody {
            q: &req.text,
            source: &req.source,
            target: &req.target,
            format: "text",
        };
        let bytes = fetch_bytes(
            self.client
                .post(format!("{}/translate", self.base))
                .json(&body),
        )
        .await?;
        Ok(TranslationResult {
            translated_text: translation_text(
                &bytes,
                &[TranslationKey::TranslatedText, TranslationKey::Translation],
            )?,
        })
    }
}

/// Request encoding for `/detect`; hosts differ in which one they accept.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DetectEncoding {
    Form,
    Json,
}

impl DetectEncoding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Json => "json",
        }
    }
}

/// Language detection against one LibreTranslate host with one body encoding.
pub struct LibreDetect {
    client: Client,
    base: String,
    encoding: DetectEncoding,
    name: String,
}

impl LibreDetect {
    pub fn new(client: Client, base: impl Into<String>, encoding: DetectEncoding) -> Self {
        let base = base.into();
        Self {
            client,
            name: format!("libretranslate-detect:{}:{base}", encoding.as_str()),
            base,
            encoding,
        }
    }
}

#[async_trait]
impl Provider<str, DetectionResult> for LibreDetect {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, text: &str) -> Result<DetectionResult, ProviderError> {
        let body = DetectBody { q: text };
        let request = self.client.post(format!("{}/detect", self.base));
        let request = match self.encoding {
            DetectEncoding::Form => request.form(&body),
            DetectEncoding::Json => request.json(&body),
        };
        let bytes = fetch_bytes(request).await?;
        Ok(detection_result(&bytes)?)
    }
}
