//! Lingva (Google Translate front-end) translation and detection.

use async_trait::async_trait;
use reqwest::Client;

use crate::normalize::{
    lingva_detection, translation_text, DetectionResult, TranslationKey, TranslationResult,
};
use crate::providers::{fetch_bytes, ProviderError, TranslationRequest};
use crate::relay::Provider;

/// Lingva client; every call is a `GET /api/v1/{source}/{target}/{text}`.
pub struct Lingva {
    client: Client,
    base: String,
}

impl Lingva {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    fn url(&self, source: &str, target: &str, text: &str) -> String {
        format!(
            "{}/api/v1/{}/{}/{}",
            self.base,
            urlencoding::encode(source),
            urlencoding::encode(target),
            urlencoding::encode(text)
        )
    }
}

#[async_trait]
impl Provider<TranslationRequest, TranslationResult> for Lingva {
    fn name(&self) -> &str {
        "lingva"
    }

    async fn call(&self, req: &TranslationRequest) -> Result<TranslationResult, ProviderError> {
        let request = self.client.get(self.url(&req.source, &req.target, &req.text));
        let bytes = fetch_bytes(request).await?;
        Ok(TranslationResult {
            translated_text: translation_text(
                &bytes,
                &[TranslationKey::Translation, TranslationKey::TranslatedText],
            )?,
        })
    }
}

/// Detection through an `auto -> en` translation, reading the reported source.
pub struct LingvaDetect(pub Lingva);

#[async_trait]
impl Provider<str, DetectionResult> for LingvaDetect {
    fn name(&self) -> &str {
        "lingva-detect"
    }

    async fn call(&self, text: &str) -> Result<DetectionResult, ProviderError> {
        let bytes = fetch_bytes(self.0.client.get(self.0.url("auto", "en", text))).await?;
        Ok(lingva_detection(&bytes)?)
    }
}
