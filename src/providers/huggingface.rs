//! Hugging Face inference API: image captioning and image classification.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;

use crate::normalize::{
    caption_text, classification_candidates, CaptionResult, ClassificationCandidate,
};
use crate::providers::{encode_model_path, fetch_bytes, ImagePayload, ProviderError};
use crate::relay::Provider;

/// One hosted model reached through the inference API.
#[derive(Clone)]
pub struct HfModel {
    client: Client,
    base: String,
    token: String,
    model: String,
}

impl HfModel {
    pub fn new(
        client: Client,
        base: impl Into<String>,
        token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base: base.into(),
            token: token.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Posts the raw image and returns the 2xx response body.
    async fn infer(&self, image: &ImagePayload) -> Result<Bytes, ProviderError> {
        let url = format!("{}/{}", self.base, encode_model_path(&self.model));
        fetch_bytes(
            self.client
                .post(url)
                .query(&[("wait_for_model", "true"), ("use_cache", "true")])
                .header(AUTHORIZATION, format!("Bearer {}", self.token))
                .header(CONTENT_TYPE, image.content_type_or_default())
                .header(ACCEPT, "application/json")
                .header("x-wait-for-model", "true")
                .body(image.bytes.clone()),
        )
        .await
    }

    /// Captions `image`; the text is trimmed and may be empty.
    pub async fn caption(&self, image: &ImagePayload) -> Result<CaptionResult, ProviderError> {
        let body = self.infer(image).await?;
        Ok(CaptionResult {
            caption_text: caption_text(&body).trim().to_string(),
            source_model: self.model.clone(),
        })
    }
}

#[async_trait]
impl Provider<ImagePayload, CaptionResult> for HfModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn call(&self, image: &ImagePayload) -> Result<CaptionResult, ProviderError> {
        self.caption(image).await
    }
}

/// Image-classification view of a hosted model.
pub struct HfClassifier(pub HfModel);

#[async_trait]
impl Provider<ImagePayload, Vec<ClassificationCandidate>> for HfClassifier {
    fn name(&self) -> &str {
        self.0.model()
    }

    async fn call(
        &self,
        image: &ImagePayload,
    ) -> Result<Vec<ClassificationCandidate>, ProviderError> {
        let body = self.0.infer(image).await?;
        Ok(classification_candidates(&body)?)
    }
}
