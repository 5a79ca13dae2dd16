//! Remote calls from the orchestrator into the relay's HTTP API.

use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::normalize::DetectionResult;
use crate::providers::ImagePayload;

/// Failure of a remote call made by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Operations the orchestrator needs from the server.
///
/// Every call aborts with [`ClientError::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>;

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>;

    async fn detect_language(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, ClientError>;

    /// One synthesised clip (MP3) for `text`.
    async fn speech(
        &self,
        text: &str,
        lang: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ClientError>;

    async fn caption(
        &self,
        image: &ImagePayload,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>;
}

/// [`AssistantApi`] over HTTP.
#[derive(Clone)]
pub struct HttpAssistant {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: String,
}

#[derive(Deserialize)]
struct TranslationBody {
    #[serde(default)]
    translation: String,
}

#[derive(Deserialize)]
struct CaptionBody {
    #[serde(default)]
    caption: String,
}

impl HttpAssistant {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<T, ClientError> {
        let request = self.client.post(self.url(path)).json(&body).send();
        let response = checked(cancellable(cancel, request).await??).await?;
        Ok(cancellable(cancel, response.json::<T>()).await??)
    }
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ClientError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Maps a non-2xx response to [`ClientError::Status`] using its `error` field.
async fn checked(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| Some(body.get("error")?.as_str()?.to_string()))
        .unwrap_or(text);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AssistantApi for HttpAssistant {
    async fn chat(
        &self,
        prompt: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let mut body = json!({ "prompt": prompt });
        if let Some(context) = context {
            body["context"] = json!(context);
        }
        let reply: ReplyBody = self.post_json("/api/chat", body, cancel).await?;
        Ok(reply.reply)
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let body = json!({ "text": text, "source": source, "target": target });
        let translated: TranslationBody = self.post_json("/api/translate", body, cancel).await?;
        Ok(translated.translation)
    }

    async fn detect_language(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, ClientError> {
        self.post_json("/api/detect-lang", json!({ "text": text }), cancel)
            .await
    }

    async fn speech(
        &self,
        text: &str,
        lang: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ClientError> {
        let body = json!({ "text": text, "lang": lang });
        let request = self.client.post(self.url("/api/tts")).json(&body).send();
        let response = checked(cancellable(cancel, request).await??).await?;
        Ok(cancellable(cancel, response.bytes()).await??)
    }

    async fn caption(
        &self,
        image: &ImagePayload,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let part = Part::bytes(image.bytes.to_vec())
            .file_name("frame")
            .mime_str(image.content_type_or_default())?;
        let form = Form::new().part("image", part);
        let request = self
            .client
            .post(self.url("/api/image-to-text-upload"))
            .multipart(form)
            .send();
        let response = checked(cancellable(cancel, request).await??).await?;
        let body: CaptionBody = cancellable(cancel, response.json()).await??;
        Ok(body.caption)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::{AssistantApi, ClientError, HttpAssistant};
    use crate::providers::stub::serve;

    #[tokio::test]
    async fn chat_sends_prompt_and_context() {
        let base = serve(Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let reply = format!("{}|{}", body["prompt"], body["context"]);
                Json(json!({ "reply": reply }))
            }),
        ))
        .await;
        let api = HttpAssistant::new(reqwest::Client::new(), format!("{base}/"));

        let reply = api
            .chat("hi", Some("be brief"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "\"hi\"|\"be brief\"");
    }

    #[tokio::test]
    async fn error_status_carries_server_message() {
        let base = serve(Router::new().route(
            "/api/translate",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Translation failed" })),
                )
            }),
        ))
        .await;
        let api = HttpAssistant::new(reqwest::Client::new(), base);

        let err = api
            .translate("Hello", "auto", "es", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ClientError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Translation failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_call_returns_promptly() {
        let base = serve(Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({ "reply": "late" }))
            }),
        ))
        .await;
        let api = HttpAssistant::new(reqwest::Client::new(), base);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), api.chat("hi", None, &cancel))
            .await
            .expect("cancellation should resolve the call")
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[tokio::test]
    async fn detect_language_decodes_nullable_fields() {
        let base = serve(Router::new().route(
            "/api/detect-lang",
            post(|| async {
                let body = json!({ "language": null, "confidence": null });
                Json(body)
            }),
        ))
        .await;
        let api = HttpAssistant::new(reqwest::Client::new(), base);

        let detected = api
            .detect_language("???", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(detected.language, None);
        assert_eq!(detected.confidence, None);
    }
}
