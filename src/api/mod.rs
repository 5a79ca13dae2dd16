//! HTTP API surface of the relay.
//!
//! This module owns routing, shared state, request validation helpers, and
//! the provider chains each route relays to. Handlers live in [`text`] and
//! [`image`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::multipart::Multipart;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::normalize::{
    CaptionResult, ClassificationCandidate, DetectionResult, TranslationResult,
};
use crate::ocr::OcrEngine;
use crate::providers::huggingface::{HfClassifier, HfModel};
use crate::providers::libretranslate::{DetectEncoding, LibreDetect, LibreTranslate};
use crate::providers::lingva::{Lingva, LingvaDetect};
use crate::providers::{ImagePayload, ProviderError, TranslationRequest};
use crate::relay::FallbackRelay;

pub mod image;
pub mod text;

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// Pooled outbound HTTP client shared by every provider.
    pub http: reqwest::Client,
    /// Local OCR engine used by `/api/caption`.
    pub ocr: Arc<dyn OcrEngine>,
}

impl AppState {
    /// Constructs shared handler state.
    pub fn new(cfg: AppConfig, http: reqwest::Client, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { cfg, http, ocr }
    }

    /// LibreTranslate on the primary host, then Lingva.
    pub fn translation_relay(&self) -> FallbackRelay<TranslationRequest, TranslationResult> {
        FallbackRelay::new("translate")
            .with(LibreTranslate::new(
                self.http.clone(),
                self.cfg.primary_libretranslate_url(),
            ))
            .with(Lingva::new(self.http.clone(), self.cfg.lingva_url.clone()))
    }

    /// Every LibreTranslate host (form body, then JSON body), then Lingva.
    pub fn detection_relay(&self) -> FallbackRelay<str, DetectionResult> {
        let mut relay = FallbackRelay::new("detect-lang");
        for base in &self.cfg.libretranslate_urls {
            for encoding in [DetectEncoding::Form, DetectEncoding::Json] {
                relay = relay.with(LibreDetect::new(self.http.clone(), base.clone(), encoding));
            }
        }
        let lingva = Lingva::new(self.http.clone(), self.cfg.lingva_url.clone());
        relay.with(LingvaDetect(lingva))
    }

    /// Preferred captioning models in order.
    pub fn caption_relay(&self, token: &str) -> FallbackRelay<ImagePayload, CaptionResult> {
        self.cfg
            .caption_models()
            .into_iter()
            .fold(FallbackRelay::new("caption"), |relay, model| {
                relay.with(self.hf_model(token, model))
            })
    }

    /// Configured sign classification models in order.
    pub fn sign_relay(
        &self,
        token: &str,
    ) -> FallbackRelay<ImagePayload, Vec<ClassificationCandidate>> {
        self.cfg
            .sign_models
            .iter()
            .fold(FallbackRelay::new("sign"), |relay, model| {
                relay.with(HfClassifier(self.hf_model(token, model.clone())))
            })
    }

    pub fn hf_model(&self, token: &str, model: impl Into<String>) -> HfModel {
        HfModel::new(
            self.http.clone(),
            self.cfg.hf_api_base.clone(),
            token.to_string(),
            model,
        )
    }

    /// Hugging Face token or a configuration error naming `HF_TOKEN`.
    pub fn require_hf_token(&self) -> Result<&str, AppError> {
        self.cfg.hf_token.as_deref().ok_or_else(|| {
            AppError::missing_configuration(
                "Missing Hugging Face token (HF_TOKEN)",
                "HF_TOKEN",
            )
        })
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.cfg.max_upload_bytes;
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/chat", post(text::chat))
        .route("/api/detect-lang", post(text::detect_lang))
        .route("/api/translate", post(text::translate))
        .route("/api/tts", get(text::tts).post(text::tts))
        .route("/api/caption", post(image::caption))
        .route(
            "/api/image-to-text-upload",
            post(image::image_to_text_upload),
        )
        .route("/api/image-to-text", post(image::image_to_text))
        .route("/api/sign", post(image::sign))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness endpoint (`GET /api/ping`).
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "message": state.cfg.ping_message }))
}

/// Maps a failed single-provider call to a `502`, keeping upstream status and body.
fn upstream_failure(message: &str, err: ProviderError) -> AppError {
    warn!(error = %err, "{message}");
    match err.status_detail() {
        Some((status, detail)) => AppError::upstream_with_detail(message, status, detail),
        None => AppError::Upstream {
            message: message.to_string(),
            status: None,
            detail: Some(Value::String(err.to_string())),
        },
    }
}

/// Unwraps a JSON body, turning extractor rejections into validation errors.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    match payload {
        Ok(Json(value)) if value.is_object() => Ok(value),
        Ok(_) => Err(AppError::invalid_request(
            "request body must be a JSON object",
            None,
        )),
        Err(rejection) => Err(AppError::invalid_request(
            format!("invalid JSON body: {}", rejection.body_text()),
            None,
        )),
    }
}

/// Returns `body[field]` when it is a string with non-whitespace content.
fn required_text<'a>(body: &'a Value, field: &str, message: &str) -> Result<&'a str, AppError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AppError::invalid_request(message, Some(field)))
}

/// Returns the trimmed `body[field]` when it is a non-blank string.
fn optional_text<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Multipart upload with an `image` file part and plain text fields.
struct ImageForm {
    image: Option<ImagePayload>,
    fields: HashMap<String, String>,
}

impl ImageForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Takes the uploaded image, or fails validation with `message` when absent or empty.
    fn take_image(&mut self, message: &str) -> Result<ImagePayload, AppError> {
        match self.image.take() {
            Some(image) if !image.bytes.is_empty() => Ok(image),
            _ => Err(AppError::invalid_request(message, Some("image"))),
        }
    }
}

/// Parses multipart form fields for image endpoints.
///
/// A body that is not multipart at all is reported the same way as a
/// malformed one.
async fn parse_image_form(
    payload: Result<Multipart, MultipartRejection>,
) -> Result<ImageForm, AppError> {
    let mut multipart = payload.map_err(|rejection| {
        AppError::bad_multipart(format!("invalid multipart body: {rejection}"))
    })?;
    let mut image = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        if name == "image" {
            let content_type = field.content_type().map(ToOwned::to_owned);
            let bytes = field.bytes().await.map_err(|err| {
                AppError::bad_multipart(format!("failed to read image bytes: {err}"))
            })?;
            image = Some(ImagePayload {
                bytes,
                content_type,
            });
        } else {
            let value = field.text().await.map_err(|err| {
                AppError::bad_multipart(format!("invalid {name} field: {err}"))
            })?;
            fields.insert(name, value);
        }
    }

    Ok(ImageForm { image, fields })
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use super::test_support::{app, parse_json_response};
    use super::{optional_text, required_text};
    use crate::config::test_config;

    #[tokio::test]
    async fn ping_returns_configured_message() {
        let mut cfg = test_config();
        cfg.ping_message = "pong from relay".to_string();

        let req = Request::builder()
            .uri("/api/ping")
            .body(Body::empty())
            .expect("request");
        let res = app(cfg).oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            parse_json_response(res).await,
            json!({"message": "pong from relay"})
        );
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .expect("request");
        let res = app(test_config()).oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn required_text_rejects_blank_and_wrong_types() {
        let body = json!({"a": "  ", "b": 3, "c": " ok "});
        assert!(required_text(&body, "a", "Invalid a").is_err());
        assert!(required_text(&body, "b", "Invalid b").is_err());
        assert!(required_text(&body, "missing", "Invalid").is_err());
        assert_eq!(required_text(&body, "c", "Invalid c").unwrap(), " ok ");
        assert_eq!(optional_text(&body, "c"), Some("ok"));
        assert_eq!(optional_text(&body, "b"), None);
    }
}
