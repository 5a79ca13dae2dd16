//! Text routes: chat, language detection, translation, and speech synthesis.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{json_body, optional_text, required_text, upstream_failure, AppState};
use crate::error::AppError;
use crate::normalize::DetectionResult;
use crate::providers::gemini::GeminiChat;
use crate::providers::tts::GoogleTts;
use crate::providers::TranslationRequest;
use crate::relay::RelayOutcome;

/// Relays one prompt to the chat model (`POST /api/chat`).
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let prompt = required_text(&body, "prompt", "Invalid prompt")?;
    let context = match body.get("context") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.as_str()).filter(|t| !t.trim().is_empty()),
        Some(_) => {
            return Err(AppError::invalid_request(
                "Invalid context",
                Some("context"),
            ))
        }
    };

    let api_key = state.cfg.google_api_key.as_deref().ok_or_else(|| {
        AppError::missing_configuration("Server is missing GOOGLE_API_KEY", "GOOGLE_API_KEY")
    })?;

    let chat = GeminiChat::new(
        state.http.clone(),
        state.cfg.gemini_api_url.clone(),
        api_key,
    );
    let reply = chat
        .reply(prompt, context)
        .await
        .map_err(|err| upstream_failure("Upstream error", err))?;

    Ok(Json(json!({ "reply": reply })))
}

/// Detects the language of a text (`POST /api/detect-lang`).
///
/// Never fails once validated: an exhausted provider chain yields nulls.
pub async fn detect_lang(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<DetectionResult>, AppError> {
    let body = json_body(payload)?;
    let text = required_text(&body, "text", "Invalid text")?;

    let detected = state.detection_relay().run(text).await.usable();
    if detected.is_none() {
        debug!("language detection inconclusive");
    }
    Ok(Json(detected.unwrap_or_default()))
}

/// Translates a text (`POST /api/translate`).
pub async fn translate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let text = required_text(&body, "text", "Invalid text")?;
    let target = required_text(&body, "target", "Invalid target language")?;
    let source = optional_text(&body, "source").unwrap_or("auto");

    let request = TranslationRequest {
        text: text.to_string(),
        source: source.to_string(),
        target: target.trim().to_string(),
    };

    match state.translation_relay().run(&request).await {
        RelayOutcome::Usable { value, .. } | RelayOutcome::Degenerate { value, .. } => {
            Ok(Json(json!({ "translation": value.translated_text })))
        }
        RelayOutcome::Exhausted => Err(AppError::upstream("Translation failed")),
    }
}

/// Speech synthesis parameters, from the query string or the request body.
#[derive(Debug, Default, Deserialize)]
pub struct TtsParams {
    text: Option<String>,
    lang: Option<String>,
    tl: Option<String>,
}

/// [`TtsParams`] from a JSON or form-encoded body; any other body counts as empty.
pub struct TtsBody(pub TtsParams);

#[async_trait]
impl<S> FromRequest<S> for TtsBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(params) = Json::<TtsParams>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_body("JSON", rejection))?;
            Ok(Self(params))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(params) = Form::<TtsParams>::from_request(req, state)
                .await
                .map_err(|rejection| invalid_body("form", rejection))?;
            Ok(Self(params))
        } else {
            Ok(Self(TtsParams::default()))
        }
    }
}

fn invalid_body(kind: &str, rejection: impl fmt::Display) -> AppError {
    AppError::invalid_request(format!("invalid {kind} body: {rejection}"), None)
}

/// Streams synthesized MPEG audio (`GET|POST /api/tts`).
///
/// Query parameters win over body fields.
pub async fn tts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TtsParams>, QueryRejection>,
    TtsBody(body): TtsBody,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|rejection| {
        AppError::invalid_request(format!("invalid query string: {rejection}"), None)
    })?;

    let text = query
        .text
        .or(body.text)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(AppError::invalid_request("Missing text", Some("text")));
    }

    let lang = query
        .lang
        .or(query.tl)
        .or(body.lang)
        .or(body.tl)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string());
    let lang = lang.trim();
    if lang.is_empty() {
        return Err(AppError::invalid_request("Missing lang", Some("lang")));
    }

    let upstream = GoogleTts::new(state.http.clone(), state.cfg.tts_url.clone())
        .synthesize(&text, lang)
        .await
        .map_err(|err| upstream_failure("Upstream TTS failed", err))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response())
}
