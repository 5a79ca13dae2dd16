//! Image routes: captioning, OCR, and sign classification.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::extract::multipart::Multipart;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    json_body, optional_text, parse_image_form, required_text, upstream_failure, AppState,
};
use crate::error::AppError;
use crate::normalize::{best_classification, combine_caption, EMPTY_CAPTION};
use crate::providers::sign_server::SignServer;
use crate::providers::ImagePayload;

/// Captions an uploaded image and appends any confidently recognised text (`POST /api/caption`).
pub async fn caption(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let mut form = parse_image_form(multipart).await?;
    let image = form.take_image("No image uploaded")?;
    let token = state.require_hf_token()?;
    let ocr_lang = form.field("ocr_lang").unwrap_or(&state.cfg.ocr_lang);

    let recognized = match state.ocr.recognize(&image.bytes, ocr_lang).await {
        Ok(output) => {
            debug!(confidence = output.confidence, "ocr finished");
            output.accepted_text().unwrap_or_default().to_string()
        }
        Err(err) => {
            debug!(error = %err, "ocr unavailable; captioning only");
            String::new()
        }
    };

    let model_caption = state
        .caption_relay(token)
        .run(&image)
        .await
        .usable()
        .map(|result| result.caption_text)
        .unwrap_or_default();

    let caption = combine_caption(&model_caption, &recognized)
        .unwrap_or_else(|| EMPTY_CAPTION.to_string());
    Ok(Json(json!({ "caption": caption })))
}

/// Captions an uploaded image with a single model (`POST /api/image-to-text-upload`).
pub async fn image_to_text_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let mut form = parse_image_form(multipart).await?;
    let image = form.take_image("No image uploaded")?;
    let model = form
        .field("model")
        .unwrap_or(state.cfg.upload_caption_model())
        .to_string();
    single_model_caption(&state, image, model).await
}

/// Captions a base64 or data-URL image with a single model (`POST /api/image-to-text`).
pub async fn image_to_text(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(payload)?;
    let encoded = required_text(&body, "imageBase64", "Missing imageBase64")?;
    let model = optional_text(&body, "model")
        .unwrap_or(state.cfg.base64_caption_model())
        .to_string();

    let image = decode_image_data(encoded)
        .ok_or_else(|| AppError::invalid_request("Invalid image data", Some("imageBase64")))?;
    single_model_caption(&state, image, model).await
}

async fn single_model_caption(
    state: &AppState,
    image: ImagePayload,
    model: String,
) -> Result<Json<Value>, AppError> {
    let token = state.require_hf_token()?;
    let result = state
        .hf_model(token, model.clone())
        .caption(&image)
        .await
        .map_err(|err| upstream_failure("Hugging Face request failed", err))?;

    if result.caption_text.is_empty() {
        return Err(AppError::upstream("Empty caption result"));
    }
    let body = json!({ "caption": result.caption_text, "model": model });
    Ok(Json(body))
}

/// Classifies a hand sign (`POST /api/sign`).
///
/// An external sign server, when configured, answers verbatim; otherwise
/// the Hugging Face classifiers are tried in order.
pub async fn sign(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    let mut form = parse_image_form(multipart).await?;
    let image = form.take_image("No image provided")?;

    if let Some(url) = &state.cfg.sign_server_url {
        let reply = SignServer::new(state.http.clone(), url.clone())
            .classify(&image)
            .await
            .map_err(|err| upstream_failure("Sign server error", err))?;
        if !reply.is_success() {
            return Err(AppError::upstream_with_detail(
                "Sign server error",
                reply.status,
                reply.body,
            ));
        }
        return Ok(Json(reply.body));
    }

    let unavailable = || AppError::upstream("Recognition unavailable");
    let Some(token) = state.cfg.hf_token.as_deref() else {
        return Err(unavailable());
    };

    let label = state
        .sign_relay(token)
        .run(&image)
        .await
        .usable()
        .and_then(|candidates| best_classification(&candidates))
        .map(|best| best.label)
        .filter(|label| !label.is_empty())
        .ok_or_else(unavailable)?;

    Ok(Json(json!({ "sign_text": label })))
}

fn data_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^data:([^;,]*)[^,]*;base64,(.*)$").expect("static data url regex")
    })
}

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const LENIENT_BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decodes `data:<mime>;base64,<payload>` or bare base64 into image bytes.
///
/// Both the standard and the URL-safe alphabet are accepted, with or
/// without padding.
pub fn decode_image_data(raw: &str) -> Option<ImagePayload> {
    let (mime, encoded) = match data_url_pattern().captures(raw.trim()) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str()).filter(|m| !m.is_empty()),
            caps.get(2).map_or("", |m| m.as_str()),
        ),
        None => (None, raw),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(&compact)
        .or_else(|_| LENIENT_BASE64_URL.decode(&compact))
        .ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(ImagePayload {
        bytes: Bytes::from(bytes),
        content_type: mime.map(ToOwned::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{any, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tower::ServiceExt;

    use super::decode_image_data;
    use crate::api::test_support::{
        app, app_with_ocr, json_request, multipart_request, parse_json_response,
    };
    use crate::config::test_config;
    use crate::normalize::EMPTY_CAPTION;
    use crate::ocr::OcrOutput;
    use crate::providers::stub::{serve, Hits};

    const PNG: (&str, &str) = ("photo.png", "image/png");

    fn ocr(text: &str, confidence: f64) -> Option<OcrOutput> {
        Some(OcrOutput {
            text: text.to_string(),
            confidence,
        })
    }

    async fn caption_stub(caption: &'static str) -> String {
        let router = Router::new().route(
            "/models/*model",
            post(move || async move { Json(json!([{ "generated_text": caption }])) }),
        );
        serve(router).await
    }

    #[tokio::test]
    async fn caption_suppresses_low_confidence_ocr() {
        let base = caption_stub("a dog").await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app_with_ocr(cfg, ocr("blurry sign", 55.0))
            .oneshot(multipart_request(
                "/api/caption",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(parse_json_response(res).await, json!({"caption": "a dog"}));
    }

    #[tokio::test]
    async fn caption_appends_confident_ocr_text() {
        let base = caption_stub("a red sign").await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app_with_ocr(cfg, ocr(" STOP \n", 91.5))
            .oneshot(multipart_request(
                "/api/caption",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(
            parse_json_response(res).await,
            json!({"caption": "a red sign\n\nSTOP"})
        );
    }

    #[tokio::test]
    async fn caption_moves_to_next_model_on_failure() {
        let hits = Hits::default();
        let counter = hits.clone();
        let router = Router::new()
            .route(
                "/models/Salesforce/blip-image-captioning-large",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.bump();
                        (StatusCode::SERVICE_UNAVAILABLE, "loading")
                    }
                }),
            )
            .route(
                "/models/nlpconnect/vit-gpt2-image-captioning",
                post(|| async { Json(json!({"caption": "two cats on a sofa"})) }),
            );
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/caption",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(
            parse_json_response(res).await,
            json!({"caption": "two cats on a sofa"})
        );
        assert_eq!(hits.count(), 1);
    }

    #[tokio::test]
    async fn caption_with_nothing_found_uses_placeholder() {
        let router = Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR });
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/caption",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            parse_json_response(res).await,
            json!({ "caption": EMPTY_CAPTION })
        );
    }

    #[tokio::test]
    async fn caption_requires_image_then_token() {
        let res = app(test_config())
            .oneshot(multipart_request(
                "/api/caption",
                &[("ocr_lang", None, b"eng")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(parse_json_response(res).await["error"], "No image uploaded");

        let mut cfg = test_config();
        cfg.hf_token = None;
        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/caption",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parse_json_response(res).await["param"], "HF_TOKEN");
    }

    #[tokio::test]
    async fn upload_uses_requested_model() {
        let router = Router::new().route(
            "/models/custom/model",
            post(|| async { Json(json!([{"summary_text": "a mountain lake"}])) }),
        );
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/image-to-text-upload",
                &[
                    ("model", None, b"custom/model"),
                    ("image", Some(PNG), b"\x89PNG"),
                ],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            parse_json_response(res).await,
            json!({"caption": "a mountain lake", "model": "custom/model"})
        );
    }

    #[tokio::test]
    async fn upload_reports_upstream_status() {
        let router = Router::new().fallback(|| async {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "Model is loading"})))
        });
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/image-to-text-upload",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Hugging Face request failed");
        assert_eq!(payload["status"], 503);
        assert_eq!(payload["detail"]["error"], "Model is loading");
    }

    #[tokio::test]
    async fn base64_caption_accepts_data_url_and_default_model() {
        let router = Router::new().route(
            "/models/flax-community/vit-gpt2-coco-en",
            post(|headers: HeaderMap| async move {
                assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
                Json(json!({"generated_text": "a bowl of fruit"}))
            }),
        );
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(json_request(
                "/api/image-to-text",
                json!({"imageBase64": "data:image/jpeg;base64,/9j/4AAQ"}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            parse_json_response(res).await,
            json!({"caption": "a bowl of fruit", "model": "flax-community/vit-gpt2-coco-en"})
        );
    }

    #[tokio::test]
    async fn base64_caption_validates_payload() {
        let app = app(test_config());

        let res = app
            .clone()
            .oneshot(json_request("/api/image-to-text", json!({"model": "x"})))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Missing imageBase64");

        let res = app
            .oneshot(json_request(
                "/api/image-to-text",
                json!({"imageBase64": "data:image/png;base64,%%%"}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Invalid image data");
    }

    #[tokio::test]
    async fn empty_model_caption_is_bad_gateway() {
        let router = Router::new().fallback(|| async { Json(json!([{"generated_text": "   "}])) });
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(json_request(
                "/api/image-to-text",
                json!({"imageBase64": "aGVsbG8="}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Empty caption result");
    }

    #[tokio::test]
    async fn sign_uses_first_model_with_candidates() {
        let second = Hits::default();
        let counter = second.clone();
        let router = Router::new()
            .route(
                "/models/org/first",
                post(|| async {
                    Json(json!([
                        {"label": "letter_L", "score": 0.4},
                        {"label": "letter_Y", "score": 0.6}
                    ]))
                }),
            )
            .route(
                "/models/org/second",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.bump();
                        Json(json!([{"label": "Z", "score": 0.99}]))
                    }
                }),
            );
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");
        cfg.sign_models = vec!["org/first".to_string(), "org/second".to_string()];

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/sign",
                &[("image", Some(("hand.jpg", "image/jpeg")), b"jpeg")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(parse_json_response(res).await, json!({"sign_text": "Y"}));
        assert_eq!(second.count(), 0);
    }

    #[tokio::test]
    async fn sign_without_candidates_is_unavailable() {
        let router = Router::new().fallback(|| async { Json(json!([])) });
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.hf_api_base = format!("{base}/models");

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/sign",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Recognition unavailable");
    }

    #[tokio::test]
    async fn sign_server_answers_pass_through() {
        let router = Router::new().route(
            "/predict-sign",
            any(|headers: HeaderMap| async move {
                assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
                Json(json!({"sign_text": "thumbs up"}))
            }),
        );
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.sign_server_url = Some(format!("{base}/predict-sign"));

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/sign",
                &[("image", Some(("hand.jpg", "image/jpeg")), b"jpeg")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            parse_json_response(res).await,
            json!({"sign_text": "thumbs up"})
        );
    }

    #[tokio::test]
    async fn sign_server_failure_is_bad_gateway() {
        let router = Router::new().fallback(|| async {
            (StatusCode::BAD_REQUEST, Json(json!({"error": "No image uploaded"})))
        });
        let base = serve(router).await;
        let mut cfg = test_config();
        cfg.sign_server_url = Some(base);

        let res = app(cfg)
            .oneshot(multipart_request(
                "/api/sign",
                &[("image", Some(PNG), b"\x89PNG")],
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"], "Sign server error");
        assert_eq!(payload["status"], 400);
        assert_eq!(payload["detail"]["error"], "No image uploaded");
    }

    #[tokio::test]
    async fn sign_requires_image() {
        let res = app(test_config())
            .oneshot(multipart_request("/api/sign", &[("note", None, b"x")]))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(parse_json_response(res).await["error"], "No image provided");
    }

    #[test]
    fn decode_image_data_handles_data_urls_and_bare_base64() {
        let image = decode_image_data("data:image/png;base64,aGVs\nbG8").expect("image");
        assert_eq!(image.bytes.as_ref(), b"hello");
        assert_eq!(image.content_type.as_deref(), Some("image/png"));

        let image = decode_image_data("aGVsbG8=").expect("image");
        assert_eq!(image.bytes.as_ref(), b"hello");
        assert_eq!(image.content_type, None);

        assert!(decode_image_data("").is_none());
        assert!(decode_image_data("not base64!").is_none());
    }

    #[test]
    fn decode_image_data_accepts_url_safe_alphabet() {
        let image = decode_image_data("data:image/jpeg;base64,-_8").expect("image");
        assert_eq!(image.bytes.as_ref(), &[0xFB, 0xFF]);
        assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));

        let image = decode_image_data("+/8=").expect("image");
        assert_eq!(image.bytes.as_ref(), &[0xFB, 0xFF]);
    }

    #[tokio::test]
    async fn image_routes_reject_non_multipart_bodies_as_json() {
        let app = app(test_config());

        for uri in ["/api/sign", "/api/caption", "/api/image-to-text-upload"] {
            let res = app
                .clone()
                .oneshot(json_request(uri, json!({"image": "aGVsbG8="})))
                .await
                .expect("response");
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert_eq!(res.headers()["content-type"], "application/json");
            let payload = parse_json_response(res).await;
            assert_eq!(payload["code"], "invalid_multipart");
            assert_eq!(payload["param"], "image");
        }
    }
}
