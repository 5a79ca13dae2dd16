//! Configuration loading from environment variables.
//!
//! Provider credentials are optional at startup; handlers that need one
//! report a configuration error naming the missing variable.

use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";
pub const DEFAULT_LIBRETRANSLATE_URL: &str = "https://libretranslate.de";
pub const DEFAULT_LIBRETRANSLATE_FALLBACKS: &[&str] = &[
    "https://libretranslate.com",
    "https://translate.argosopentech.com",
];
pub const DEFAULT_LINGVA_URL: &str = "https://lingva.ml";
pub const DEFAULT_TTS_URL: &str = "https://translate.google.com/translate_tts";
pub const DEFAULT_HF_API_BASE: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_CAPTION_MODELS: &[&str] = &[
    "Salesforce/blip-image-captioning-large",
    "nlpconnect/vit-gpt2-image-captioning",
    "microsoft/git-large-coco",
];
pub const DEFAULT_UPLOAD_CAPTION_MODEL: &str = "Salesforce/blip-image-captioning-large";
pub const DEFAULT_BASE64_CAPTION_MODEL: &str = "flax-community/vit-gpt2-coco-en";
pub const DEFAULT_SIGN_MODEL: &str = "prithivMLmods/Alphabet-Sign-Language-Detection";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_UPLOAD_BYTES_LIMIT: usize = 100 * 1024 * 1024;

/// Runtime configuration for the HTTP server and its upstream providers.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Gemini API key used by `/api/chat`.
    pub google_api_key: Option<String>,
    /// Gemini `generateContent` endpoint.
    pub gemini_api_url: String,
    /// LibreTranslate hosts in attempt order; the first one also serves translation.
    pub libretranslate_urls: Vec<String>,
    /// Lingva instance used as the last translation/detection resort.
    pub lingva_url: String,
    /// Speech synthesis endpoint.
    pub tts_url: String,
    /// Hugging Face inference token.
    pub hf_token: Option<String>,
    /// Hugging Face inference API base, models are appended as path segments.
    pub hf_api_base: String,
    /// Explicit captioning model from `HF_IMAGE_TO_TEXT_MODEL`.
    pub caption_model_override: Option<String>,
    /// Sign classification models in attempt order.
    pub sign_models: Vec<String>,
    /// External sign classification server; takes precedence over Hugging Face.
    pub sign_server_url: Option<String>,
    /// Message returned by `/api/ping`.
    pub ping_message: String,
    /// Default tesseract language for `/api/caption`.
    pub ocr_lang: String,
    /// Tesseract executable.
    pub tesseract_bin: String,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// Optional per-request timeout for upstream calls.
    pub upstream_timeout: Option<Duration>,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `8080`)
    /// - `GOOGLE_API_KEY` (optional, required by `/api/chat`)
    /// - `GEMINI_API_URL` (default Gemini 1.5 flash `generateContent`)
    /// - `LIBRETRANSLATE_URL` (default `https://libretranslate.de`)
    /// - `LIBRETRANSLATE_FALLBACK_URLS` (comma list, defaults to two public hosts)
    /// - `LINGVA_URL` (default `https://lingva.ml`)
    /// - `TTS_URL` (default Google Translate TTS)
    /// - `HF_TOKEN`, `HUGGING_FACE_TOKEN` or `HF_API_TOKEN` (first one set wins)
    /// - `HF_API_BASE` (default `https://api-inference.huggingface.co/models`)
    /// - `HF_IMAGE_TO_TEXT_MODEL` (optional)
    /// - `HF_SIGN_MODEL` (comma list, default alphabet sign model)
    /// - `SIGN_SERVER_URL` (optional)
    /// - `PING_MESSAGE` (default `ping`)
    /// - `OCR_LANG` (default `eng`)
    /// - `TESSERACT_BIN` (default `tesseract`)
    /// - `MAX_UPLOAD_BYTES` (default 10 MiB, max 100 MiB)
    /// - `UPSTREAM_TIMEOUT_SECS` (optional, unset means no client-side timeout)
    pub fn from_env() -> Result<Self, AppError> {
        let primary = env_str("LIBRETRANSLATE_URL", DEFAULT_LIBRETRANSLATE_URL);
        let fallbacks = match env_opt("LIBRETRANSLATE_FALLBACK_URLS") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_LIBRETRANSLATE_FALLBACKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        let mut libretranslate_urls = vec![primary];
        libretranslate_urls.extend(fallbacks);

        let sign_models = env_opt("HF_SIGN_MODEL")
            .map(|raw| split_list(&raw))
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SIGN_MODEL.to_string()]);

        let hf_token = env_opt("HF_TOKEN")
            .or_else(|| env_opt("HUGGING_FACE_TOKEN"))
            .or_else(|| env_opt("HF_API_TOKEN"));

        let upstream_timeout = env_opt("UPSTREAM_TIMEOUT_SECS")
            .map(|raw| parse_usize_bounded("UPSTREAM_TIMEOUT_SECS", &raw, 1, 600))
            .transpose()?
            .map(|secs| Duration::from_secs(secs as u64));

        Ok(Self {
            host: env_str("HOST", "127.0.0.1"),
            port: env_u16("PORT", 8080)?,
            google_api_key: env_opt("GOOGLE_API_KEY"),
            gemini_api_url: env_str("GEMINI_API_URL", DEFAULT_GEMINI_API_URL),
            libretranslate_urls: dedup_urls(libretranslate_urls),
            lingva_url: trim_base(&env_str("LINGVA_URL", DEFAULT_LINGVA_URL)),
            tts_url: env_str("TTS_URL", DEFAULT_TTS_URL),
            hf_token,
            hf_api_base: trim_base(&env_str("HF_API_BASE", DEFAULT_HF_API_BASE)),
            caption_model_override: env_opt("HF_IMAGE_TO_TEXT_MODEL"),
            sign_models,
            sign_server_url: env_opt("SIGN_SERVER_URL"),
            ping_message: env_str("PING_MESSAGE", "ping"),
            ocr_lang: env_str("OCR_LANG", "eng"),
            tesseract_bin: env_str("TESSERACT_BIN", "tesseract"),
            max_upload_bytes: env_usize_bounded(
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
                1024,
                MAX_UPLOAD_BYTES_LIMIT,
            )?,
            upstream_timeout,
        })
    }

    /// Captioning models tried by `/api/caption`, most preferred first.
    pub fn caption_models(&self) -> Vec<String> {
        let mut models = Vec::with_capacity(DEFAULT_CAPTION_MODELS.len() + 1);
        if let Some(model) = &self.caption_model_override {
            models.push(model.clone());
        }
        for model in DEFAULT_CAPTION_MODELS {
            if !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
        models
    }

    /// Default model for multipart single-model captioning.
    pub fn upload_caption_model(&self) -> &str {
        self.caption_model_override
            .as_deref()
            .unwrap_or(DEFAULT_UPLOAD_CAPTION_MODEL)
    }

    /// Default model for base64 single-model captioning.
    pub fn base64_caption_model(&self) -> &str {
        self.caption_model_override
            .as_deref()
            .unwrap_or(DEFAULT_BASE64_CAPTION_MODEL)
    }

    /// Primary LibreTranslate host.
    pub fn primary_libretranslate_url(&self) -> &str {
        self.libretranslate_urls
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_LIBRETRANSLATE_URL)
    }
}

/// Merges a dotenv file into the process environment; variables that are
/// already set keep their values.
///
/// Without `path` the usual `.env` lookup runs and a missing file is fine.
pub fn load_dotenv(path: Option<&Path>) -> Result<(), AppError> {
    match path {
        Some(path) => dotenvy::from_path(path).map_err(|err| {
            AppError::internal(format!("failed to load {}: {err}", path.display()))
        }),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn trim_base(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        let url = trim_base(&url);
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 8080,
        google_api_key: Some("test-key".to_string()),
        gemini_api_url: "http://127.0.0.1:9/gemini".to_string(),
        libretranslate_urls: vec!["http://127.0.0.1:9".to_string()],
        lingva_url: "http://127.0.0.1:9".to_string(),
        tts_url: "http://127.0.0.1:9/tts".to_string(),
        hf_token: Some("hf-test".to_string()),
        hf_api_base: "http://127.0.0.1:9/models".to_string(),
        caption_model_override: None,
        sign_models: vec![DEFAULT_SIGN_MODEL.to_string()],
        sign_server_url: None,
        ping_message: "ping".to_string(),
        ocr_lang: "eng".to_string(),
        tesseract_bin: "tesseract".to_string(),
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        upstream_timeout: None,
    }
}
