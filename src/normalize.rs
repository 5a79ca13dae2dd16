//! Conversion of heterogeneous provider payloads into canonical results.
//!
//! Every provider body is decoded through an untagged enum whose variants
//! are the shapes seen in the wild, tried in declaration order. Anything
//! that matches none of them lands in a catch-all variant so callers can decide
//! between a degenerate value and "not usable".

use std::sync::OnceLock;

use regex::Regex;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body could not be decoded as JSON of any known shape.
#[derive(Debug, thiserror::Error)]
#[error("malformed provider body: {0}")]
pub struct NormalizeError(String);

/// Caption used when neither a model nor OCR produced any text.
pub const EMPTY_CAPTION: &str = "No description or text found.";

/// Text produced by a translation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    #[serde(rename = "translation")]
    pub translated_text: String,
}

/// Detected language with optional confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub language: Option<String>,
    pub confidence: Option<f64>,
}

/// Caption text and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionResult {
    pub caption_text: String,
    pub source_model: String,
}

/// Winning classification label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f64,
}

/// Field names that may carry translated text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TranslationKey {
    TranslatedText,
    Translation,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslationBody {
    Fields {
        #[serde(rename = "translatedText", default)]
        translated_text: Option<String>,
        #[serde(default)]
        translation: Option<String>,
    },
    Other(IgnoredAny),
}

/// Extracts translated text, probing `keys` in order; the first non-empty one wins.
///
/// A JSON body without any of the keys yields an empty string.
pub fn translation_text(body: &[u8], keys: &[TranslationKey]) -> Result<String, NormalizeError> {
    let parsed: TranslationBody = decode(body)?;
    let TranslationBody::Fields {
        translated_text,
        translation,
    } = parsed
    else {
        return Ok(String::new());
    };

    let text = keys
        .iter()
        .filter_map(|key| match key {
            TranslationKey::TranslatedText => translated_text.as_deref(),
            TranslationKey::Translation => translation.as_deref(),
        })
        .find(|text| !text.is_empty())
        .unwrap_or_default();
    Ok(text.to_string())
}

#[derive(Debug, Clone, Deserialize)]
struct DetectionCandidate {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectionBody {
    List(Vec<DetectionCandidate>),
    Wrapped { detections: Vec<DetectionCandidate> },
    Other(IgnoredAny),
}

/// Picks the highest-confidence candidate from a LibreTranslate-style detection body.
///
/// Ties keep the earliest candidate. A missing confidence ranks below any value.
pub fn detection_result(body: &[u8]) -> Result<DetectionResult, NormalizeError> {
    let candidates = match decode::<DetectionBody>(body)? {
        DetectionBody::List(list) | DetectionBody::Wrapped { detections: list } => list,
        DetectionBody::Other(_) => Vec::new(),
    };

    let mut best: Option<&DetectionCandidate> = None;
    for candidate in &candidates {
        best = match best {
            Some(current) if !outranks(candidate.confidence, current.confidence) => Some(current),
            _ => Some(candidate),
        };
    }

    Ok(best
        .map(|top| DetectionResult {
            language: top.language.clone().filter(|lang| !lang.trim().is_empty()),
            confidence: top.confidence,
        })
        .unwrap_or_default())
}

fn outranks(challenger: Option<f64>, current: Option<f64>) -> bool {
    match (challenger, current) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[derive(Debug, Deserialize)]
struct LingvaInfo {
    #[serde(default)]
    from: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LingvaDetectionBody {
    Fields {
        #[serde(default)]
        info: Option<LingvaInfo>,
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        source: Option<String>,
    },
    Other(IgnoredAny),
}

/// Reads the source language Lingva reports for an `auto` translation.
pub fn lingva_detection(body: &[u8]) -> Result<DetectionResult, NormalizeError> {
    let language = match decode::<LingvaDetectionBody>(body)? {
        LingvaDetectionBody::Fields { info, src, source } => info
            .and_then(|info| info.from)
            .filter(|lang| !lang.is_empty())
            .or(src.filter(|lang| !lang.is_empty()))
            .or(source.filter(|lang| !lang.is_empty())),
        LingvaDetectionBody::Other(_) => None,
    };
    Ok(DetectionResult {
        language,
        confidence: None,
    })
}

#[derive(Debug, Default, Deserialize)]
struct CaptionFields {
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    summary_text: Option<String>,
}

impl CaptionFields {
    fn text(&self) -> Option<&str> {
        [&self.generated_text, &self.caption, &self.summary_text]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|text| !text.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CaptionBody {
    List(Vec<CaptionFields>),
    Single(CaptionFields),
    Other(IgnoredAny),
}

/// Extracts caption text from an image-to-text response.
///
/// Never fails: unrecognised JSON is returned re-serialised and a non-JSON
/// body is returned as text.
pub fn caption_text(body: &[u8]) -> String {
    let parsed = match serde_json::from_slice::<CaptionBody>(body) {
        Ok(parsed) => parsed,
        Err(_) => return String::from_utf8_lossy(body).trim().to_string(),
    };

    let found = match &parsed {
        CaptionBody::List(items) => items.first().and_then(CaptionFields::text),
        CaptionBody::Single(fields) => fields.text(),
        CaptionBody::Other(_) => None,
    };
    if let Some(text) = found {
        return text.to_string();
    }

    serde_json::from_slice::<Value>(body)
        .map(|value| value.to_string())
        .unwrap_or_else(|_| String::from_utf8_lossy(body).to_string())
}

/// One label scored by an image-classification model.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationCandidate {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationBody {
    List(Vec<ClassificationCandidate>),
    Other(IgnoredAny),
}

/// Decodes an image-classification candidate list; other shapes yield no candidates.
pub fn classification_candidates(
    body: &[u8],
) -> Result<Vec<ClassificationCandidate>, NormalizeError> {
    Ok(match decode::<ClassificationBody>(body)? {
        ClassificationBody::List(list) => list,
        ClassificationBody::Other(_) => Vec::new(),
    })
}

/// Picks the top-scoring candidate (earliest on ties) and reduces its label to a sign letter.
pub fn best_classification(
    candidates: &[ClassificationCandidate],
) -> Option<ClassificationResult> {
    let mut best: Option<&ClassificationCandidate> = None;
    for candidate in candidates {
        if best.map_or(true, |current| candidate.score > current.score) {
            best = Some(candidate);
        }
    }
    best.map(|top| ClassificationResult {
        label: sign_letter(&top.label),
        score: top.score,
    })
}

fn sign_letter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z])([A-Z])(?:[^A-Za-z]|$)").expect("static sign letter regex")
    })
}

/// Returns the standalone uppercase letter inside `label`, or the trimmed label.
pub fn sign_letter(label: &str) -> String {
    sign_letter_pattern()
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

#[derive(Debug, Default, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

/// Extracts the reply text from a Gemini `generateContent` response.
pub fn chat_reply(body: &[u8]) -> Result<String, NormalizeError> {
    let response: GeminiResponse = decode(body)?;
    let Some(content) = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
    else {
        return Ok(String::new());
    };

    if let Some(text) = content.parts.first().and_then(|part| part.text.clone()) {
        return Ok(text);
    }
    Ok(content
        .parts
        .iter()
        .map(|part| part.text.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Joins a caption and recognised text, caption first, separated by a blank line.
pub fn combine_caption(caption: &str, recognized: &str) -> Option<String> {
    let caption = caption.trim();
    let recognized = recognized.trim();
    match (caption.is_empty(), recognized.is_empty()) {
        (false, false) => Some(format!("{caption}\n\n{recognized}")),
        (false, true) => Some(caption.to_string()),
        (true, false) => Some(recognized.to_string()),
        (true, true) => None,
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, NormalizeError> {
    serde_json::from_slice(body).map_err(|err| NormalizeError(err.to_string()))
}
