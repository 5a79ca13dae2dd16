//! Typed access to stored user preferences.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::capabilities::PreferenceStore;

pub const TARGET_LANG: &str = "settings.targetLang";
pub const AUTO_TRANSLATE: &str = "settings.autoTranslate";
pub const TTS_AUTO_PLAY: &str = "settings.ttsAutoPlay";
pub const OCR_LANG: &str = "settings.ocrLang";
pub const TTS_VOICE_URI: &str = "settings.ttsVoiceURI";
pub const INPUT_LANG: &str = "settings.inputLang";

pub const DEFAULT_OCR_LANG: &str = "eng";
pub const DEFAULT_INPUT_LANG: &str = "en";

/// Reads preferences on every access so changes apply without a restart.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    fn decoded<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        serde_json::from_str(&raw).ok()
    }

    /// String value; a raw (non-JSON) string is accepted as-is.
    fn text(&self, key: &str) -> Option<String> {
        let raw = self.store.get(key)?;
        let value = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn flag(&self, key: &str) -> bool {
        self.decoded::<bool>(key).unwrap_or(false)
    }

    /// Target language to translate replies into, if any.
    ///
    /// A per-session override wins; otherwise the stored target applies only
    /// while auto-translate is enabled.
    pub fn effective_target(&self, session_override: Option<&str>) -> Option<String> {
        if let Some(lang) = session_override.map(str::trim).filter(|lang| !lang.is_empty()) {
            return Some(lang.to_string());
        }
        if self.flag(AUTO_TRANSLATE) {
            self.text(TARGET_LANG)
        } else {
            None
        }
    }

    pub fn tts_auto_play(&self) -> bool {
        self.flag(TTS_AUTO_PLAY)
    }

    pub fn ocr_lang(&self) -> String {
        self.text(OCR_LANG)
            .unwrap_or_else(|| DEFAULT_OCR_LANG.to_string())
    }

    pub fn voice_uri(&self) -> Option<String> {
        self.text(TTS_VOICE_URI)
    }

    pub fn input_lang(&self) -> String {
        self.text(INPUT_LANG)
            .unwrap_or_else(|| DEFAULT_INPUT_LANG.to_string())
    }
}
