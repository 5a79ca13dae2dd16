//! Device capabilities the orchestrator depends on.
//!
//! A front end supplies implementations backed by the platform (microphone,
//! camera, speech engine, storage); tests supply fakes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::ocr::{OcrEngine, OcrOutput};

/// Failure reported by a local capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("not supported on this device")]
    Unsupported,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{0}")]
    Failed(String),
}

/// Event emitted by an active recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Interim(String),
    Final(String),
    End,
    Error(String),
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn request_permission(&self) -> Result<(), CapabilityError>;

    /// Starts a session; events arrive on the returned channel until it closes.
    async fn start(&self, lang: &str) -> Result<mpsc::Receiver<RecognitionEvent>, CapabilityError>;

    fn stop(&self);
}

/// A voice offered by the local speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub uri: String,
    pub name: String,
    pub lang: String,
}

#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Speaks `text` and resolves once the utterance has finished.
    async fn speak(&self, text: &str, lang: &str, voice: Option<&Voice>)
        -> Result<(), CapabilityError>;

    fn cancel(&self);
}

/// Output for server-synthesised audio clips.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays one clip and resolves once it has finished.
    async fn play(&self, clip: Bytes) -> Result<(), CapabilityError>;

    fn pause(&self);
}

/// One captured still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MediaStream>, CapabilityError>;
}

/// A live camera stream. `stop` releases the device.
pub trait MediaStream: Send {
    fn snapshot(&mut self) -> Result<Frame, CapabilityError>;

    fn stop(&mut self);
}

#[async_trait]
pub trait LocalOcr: Send + Sync {
    async fn recognize(&self, image: &[u8], lang: &str) -> Result<OcrOutput, CapabilityError>;
}

#[async_trait]
impl<T: OcrEngine> LocalOcr for T {
    async fn recognize(&self, image: &[u8], lang: &str) -> Result<OcrOutput, CapabilityError> {
        OcrEngine::recognize(self, image, lang)
            .await
            .map_err(|err| CapabilityError::Failed(err.to_string()))
    }
}

/// Key/value store holding JSON-encoded preference values.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory [`PreferenceStore`].
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` JSON-encoded under `key`.
    pub fn set(&self, key: &str, value: serde_json::Value) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}
