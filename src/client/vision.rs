//! Describing what the camera (or an uploaded picture) shows.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::assistant::{AssistantApi, ClientError};
use super::capabilities::{Camera, CapabilityError, Frame, LocalOcr, MediaStream};
use super::prefs::Preferences;
use crate::normalize::{combine_caption, EMPTY_CAPTION};
use crate::providers::ImagePayload;

/// Open camera stream, stopped when dropped.
pub struct CameraSession {
    stream: Box<dyn MediaStream>,
}

impl CameraSession {
    pub async fn open(camera: &dyn Camera) -> Result<Self, CapabilityError> {
        Ok(Self {
            stream: camera.open().await?,
        })
    }

    pub fn snapshot(&mut self) -> Result<Frame, CapabilityError> {
        self.stream.snapshot()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stream.stop();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("camera unavailable: {0}")]
    Camera(#[from] CapabilityError),
    #[error(transparent)]
    Remote(#[from] ClientError),
}

/// Result of describing one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescription {
    pub caption: String,
    pub recognized_text: String,
    /// Caption and recognised text combined for display.
    pub text: String,
    pub translated: Option<String>,
}

pub struct ImagePipeline<A> {
    api: Arc<A>,
    ocr: Option<Arc<dyn LocalOcr>>,
    camera: Arc<dyn Camera>,
    prefs: Preferences,
    session: Option<CameraSession>,
}

impl<A: AssistantApi> ImagePipeline<A> {
    pub fn new(
        api: Arc<A>,
        ocr: Option<Arc<dyn LocalOcr>>,
        camera: Arc<dyn Camera>,
        prefs: Preferences,
    ) -> Self {
        Self {
            api,
            ocr,
            camera,
            prefs,
            session: None,
        }
    }

    pub fn camera_open(&self) -> bool {
        self.session.is_some()
    }

    pub async fn open_camera(&mut self) -> Result<(), VisionError> {
        if self.session.is_none() {
            self.session = Some(CameraSession::open(self.camera.as_ref()).await?);
        }
        Ok(())
    }

    /// Releases the camera.
    pub fn close_camera(&mut self) {
        self.session = None;
    }

    /// Snapshots the camera and describes the frame.
    ///
    /// A failed snapshot releases the camera before returning.
    pub async fn capture_and_describe(
        &mut self,
        target: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ImageDescription, VisionError> {
        self.open_camera().await?;
        let snapshot = match self.session.as_mut() {
            Some(session) => session.snapshot(),
            None => Err(CapabilityError::Unsupported),
        };
        let frame = match snapshot {
            Ok(frame) => frame,
            Err(err) => {
                self.close_camera();
                return Err(err.into());
            }
        };
        let image = ImagePayload {
            bytes: frame.bytes,
            content_type: Some(frame.content_type),
        };
        self.describe(&image, target, cancel).await
    }

    /// Local OCR first, then the server caption; the combined text is
    /// translated when a target language applies.
    pub async fn describe(
        &self,
        image: &ImagePayload,
        target: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ImageDescription, VisionError> {
        let recognized_text = self.recognize(image).await;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled.into());
        }

        let caption = match self.api.caption(image, cancel).await {
            Ok(caption) => caption.trim().to_string(),
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled.into()),
            Err(err) if !recognized_text.is_empty() => {
                debug!(error = %err, "caption failed; keeping recognised text");
                String::new()
            }
            Err(err) => return Err(err.into()),
        };

        let text = combine_caption(&caption, &recognized_text)
            .unwrap_or_else(|| EMPTY_CAPTION.to_string());

        let translated = match self.prefs.effective_target(target) {
            Some(lang) if text != EMPTY_CAPTION => {
                match self.api.translate(&text, "auto", &lang, cancel).await {
                    Ok(translated) if !translated.trim().is_empty() => Some(translated),
                    Ok(_) => None,
                    Err(ClientError::Cancelled) => return Err(ClientError::Cancelled.into()),
                    Err(err) => {
                        debug!(error = %err, "description translation failed");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(ImageDescription {
            caption,
            recognized_text,
            text,
            translated,
        })
    }

    async fn recognize(&self, image: &ImagePayload) -> String {
        let Some(ocr) = &self.ocr else {
            return String::new();
        };
        match ocr.recognize(&image.bytes, &self.prefs.ocr_lang()).await {
            Ok(output) => output.accepted_text().unwrap_or_default().to_string(),
            Err(err) => {
                debug!(error = %err, "local ocr failed");
                String::new()
            }
        }
    }
}
