//! Front-end orchestration over the relay API.
//!
//! Device access (microphone, speakers, camera, local OCR, preference
//! storage) is injected through the traits in [`capabilities`], and remote
//! calls go through [`AssistantApi`]. Each flow takes a
//! [`tokio_util::sync::CancellationToken`] so a closed view abandons its
//! in-flight requests.

pub mod assistant;
pub mod capabilities;
pub mod chat;
pub mod gesture;
pub mod playback;
pub mod prefs;
pub mod speech;
pub mod vision;

pub use assistant::{AssistantApi, ClientError, HttpAssistant};
pub use chat::{ChatMessage, ChatSession, Role, SendOutcome, SpeakRequest};
pub use playback::{chunk_text, PlaybackError, PlaybackRoute, SpeechPlayback};
pub use prefs::Preferences;
pub use speech::{CaptureState, SpeechCapture};
pub use vision::{CameraSession, ImageDescription, ImagePipeline, VisionError};
