//! Microphone capture feeding the chat input field.

use tokio::sync::mpsc;
use tracing::debug;

use super::capabilities::{CapabilityError, RecognitionEvent, SpeechRecognizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    RequestingPermission,
    Listening,
}

/// Inline notice placed into the input when capture cannot start.
pub fn capture_notice(err: &CapabilityError) -> String {
    match err {
        CapabilityError::Unsupported => {
            "Speech recognition is not supported on this device.".to_string()
        }
        CapabilityError::PermissionDenied => {
            "Microphone access was denied. Allow it to use voice input.".to_string()
        }
        CapabilityError::Failed(reason) => format!("Voice input unavailable: {reason}"),
    }
}

/// Drives one recognizer and accumulates what it hears into an input buffer.
///
/// In continuous mode final segments keep the session open; otherwise the
/// first final segment ends it.
pub struct SpeechCapture<R: SpeechRecognizer> {
    recognizer: R,
    continuous: bool,
    state: CaptureState,
    events: Option<mpsc::Receiver<RecognitionEvent>>,
    interim: String,
    input: String,
}

impl<R: SpeechRecognizer> SpeechCapture<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            continuous: true,
            state: CaptureState::Idle,
            events: None,
            interim: String::new(),
            input: String::new(),
        }
    }

    pub fn single_utterance(mut self) -> Self {
        self.continuous = false;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Text committed to the input field.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Hypothesis for the segment still being spoken.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Hands the committed input to the caller and clears it.
    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    /// Starts listening from `Idle`, or stops an active session.
    pub async fn toggle(&mut self, lang: &str) -> CaptureState {
        if self.state != CaptureState::Idle {
            self.stop();
            return self.state;
        }

        self.state = CaptureState::RequestingPermission;
        let started = match self.recognizer.request_permission().await {
            Ok(()) => self.recognizer.start(lang).await,
            Err(err) => Err(err),
        };
        match started {
            Ok(events) => {
                debug!(lang, "speech capture started");
                self.events = Some(events);
                self.state = CaptureState::Listening;
            }
            Err(err) => {
                debug!(error = %err, "speech capture unavailable");
                self.input = capture_notice(&err);
                self.state = CaptureState::Idle;
            }
        }
        self.state
    }

    /// Waits for the next recognizer event and applies it.
    ///
    /// Returns `None` once the session is over. A closed channel counts as an
    /// end signal.
    pub async fn next_event(&mut self) -> Option<CaptureState> {
        let events = self.events.as_mut()?;
        let event = events.recv().await.unwrap_or(RecognitionEvent::End);
        self.apply(event);
        Some(self.state)
    }

    fn apply(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Interim(text) => self.interim = text,
            RecognitionEvent::Final(text) => {
                self.interim.clear();
                let segment = text.trim();
                if !segment.is_empty() {
                    if !self.input.is_empty() && !self.input.ends_with(' ') {
                        self.input.push(' ');
                    }
                    self.input.push_str(segment);
                }
                if !self.continuous {
                    self.stop();
                }
            }
            RecognitionEvent::End => self.finish(),
            RecognitionEvent::Error(reason) => {
                debug!(%reason, "speech recognizer reported an error");
                self.finish();
            }
        }
    }

    /// Stops recognition and discards any pending interim text.
    pub fn stop(&mut self) {
        if self.state != CaptureState::Idle {
            self.recognizer.stop();
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.events = None;
        self.interim.clear();
        self.state = CaptureState::Idle;
    }
}

impl<R: SpeechRecognizer> Drop for SpeechCapture<R> {
    fn drop(&mut self) {
        if self.state != CaptureState::Idle {
            self.recognizer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::FakeRecognizer;

    #[tokio::test]
    async fn toggle_walks_idle_listening_idle() {
        let (recognizer, _events) = FakeRecognizer::ready();
        let stops = recognizer.stops();
        let mut capture = SpeechCapture::new(recognizer);

        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.toggle("en-US").await, CaptureState::Listening);
        assert_eq!(capture.toggle("en-US").await, CaptureState::Idle);
        assert_eq!(stops.count(), 1);
    }

    #[tokio::test]
    async fn final_segments_append_to_input() {
        let (recognizer, events) = FakeRecognizer::ready();
        let mut capture = SpeechCapture::new(recognizer);
        capture.set_input("Please");
        capture.toggle("en").await;

        events.send(RecognitionEvent::Interim("tra".into())).await;
        capture.next_event().await;
        assert_eq!(capture.interim(), "tra");

        events.send(RecognitionEvent::Final("translate this".into())).await;
        capture.next_event().await;
        events.send(RecognitionEvent::Final(" now ".into())).await;
        assert_eq!(capture.next_event().await, Some(CaptureState::Listening));

        assert_eq!(capture.input(), "Please translate this now");
        assert_eq!(capture.interim(), "");
    }

    #[tokio::test]
    async fn end_or_error_returns_to_idle() {
        let (recognizer, events) = FakeRecognizer::ready();
        let mut capture = SpeechCapture::new(recognizer);
        capture.toggle("en").await;
        events.send(RecognitionEvent::Error("network".into())).await;
        assert_eq!(capture.next_event().await, Some(CaptureState::Idle));
        assert_eq!(capture.next_event().await, None);

        capture.toggle("en").await;
        events.close();
        assert_eq!(capture.next_event().await, Some(CaptureState::Idle));
    }

    #[tokio::test]
    async fn single_utterance_stops_after_final() {
        let (recognizer, events) = FakeRecognizer::ready();
        let mut capture = SpeechCapture::new(recognizer).single_utterance();
        capture.toggle("en").await;
        events.send(RecognitionEvent::Final("hola".into())).await;
        assert_eq!(capture.next_event().await, Some(CaptureState::Idle));
        assert_eq!(capture.input(), "hola");
    }

    #[tokio::test]
    async fn denied_permission_becomes_inline_notice() {
        let recognizer = FakeRecognizer::failing(CapabilityError::PermissionDenied);
        let mut capture = SpeechCapture::new(recognizer);

        assert_eq!(capture.toggle("en").await, CaptureState::Idle);
        assert!(capture.input().contains("Microphone access was denied"));
    }

    #[tokio::test]
    async fn missing_recognizer_is_reported() {
        let mut capture = SpeechCapture::new(FakeRecognizer::failing(CapabilityError::Unsupported));
        capture.toggle("en").await;
        assert_eq!(
            capture.take_input(),
            "Speech recognition is not supported on this device."
        );
        assert_eq!(capture.input(), "");
    }

    #[tokio::test]
    async fn dropping_an_active_capture_stops_the_recognizer() {
        let (recognizer, _events) = FakeRecognizer::ready();
        let stops = recognizer.stops();
        let mut capture = SpeechCapture::new(recognizer);
        capture.toggle("en").await;
        drop(capture);
        assert_eq!(stops.count(), 1);
    }
}
