//! Conversation history and the send-message flow.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::assistant::{AssistantApi, ClientError};
use super::playback::{PlaybackError, PlaybackRoute, SpeechPlayback};
use super::prefs::Preferences;

/// Text shown in place of a reply when the chat call fails.
pub const CHAT_ERROR_PLACEHOLDER: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Inline status text such as a capability notice.
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Untranslated reply when `content` holds a translation.
    pub original: Option<String>,
    pub failed: bool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            original: None,
            failed: false,
        }
    }
}

/// Text handed to playback after a reply is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    pub lang: String,
}

/// What a completed send produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub reply: ChatMessage,
    pub speak: Option<SpeakRequest>,
}

/// In-memory conversation. Nothing outlives the session.
pub struct ChatSession<A> {
    api: Arc<A>,
    prefs: Preferences,
    target_override: Option<String>,
    context: Option<String>,
    messages: Vec<ChatMessage>,
}

impl<A: AssistantApi> ChatSession<A> {
    pub fn new(api: Arc<A>, prefs: Preferences) -> Self {
        Self {
            api,
            prefs,
            target_override: None,
            context: None,
            messages: Vec::new(),
        }
    }

    /// Pins the reply language for this session only.
    pub fn set_target_override(&mut self, lang: Option<String>) {
        self.target_override = lang;
    }

    /// System instruction sent with every prompt.
    pub fn set_context(&mut self, context: Option<String>) {
        self.context = context;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn effective_target(&self) -> Option<String> {
        self.prefs.effective_target(self.target_override.as_deref())
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Notice, text));
    }

    /// Plays a reply, posting a notice when no speech route exists.
    pub async fn play_reply(
        &mut self,
        playback: &SpeechPlayback<A>,
        request: &SpeakRequest,
        cancel: &CancellationToken,
    ) -> Result<PlaybackRoute, PlaybackError> {
        let played = playback.speak(&request.text, &request.lang, cancel).await;
        if let Err(err @ PlaybackError::Unsupported) = &played {
            self.push_notice(err.to_string());
        }
        played
    }

    /// Sends `input` and appends the reply (or an error placeholder).
    ///
    /// Returns `None` for blank input or when `cancel` fired; a cancelled
    /// send leaves only the user message behind.
    pub async fn send(&mut self, input: &str, cancel: &CancellationToken) -> Option<SendOutcome> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return None;
        }
        self.messages.push(ChatMessage::new(Role::User, prompt));

        let reply = match self.api.chat(prompt, self.context.as_deref(), cancel).await {
            Ok(reply) => self.localize(reply, cancel).await?,
            Err(ClientError::Cancelled) => return None,
            Err(err) => {
                warn!(error = %err, "chat request failed");
                ChatMessage {
                    failed: true,
                    ..ChatMessage::new(Role::Assistant, CHAT_ERROR_PLACEHOLDER)
                }
            }
        };
        self.messages.push(reply.clone());

        let speak = (!reply.failed && self.prefs.tts_auto_play()).then(|| SpeakRequest {
            text: reply.content.clone(),
            lang: self
                .effective_target()
                .unwrap_or_else(|| self.prefs.input_lang()),
        });
        Some(SendOutcome { reply, speak })
    }

    /// Translates a reply into the effective target, keeping the original on failure.
    async fn localize(&self, reply: String, cancel: &CancellationToken) -> Option<ChatMessage> {
        let Some(target) = self.effective_target() else {
            return Some(ChatMessage::new(Role::Assistant, reply));
        };
        match self.api.translate(&reply, "auto", &target, cancel).await {
            Ok(translated) if !translated.trim().is_empty() => Some(ChatMessage {
                original: Some(reply),
                ..ChatMessage::new(Role::Assistant, translated)
            }),
            Ok(_) => Some(ChatMessage::new(Role::Assistant, reply)),
            Err(ClientError::Cancelled) => None,
            Err(err) => {
                debug!(error = %err, lang = %target, "reply translation failed; showing original");
                Some(ChatMessage::new(Role::Assistant, reply))
            }
        }
    }
}
