//! Spoken playback of replies.
//!
//! Server synthesis is preferred: the text is split into chunks the TTS
//! route accepts, every clip is fetched up front and the clips are played
//! back to back. Any failure on that path hands the whole text to the local
//! speech engine instead.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::assistant::{AssistantApi, ClientError};
use super::capabilities::{AudioSink, CapabilityError, LocalSynthesizer, Voice};
use super::prefs::Preferences;

/// Route that produced the audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRoute {
    Server,
    Local,
    /// Nothing to say.
    Silent,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("playback stopped")]
    Stopped,
    #[error("speech playback is not supported on this device")]
    Unsupported,
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';' | '。' | '！' | '？' | '；')
}

/// Splits `text` into pieces of at most `max_chars` characters.
///
/// Sentences are packed together while they fit; a sentence that does not
/// fit on its own is split between words, and a single word longer than the
/// limit is cut.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences(&normalized) {
        let pieces = if sentence.chars().count() > max_chars {
            split_words(sentence, max_chars)
        } else {
            vec![sentence.to_string()]
        };
        for piece in pieces {
            let joined = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if joined > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !is_sentence_end(c) {
            continue;
        }
        let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_break {
            let end = idx + c.len_utf8();
            out.push(text[start..end].trim());
            start = end;
        }
    }
    out.push(text[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

fn split_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split(' ') {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(String::from_iter));
            continue;
        }
        let joined = current.chars().count() + usize::from(!current.is_empty()) + word_len;
        if joined > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn lang_prefix(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Picks the stored voice when it speaks `lang`, else the first voice whose
/// language prefix matches.
pub fn pick_voice<'a>(
    voices: &'a [Voice],
    lang: &str,
    preferred_uri: Option<&str>,
) -> Option<&'a Voice> {
    let prefix = lang_prefix(lang);
    let matching = |voice: &&Voice| lang_prefix(&voice.lang) == prefix;
    preferred_uri
        .and_then(|uri| voices.iter().find(|v| matching(v) && v.uri == uri))
        .or_else(|| voices.iter().find(matching))
}

/// Plays one reply at a time through server clips or the local engine.
pub struct SpeechPlayback<A> {
    api: Arc<A>,
    sink: Arc<dyn AudioSink>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    prefs: Preferences,
    max_chars: usize,
    active: Mutex<Option<CancellationToken>>,
}

impl<A: AssistantApi> SpeechPlayback<A> {
    pub fn new(
        api: Arc<A>,
        sink: Arc<dyn AudioSink>,
        local: Option<Arc<dyn LocalSynthesizer>>,
        prefs: Preferences,
    ) -> Self {
        Self {
            api,
            sink,
            local,
            prefs,
            max_chars: crate::providers::tts::MAX_TTS_CHARS,
            active: Mutex::new(None),
        }
    }

    /// Speaks `text`, replacing whatever is playing.
    pub async fn speak(
        &self,
        text: &str,
        lang: &str,
        cancel: &CancellationToken,
    ) -> Result<PlaybackRoute, PlaybackError> {
        let chunks = chunk_text(text, self.max_chars);
        if chunks.is_empty() {
            return Ok(PlaybackRoute::Silent);
        }
        let token = self.activate(cancel);

        match self.play_server(&chunks, lang, &token).await {
            Ok(()) => return Ok(PlaybackRoute::Server),
            Err(_) if token.is_cancelled() => return Err(PlaybackError::Stopped),
            Err(err) => {
                warn!(
                    error = %err,
                    chunks = chunks.len(),
                    "server speech failed; trying local voice"
                );
                self.sink.pause();
            }
        }

        let Some(local) = &self.local else {
            return Err(PlaybackError::Unsupported);
        };
        let voices = local.voices();
        let voice = pick_voice(&voices, lang, self.prefs.voice_uri().as_deref());
        debug!(
            voice = voice.map(|v| v.name.as_str()),
            lang,
            "speaking locally"
        );

        let utterance = chunks.join(" ");
        let spoken = tokio::select! {
            biased;
            _ = token.cancelled() => {
                local.cancel();
                return Err(PlaybackError::Stopped);
            }
            spoken = local.speak(&utterance, lang, voice) => spoken,
        };
        match spoken {
            Ok(()) => Ok(PlaybackRoute::Local),
            Err(err) => {
                debug!(error = %err, "local speech failed");
                Err(PlaybackError::Unsupported)
            }
        }
    }

    async fn play_server(
        &self,
        chunks: &[String],
        lang: &str,
        token: &CancellationToken,
    ) -> Result<(), PlaybackFailure> {
        let mut clips = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            clips.push(self.api.speech(chunk, lang, token).await?);
        }
        for clip in clips {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(PlaybackFailure::Remote(ClientError::Cancelled));
                }
                played = self.sink.play(clip) => played?,
            }
        }
        Ok(())
    }

    /// Registers a fresh playback and cancels the previous one.
    fn activate(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }
        token
    }

    /// Stops the active playback, if any.
    pub fn stop(&self) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(token) = active.take() {
                token.cancel();
            }
        }
        self.sink.pause();
        if let Some(local) = &self.local {
            local.cancel();
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PlaybackFailure {
    #[error(transparent)]
    Remote(#[from] ClientError),
    #[error("audio output failed: {0}")]
    Sink(#[from] CapabilityError),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::client::capabilities::MemoryPreferences;
    use crate::client::prefs::TTS_VOICE_URI;
    use crate::client::test_support::{FakeSynthesizer, RecordingSink, ScriptedApi};

    fn voice(uri: &str, lang: &str) -> Voice {
        Voice {
            uri: uri.to_string(),
            name: uri.to_string(),
            lang: lang.to_string(),
        }
    }

    fn prefs(entries: &[(&str, serde_json::Value)]) -> Preferences {
        let store = MemoryPreferences::new();
        for (key, value) in entries {
            store.set(key, value.clone());
        }
        Preferences::new(Arc::new(store))
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  Hello   there. ", 200), vec!["Hello there."]);
        assert!(chunk_text("   ", 200).is_empty());
    }

    #[test]
    fn sentences_are_packed_up_to_the_limit() {
        let chunks = chunk_text("One two. Three four. Five six.", 20);
        assert_eq!(chunks, vec!["One two. Three four.", "Five six."]);
    }

    #[test]
    fn long_sentence_splits_between_words() {
        let chunks = chunk_text("alpha beta gamma delta", 11);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn oversized_word_is_cut() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn every_chunk_respects_tts_limit() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(12);
        let chunks = chunk_text(&text, 200);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn multibyte_text_counts_characters() {
        let chunks = chunk_text("¿Qué tal? ¡Muy bien!", 10);
        assert_eq!(chunks, vec!["¿Qué tal?", "¡Muy bien!"]);
    }

    #[test]
    fn voice_matches_language_prefix_and_preference() {
        let voices = vec![
            voice("en-a", "en-US"),
            voice("es-a", "es-ES"),
            voice("es-b", "es-MX"),
        ];
        assert_eq!(pick_voice(&voices, "es", None).unwrap().uri, "es-a");
        assert_eq!(pick_voice(&voices, "es", Some("es-b")).unwrap().uri, "es-b");
        assert_eq!(pick_voice(&voices, "es", Some("en-a")).unwrap().uri, "es-a");
        assert!(pick_voice(&voices, "fr", None).is_none());
    }

    #[tokio::test]
    async fn server_clips_play_in_order() {
        let api = ScriptedApi::default();
        let sink = RecordingSink::default();
        let playback = SpeechPlayback::new(
            Arc::new(api.clone()),
            Arc::new(sink.clone()),
            None,
            prefs(&[]),
        );

        let first = format!("{}.", "a".repeat(150));
        let second = format!("{}.", "b".repeat(150));
        let text = format!("{first} {second}");
        let route = playback
            .speak(&text, "en", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(route, PlaybackRoute::Server);
        assert_eq!(sink.played(), vec![first, second]);
    }

    #[tokio::test]
    async fn server_failure_falls_back_to_local_voice() {
        let api = ScriptedApi::default().with_speech_failure();
        let sink = RecordingSink::default();
        let voices = vec![voice("en-a", "en-GB"), voice("fr-a", "fr-FR")];
        let local = FakeSynthesizer::with_voices(voices);
        let playback = SpeechPlayback::new(
            Arc::new(api),
            Arc::new(sink.clone()),
            Some(Arc::new(local.clone())),
            prefs(&[(TTS_VOICE_URI, json!("fr-a"))]),
        );

        let route = playback
            .speak("Bonjour tout le monde", "fr-FR", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(route, PlaybackRoute::Local);
        assert_eq!(sink.pauses(), 1);
        let spoken = local.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].0, "Bonjour tout le monde");
        assert_eq!(spoken[0].1.as_deref(), Some("fr-a"));
    }

    #[tokio::test]
    async fn no_route_is_unsupported() {
        let api = ScriptedApi::default().with_speech_failure();
        let playback = SpeechPlayback::new(
            Arc::new(api),
            Arc::new(RecordingSink::default()),
            None,
            prefs(&[]),
        );
        let err = playback
            .speak("hi", "en", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Unsupported));
    }

    #[tokio::test]
    async fn cancelled_playback_does_not_fall_back() {
        let local = FakeSynthesizer::with_voices(vec![voice("en-a", "en-US")]);
        let playback = SpeechPlayback::new(
            Arc::new(ScriptedApi::default()),
            Arc::new(RecordingSink::default()),
            Some(Arc::new(local.clone())),
            prefs(&[]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = playback.speak("hi", "en", &cancel).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Stopped));
        assert!(local.spoken().is_empty());
    }

    #[tokio::test]
    async fn stop_pauses_sink_and_local_engine() {
        let sink = RecordingSink::default();
        let local = FakeSynthesizer::with_voices(Vec::new());
        let playback = SpeechPlayback::new(
            Arc::new(ScriptedApi::default()),
            Arc::new(sink.clone()),
            Some(Arc::new(local.clone())),
            prefs(&[]),
        );
        playback.stop();
        assert_eq!(sink.pauses(), 1);
        assert_eq!(local.cancels(), 1);
    }
}
