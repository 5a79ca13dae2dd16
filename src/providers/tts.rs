//! Google Translate text-to-speech proxy client.

use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use reqwest::{Client, Response};

use crate::providers::{ensure_success, ProviderError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const TTS_REFERER: &str = "https://translate.google.com/";
const AUDIO_ACCEPT: &str = "audio/mpeg,audio/*;q=0.9,*/*;q=0.8";

/// Upstream texts longer than this are rejected by the endpoint; clients chunk.
pub const MAX_TTS_CHARS: usize = 200;

/// Speech synthesis client returning the upstream response for streaming.
pub struct GoogleTts {
    client: Client,
    url: String,
}

impl GoogleTts {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Requests MPEG audio for `text` spoken in `lang`.
    pub async fn synthesize(&self, text: &str, lang: &str) -> Result<Response, ProviderError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", lang),
                ("client", "tw-ob"),
            ])
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(REFERER, TTS_REFERER)
            .header(ACCEPT, AUDIO_ACCEPT)
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::providers::stub::serve;

    #[tokio::test]
    async fn sends_browser_headers_and_query() {
        let router = Router::new().route(
            "/tts",
            get(
                |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    assert_eq!(q.get("q").map(String::as_str), Some("bonjour"));
                    assert_eq!(q.get("tl").map(String::as_str), Some("fr"));
                    assert_eq!(q.get("client").map(String::as_str), Some("tw-ob"));
                    assert_eq!(headers.get("referer").unwrap(), TTS_REFERER);
                    vec![0xFFu8, 0xFB, 0x90]
                },
            ),
        );
        let base = serve(router).await;
        let tts = GoogleTts::new(Client::new(), format!("{base}/tts"));

        let response = tts.synthesize("bonjour", "fr").await.unwrap();
        let audio = response.bytes().await.unwrap();
        assert_eq!(audio.as_ref(), &[0xFF, 0xFB, 0x90]);
    }
}
