//! Optical character recognition.
//!
//! The HTTP layer depends on the [`OcrEngine`] trait; the default engine
//! shells out to the `tesseract` CLI and parses its TSV report.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::providers::ProviderError;

/// Recognised text below this mean word confidence is discarded by captioning.
pub const MIN_OCR_CONFIDENCE: f64 = 60.0;

/// Text recognised in an image plus mean word confidence in `[0, 100]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
}

impl OcrOutput {
    /// Returns the trimmed text when it is non-empty and confident enough.
    pub fn accepted_text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty() && self.confidence >= MIN_OCR_CONFIDENCE).then_some(text)
    }
}

/// OCR contract implemented by recognition engines.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognises text in `image` using a tesseract-style language code such as `eng`.
    async fn recognize(&self, image: &[u8], lang: &str) -> Result<OcrOutput, ProviderError>;
}

/// Runs the `tesseract` executable once per image.
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &[u8], lang: &str) -> Result<OcrOutput, ProviderError> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", lang, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ProviderError::Unavailable(format!("failed to start {}: {err}", self.binary))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image)
                .await
                .map_err(|err| ProviderError::Unavailable(format!("failed to feed image: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ProviderError::Unavailable(format!("tesseract did not finish: {err}")))?;
        if !output.status.success() {
            return Err(ProviderError::Unavailable(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Rebuilds line text and mean word confidence from tesseract TSV output.
///
/// Columns: level, page, block, par, line, word, left, top, width, height, conf, text.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Option<(u32, u32, u32, u32)> = None;
    let mut confidence_sum = 0.0;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let Ok(conf) = cols[10].trim().parse::<f64>() else {
            continue;
        };
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match lines.last_mut() {
            Some(line) if current_line == Some(key) => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_line = Some(key);
            }
        }
        confidence_sum += conf;
        words += 1;
    }

    OcrOutput {
        text: lines.join("\n"),
        confidence: if words == 0 {
            0.0
        } else {
            confidence_sum / words as f64
        },
    }
}
