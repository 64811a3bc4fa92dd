//! Narration audio with a primary and a fallback engine

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::http;

pub const MIN_SCRIPT_CHARS: usize = 5;
pub const APOLOGY: &str = "I am sorry, but I could not generate a script for this topic.";

/// Translate TTS rejects longer queries
const TRANSLATE_CHUNK_CHARS: usize = 100;

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Write an encoded audio file for `text` to `dest`
    async fn synthesize(&self, text: &str, dest: &Path) -> Result<()>;
}

/// Text that will actually be spoken; too-short scripts become an apology
#[must_use]
pub fn narration_text(script: &str) -> &str {
    let trimmed = script.trim();
    if trimmed.chars().count() < MIN_SCRIPT_CHARS {
        APOLOGY
    } else {
        trimmed
    }
}

/// Try `primary`, then `fallback`. On success `dest` holds a non-empty file;
/// on failure nothing is left at `dest`.
pub async fn synthesize(
    primary: &dyn SpeechEngine,
    fallback: &dyn SpeechEngine,
    script: &str,
    dest: &Path,
) -> Result<PathBuf> {
    let text = narration_text(script);
    let mut failures = Vec::new();

    for engine in [primary, fallback] {
        let outcome = match engine.synthesize(text, dest).await {
            Ok(()) => ensure_non_empty(dest).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(bytes) => {
                info!("Narration recorded with {} ({bytes} bytes)", engine.name());
                return Ok(dest.to_path_buf());
            }
            Err(e) => {
                warn!("TTS engine {} failed: {e}", engine.name());
                discard(dest).await;
                failures.push(format!("{}: {e}", engine.name()));
            }
        }
    }

    Err(Error::Speech(failures.join("; ")))
}

async fn ensure_non_empty(path: &Path) -> Result<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        _ => Err(Error::EmptyOutput(path.to_path_buf())),
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {e}", path.display());
        }
    }
}

/// The unofficial translate TTS endpoint, fetched chunk by chunk
pub struct TranslateSpeech {
    http: reqwest::Client,
    base: String,
    lang: String,
}

impl TranslateSpeech {
    pub fn new(http: reqwest::Client, base: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into(),
            lang: lang.into(),
        }
    }
}

#[async_trait]
impl SpeechEngine for TranslateSpeech {
    fn name(&self) -> &str {
        "translate"
    }

    async fn synthesize(&self, text: &str, dest: &Path) -> Result<()> {
        let chunks = chunk_text(text, TRANSLATE_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let response = self
                .http
                .get(&self.base)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.lang.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                ])
                .send()
                .await?;
            let response = http::check_status("translate tts", response)?;
            audio.extend_from_slice(&response.bytes().await?);
        }

        fs::write(dest, audio).await?;
        Ok(())
    }
}

/// Split on word boundaries into pieces of at most `max_chars`
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        for piece in split_long(word, max_chars) {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
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

fn split_long(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
