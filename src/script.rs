//! Narration script generation

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::http;
use crate::style::Mode;

/// Responses at or below this many characters are treated as failures
pub const MIN_RESPONSE_CHARS: usize = 10;

/// Remote text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Plain-text GET endpoint that takes the prompt as its path
pub struct PollinationsText {
    http: reqwest::Client,
    base: String,
}

impl PollinationsText {
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into(),
        }
    }

    fn url(&self, prompt: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            urlencoding::encode(prompt)
        )
    }
}

#[async_trait]
impl TextGenerator for PollinationsText {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.http.get(self.url(prompt)).send().await?;
        let response = http::check_status("text generation", response)?;
        Ok(response.text().await?)
    }
}

#[must_use]
pub fn prompt(topic: &str, mode: Mode) -> String {
    match mode {
        Mode::Short => format!(
            "Write a fast-paced 40-second script about '{topic}'. No intro, straight into facts. Hook the audience immediately."
        ),
        Mode::Long => format!(
            "Write a 2-minute educational script about '{topic}'. Include an intro, 3 main points, and a conclusion."
        ),
    }
}

#[must_use]
pub fn fallback(topic: &str) -> String {
    format!("{topic} is a fascinating subject. There is so much to learn about it. Let's dive in.")
}

pub struct ScriptWriter<'a> {
    generator: &'a dyn TextGenerator,
}

impl<'a> ScriptWriter<'a> {
    pub fn new(generator: &'a dyn TextGenerator) -> Self {
        Self { generator }
    }

    /// Never fails: any generation problem yields the canned fallback.
    pub async fn write(&self, topic: &str, mode: Mode) -> String {
        match self.generator.generate(&prompt(topic, mode)).await {
            Ok(text) if text.trim().chars().count() > MIN_RESPONSE_CHARS => {
                info!("Script generated ({} chars)", text.len());
                text.trim().to_string()
            }
            Ok(text) => {
                warn!(
                    "Script response too short ({} chars), using fallback",
                    text.trim().chars().count()
                );
                fallback(topic)
            }
            Err(e) => {
                warn!("Script generation failed, using fallback: {e}");
                fallback(topic)
            }
        }
    }
}
