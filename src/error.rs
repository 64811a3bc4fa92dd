use std::fmt;
use std::path::PathBuf;

use ffmpeg_next as ffmpeg;
use thiserror::Error;

/// Errors produced by the factory's capabilities and media code
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No stock footage matched '{0}'")]
    NoFootage(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    #[error("Produced an empty file: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("OpenAI error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("Request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage, used for progress reporting and failure attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Stage {
    Script,
    Voice,
    Footage,
    Thumbnail,
    Assembly,
}

impl Stage {
    /// Human-facing progress line for the stage
    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Stage::Script => "Writing script...",
            Stage::Voice => "Recording voice...",
            Stage::Footage => "Fetching video...",
            Stage::Thumbnail => "Designing thumbnail...",
            Stage::Assembly => "Editing video...",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Script => "script",
            Stage::Voice => "voice",
            Stage::Footage => "footage",
            Stage::Thumbnail => "thumbnail",
            Stage::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

/// A fatal error together with the stage that halted the run
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl StageError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}
