//! Run configuration: defaults, optional TOML file, environment

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::style::VibeLexicon;

pub const FOOTAGE_KEY_ENV: &str = "PEXELS_API_KEY";

/// Backend for narration text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextProvider {
    #[default]
    Pollinations,
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub text_provider: TextProvider,
    pub text_api_base: String,
    /// Chat model used when `text_provider` is `openai`
    pub openai_model: String,
    pub image_api_base: String,
    pub image_model: String,
    pub footage_api_base: String,
    pub footage_api_key: Option<String>,
    /// OpenAI voice name for the primary engine
    pub tts_voice_primary: String,
    /// Language code for the fallback engine
    pub tts_voice_fallback: String,
    pub fallback_tts_base: String,
    pub vibe_lexicon: VibeLexicon,
    /// Preferred bold font; well-known system fonts are tried after it
    pub font_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    /// x264 preset for both the fallback clip and the final encode
    pub encoder_preset: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_provider: TextProvider::default(),
            text_api_base: "https://text.pollinations.ai".to_string(),
            openai_model: "gpt-4o".to_string(),
            image_api_base: "https://image.pollinations.ai".to_string(),
            image_model: "flux".to_string(),
            footage_api_base: "https://api.pexels.com/videos/search".to_string(),
            footage_api_key: None,
            tts_voice_primary: "nova".to_string(),
            tts_voice_fallback: "en".to_string(),
            fallback_tts_base: "https://translate.google.com/translate_tts".to_string(),
            vibe_lexicon: VibeLexicon::default(),
            font_path: None,
            work_dir: PathBuf::from("."),
            encoder_preset: "medium".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("text_provider", &self.text_provider)
            .field("text_api_base", &self.text_api_base)
            .field("image_api_base", &self.image_api_base)
            .field("footage_api_base", &self.footage_api_base)
            .field(
                "footage_api_key",
                &self.footage_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("tts_voice_primary", &self.tts_voice_primary)
            .field("tts_voice_fallback", &self.tts_voice_fallback)
            .field("font_path", &self.font_path)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from an explicit file, or from the default location when present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("videofactory").join("config.toml"))
    }

    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(FOOTAGE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.footage_api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("text_api_base", &self.text_api_base),
            ("image_api_base", &self.image_api_base),
            ("footage_api_base", &self.footage_api_base),
            ("fallback_tts_base", &self.fallback_tts_base),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "{name} must be an http(s) URL, got '{value}'"
                )));
            }
        }
        if self.tts_voice_fallback.trim().is_empty() {
            return Err(Error::Config("tts_voice_fallback is empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Vibe;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.footage_api_key.is_none());
        assert_eq!(config.text_provider, TextProvider::Pollinations);
    }

    #[test]
    fn file_overrides_merge_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
text_provider = "openai"
footage_api_key = "abc"
work_dir = "/tmp/factory"

[vibe_lexicon]
urgent = "storm clouds"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.text_provider, TextProvider::OpenAi);
        assert_eq!(config.footage_api_key.as_deref(), Some("abc"));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/factory"));
        assert_eq!(config.vibe_lexicon.phrase(Vibe::Urgent), "storm clouds");
        assert_eq!(config.image_model, "flux");
    }

    #[test]
    fn rejects_non_http_base() {
        let config = Config {
            image_api_base: "ftp://example.com".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("image_api_base"));
    }

    #[test]
    fn debug_redacts_key() {
        let config = Config {
            footage_api_key: Some("secret-key".to_string()),
            ..Config::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
