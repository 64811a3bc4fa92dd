//! The production line: script, voice, footage, thumbnail and assembly run in
//! order, each stage either recovering with fallback content or halting the run.

use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::ai::{OpenAiSpeech, OpenAiText};
use crate::config::{Config, TextProvider};
use crate::error::{Error, Result, Stage, StageError};
use crate::footage::{FootageSource, PexelsFootage};
use crate::http;
use crate::script::{PollinationsText, ScriptWriter, TextGenerator};
use crate::style::{Mode, Vibe, BLACK};
use crate::text;
use crate::thumbnail::{ImageGenerator, PollinationsImage, ThumbnailComposer};
use crate::video::{self, AssemblyJob, ColorGrade, FALLBACK_CLIP_SECS};
use crate::voice::{self, SpeechEngine, TranslateSpeech};

pub const SCRIPT_FILE: &str = "script.txt";
pub const AUDIO_FILE: &str = "audio.mp3";
pub const FOOTAGE_FILE: &str = "bg.mp4";
pub const THUMBNAIL_FILE: &str = "thumb.jpg";
pub const SUBTITLE_FILE: &str = "subtitle.png";
pub const VIDEO_FILE: &str = "final.mp4";

#[derive(Debug, Clone)]
pub struct Request {
    pub topic: String,
    pub mode: Mode,
    pub vibe: Vibe,
}

impl Request {
    pub fn new(topic: impl Into<String>, mode: Mode, vibe: Vibe) -> Self {
        Self {
            topic: topic.into(),
            mode,
            vibe,
        }
    }
}

/// External services the factory depends on
pub struct Capabilities {
    pub text: Box<dyn TextGenerator>,
    pub primary_voice: Box<dyn SpeechEngine>,
    pub fallback_voice: Box<dyn SpeechEngine>,
    pub footage: Box<dyn FootageSource>,
    pub images: Box<dyn ImageGenerator>,
}

impl Capabilities {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http::client()?;
        let text: Box<dyn TextGenerator> = match config.text_provider {
            TextProvider::Pollinations => {
                Box::new(PollinationsText::new(http.clone(), &config.text_api_base))
            }
            TextProvider::OpenAi => Box::new(OpenAiText::new(&config.openai_model)),
        };

        Ok(Self {
            text,
            primary_voice: Box::new(OpenAiSpeech::new(&config.tts_voice_primary)?),
            fallback_voice: Box::new(TranslateSpeech::new(
                http.clone(),
                &config.fallback_tts_base,
                &config.tts_voice_fallback,
            )),
            footage: Box::new(PexelsFootage::new(
                http.clone(),
                &config.footage_api_base,
                config.footage_api_key.clone(),
            )),
            images: Box::new(PollinationsImage::new(
                http,
                &config.image_api_base,
                &config.image_model,
            )),
        })
    }
}

pub trait ProgressReporter: Send + Sync {
    fn stage(&self, stage: Stage);
}

/// Reports stage headlines through the log
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn stage(&self, stage: Stage) {
        info!("{}", stage.headline());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FactoryOutput {
    pub script: String,
    pub thumbnail: PathBuf,
    pub video: PathBuf,
    /// Narration length in seconds, which the video matches
    pub audio_duration: f64,
    pub frames: u64,
    pub used_fallback_footage: bool,
    pub thumbnail_generated: bool,
    pub overlay_applied: bool,
    pub subtitles_applied: bool,
}

pub struct Factory {
    config: Config,
    capabilities: Capabilities,
    progress: Box<dyn ProgressReporter>,
}

/// Attribute a failure to the stage it halted
trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T, E: Into<Error>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError::new(stage, e.into()))
    }
}

impl Factory {
    pub fn from_config(config: Config) -> Result<Self> {
        let capabilities = Capabilities::from_config(&config)?;
        Ok(Self::with_capabilities(config, capabilities))
    }

    pub fn with_capabilities(config: Config, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
            progress: Box::new(LogProgress),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub async fn run(&self, request: &Request) -> std::result::Result<FactoryOutput, StageError> {
        let topic = request.topic.trim();
        let mode = request.mode;

        self.progress.stage(Stage::Script);
        if topic.is_empty() {
            return Err(StageError::new(
                Stage::Script,
                Error::InvalidInput("topic is empty".to_string()),
            ));
        }
        fs::create_dir_all(&self.config.work_dir)
            .await
            .at(Stage::Script)?;
        let script = ScriptWriter::new(self.capabilities.text.as_ref())
            .write(topic, mode)
            .await;
        fs::write(self.config.artifact(SCRIPT_FILE), &script)
            .await
            .at(Stage::Script)?;

        self.progress.stage(Stage::Voice);
        let audio = voice::synthesize(
            self.capabilities.primary_voice.as_ref(),
            self.capabilities.fallback_voice.as_ref(),
            &script,
            &self.config.artifact(AUDIO_FILE),
        )
        .await
        .at(Stage::Voice)?;

        self.progress.stage(Stage::Footage);
        let footage = self.config.artifact(FOOTAGE_FILE);
        let used_fallback_footage = match self
            .capabilities
            .footage
            .fetch(topic, mode.orientation(), &footage)
            .await
        {
            Ok(()) => false,
            Err(e) => {
                warn!("Stock footage unavailable, using a plain clip: {e}");
                let dest = footage.clone();
                let preset = self.config.encoder_preset.clone();
                spawn_blocking(move || {
                    video::solid_color_clip(&dest, mode.video_size(), BLACK, FALLBACK_CLIP_SECS, &preset)
                })
                .await
                .at(Stage::Footage)?
                .at(Stage::Footage)?;
                true
            }
        };

        self.progress.stage(Stage::Thumbnail);
        let font = match text::load_font(self.config.font_path.as_deref()) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("{e}; titles and subtitles will be skipped");
                None
            }
        };
        let thumbnail = ThumbnailComposer::new(
            self.capabilities.images.as_ref(),
            &self.config.vibe_lexicon,
            font.as_ref(),
        )
        .compose(
            topic,
            request.vibe,
            mode.thumbnail_size(),
            &self.config.artifact(THUMBNAIL_FILE),
        )
        .await
        .at(Stage::Thumbnail)?;

        self.progress.stage(Stage::Assembly);
        let target = mode.video_size();
        let subtitle = font.as_ref().and_then(|font| {
            let path = self.config.artifact(SUBTITLE_FILE);
            match text::subtitle_layer(&script, target, font).save(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Could not write subtitle layer, continuing without it: {e}");
                    None
                }
            }
        });
        let subtitles_applied = subtitle.is_some();

        let output = self.config.artifact(VIDEO_FILE);
        let job = AssemblyJob {
            footage,
            audio,
            subtitle,
            output: output.clone(),
            target,
            grade: ColorGrade::for_vibe(request.vibe),
            preset: self.config.encoder_preset.clone(),
        };
        let report = spawn_blocking(move || video::assemble(&job))
            .await
            .at(Stage::Assembly)?
            .at(Stage::Assembly)?;
        info!(
            "Finished {} ({:.2}s, {} frames)",
            output.display(),
            report.video_duration,
            report.frames
        );

        Ok(FactoryOutput {
            script,
            thumbnail: thumbnail.path,
            video: output,
            audio_duration: report.audio_duration,
            frames: report.frames,
            used_fallback_footage,
            thumbnail_generated: thumbnail.generated,
            overlay_applied: thumbnail.overlay_applied,
            subtitles_applied,
        })
    }
}
