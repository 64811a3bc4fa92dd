//! Generated thumbnail with a bold outlined title

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fontdue::Font;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::http;
use crate::style::{Dimensions, Vibe, VibeLexicon};
use crate::text::{self, TextStyle};

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Raw encoded image bytes for `prompt`
    async fn generate(&self, prompt: &str, size: Dimensions) -> Result<Vec<u8>>;
}

pub struct PollinationsImage {
    http: reqwest::Client,
    base: String,
    model: String,
}

impl PollinationsImage {
    pub fn new(http: reqwest::Client, base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into(),
            model: model.into(),
        }
    }

    fn url(&self, prompt: &str) -> String {
        format!(
            "{}/prompt/{}",
            self.base.trim_end_matches('/'),
            urlencoding::encode(prompt)
        )
    }
}

#[async_trait]
impl ImageGenerator for PollinationsImage {
    async fn generate(&self, prompt: &str, size: Dimensions) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.url(prompt))
            .query(&[
                ("width", size.width.to_string()),
                ("height", size.height.to_string()),
                ("model", self.model.clone()),
                ("nologo", "true".to_string()),
            ])
            .send()
            .await?;
        let response = http::check_status("image generation", response)?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[must_use]
pub fn prompt(topic: &str, vibe: Vibe, lexicon: &VibeLexicon) -> String {
    format!(
        "youtube thumbnail for {topic}, {}, 8k resolution, highly detailed, expressive face",
        lexicon.phrase(vibe)
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailOutcome {
    pub path: PathBuf,
    /// False when the plain backdrop stood in for a generated image
    pub generated: bool,
    pub overlay_applied: bool,
}

pub struct ThumbnailComposer<'a> {
    images: &'a dyn ImageGenerator,
    lexicon: &'a VibeLexicon,
    font: Option<&'a Font>,
}

impl<'a> ThumbnailComposer<'a> {
    pub fn new(images: &'a dyn ImageGenerator, lexicon: &'a VibeLexicon, font: Option<&'a Font>) -> Self {
        Self {
            images,
            lexicon,
            font,
        }
    }

    /// Only writing the final file can fail; generation and overlay problems degrade.
    pub async fn compose(&self, topic: &str, vibe: Vibe, size: Dimensions, dest: &Path) -> Result<ThumbnailOutcome> {
        let prompt = prompt(topic, vibe, self.lexicon);
        let (mut canvas, generated) = match self.images.generate(&prompt, size).await {
            Ok(bytes) => match decode_to_fill(&bytes, size) {
                Ok(canvas) => (canvas, true),
                Err(e) => {
                    warn!("Generated thumbnail is not a usable image, using backdrop: {e}");
                    (backdrop(vibe, size), false)
                }
            },
            Err(e) => {
                warn!("Thumbnail generation failed, using backdrop: {e}");
                (backdrop(vibe, size), false)
            }
        };

        let overlay_applied = match self.font {
            Some(font) => {
                let lines = overlay_title(&mut canvas, topic, vibe, font);
                info!("Thumbnail title: {}", lines.join(" / "));
                true
            }
            None => {
                warn!("No font available, thumbnail saved without title");
                false
            }
        };

        DynamicImage::ImageRgba8(canvas).to_rgb8().save(dest)?;
        Ok(ThumbnailOutcome {
            path: dest.to_path_buf(),
            generated,
            overlay_applied,
        })
    }
}

/// Uppercased topic in the vibe's fill color, outlined in black
pub fn overlay_title(canvas: &mut RgbaImage, topic: &str, vibe: Vibe, font: &Font) -> Vec<String> {
    let style = TextStyle::title(vibe.text_color());
    text::draw_centered(canvas, &topic.to_uppercase(), font, &style)
}

fn decode_to_fill(bytes: &[u8], size: Dimensions) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)?;
    let image = if image.width() == size.width && image.height() == size.height {
        image
    } else {
        image.resize_to_fill(size.width, size.height, FilterType::Lanczos3)
    };
    Ok(image.to_rgba8())
}

fn backdrop(vibe: Vibe, size: Dimensions) -> RgbaImage {
    let [r, g, b] = vibe.backdrop();
    RgbaImage::from_pixel(size.width, size.height, Rgba([r, g, b, 255]))
}
