//! Output profiles (mode) and psychological styling presets (vibe)

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

/// Output aspect-ratio and narration-length profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Vertical, ~40 seconds
    #[default]
    Short,
    /// Horizontal, ~2 minutes
    Long,
}

impl Mode {
    /// Frame size of the final video
    #[must_use]
    pub fn video_size(&self) -> Dimensions {
        match self {
            Mode::Short => Dimensions::new(1080, 1920),
            Mode::Long => Dimensions::new(1920, 1080),
        }
    }

    /// Size of the generated thumbnail still
    #[must_use]
    pub fn thumbnail_size(&self) -> Dimensions {
        match self {
            Mode::Short => Dimensions::new(720, 1280),
            Mode::Long => Dimensions::new(1280, 720),
        }
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        match self {
            Mode::Short => Orientation::Portrait,
            Mode::Long => Orientation::Landscape,
        }
    }
}

/// Closed set of styling presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Vibe {
    /// Urgent/Scary: red text, extra contrast
    Urgent,
    /// Happy/Exciting: yellow text
    Happy,
    /// Mysterious/Deep
    Mysterious,
    /// Professional/Trust
    #[default]
    Professional,
}

impl Vibe {
    /// Title fill color on the thumbnail
    #[must_use]
    pub fn text_color(&self) -> [u8; 3] {
        match self {
            Vibe::Urgent => RED,
            Vibe::Happy => YELLOW,
            Vibe::Mysterious | Vibe::Professional => WHITE,
        }
    }

    /// Whether the video grade gets a contrast boost on top of the darken pass
    #[must_use]
    pub fn boosts_contrast(&self) -> bool {
        matches!(self, Vibe::Urgent)
    }

    /// Plain backdrop used when image generation is unavailable
    #[must_use]
    pub fn backdrop(&self) -> [u8; 3] {
        match self {
            Vibe::Urgent => [48, 0, 0],
            Vibe::Happy => [120, 60, 0],
            Vibe::Mysterious => [36, 8, 64],
            Vibe::Professional => [12, 36, 80],
        }
    }
}

pub const WHITE: [u8; 3] = [255, 255, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];
pub const RED: [u8; 3] = [255, 0, 0];
pub const YELLOW: [u8; 3] = [255, 255, 0];

/// Descriptive prompt phrase per vibe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VibeLexicon {
    pub urgent: String,
    pub happy: String,
    pub mysterious: String,
    pub professional: String,
}

impl Default for VibeLexicon {
    fn default() -> Self {
        Self {
            urgent: "high contrast red and black horror aesthetic glowing eyes".to_string(),
            happy: "bright yellow orange summer vibes euphoric high saturation".to_string(),
            mysterious: "deep purple neon blue cyberpunk fog matrix style".to_string(),
            professional: "clean white and blue corporate minimal high tech".to_string(),
        }
    }
}

impl VibeLexicon {
    #[must_use]
    pub fn phrase(&self, vibe: Vibe) -> &str {
        match vibe {
            Vibe::Urgent => &self.urgent,
            Vibe::Happy => &self.happy,
            Vibe::Mysterious => &self.mysterious,
            Vibe::Professional => &self.professional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_targets_are_fixed() {
        assert_eq!(Mode::Short.video_size(), Dimensions::new(1080, 1920));
        assert_eq!(Mode::Long.video_size(), Dimensions::new(1920, 1080));
        assert_eq!(Mode::Short.thumbnail_size(), Dimensions::new(720, 1280));
        assert_eq!(Mode::Long.thumbnail_size(), Dimensions::new(1280, 720));
        assert_eq!(Mode::Short.orientation().as_str(), "portrait");
        assert_eq!(Mode::Long.orientation().as_str(), "landscape");
    }

    #[test]
    fn text_color_follows_vibe() {
        assert_eq!(Vibe::Urgent.text_color(), RED);
        assert_eq!(Vibe::Happy.text_color(), YELLOW);
        assert_eq!(Vibe::Mysterious.text_color(), WHITE);
        assert_eq!(Vibe::Professional.text_color(), WHITE);
    }

    #[test]
    fn only_scary_vibe_boosts_contrast() {
        assert!(Vibe::Urgent.boosts_contrast());
        assert!(!Vibe::Happy.boosts_contrast());
        assert!(!Vibe::Professional.boosts_contrast());
    }

    #[test]
    fn lexicon_override_is_partial() {
        let lexicon: VibeLexicon = toml::from_str("happy = \"sunflowers\"").unwrap();
        assert_eq!(lexicon.phrase(Vibe::Happy), "sunflowers");
        assert_eq!(
            lexicon.phrase(Vibe::Professional),
            VibeLexicon::default().professional
        );
    }
}
