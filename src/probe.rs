use std::path::Path;
use std::sync::OnceLock;

use ffmpeg::{codec, format, media, rescale};
use ffmpeg_next::{self as ffmpeg};

use crate::error::{Error, Result};
use crate::style::Dimensions;

static INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

pub(crate) fn init() -> Result<()> {
    (*INIT.get_or_init(ffmpeg::init)).map_err(Error::from)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Container duration in seconds
    pub duration: f64,
    /// Duration of the best video stream, when the file has one
    pub video_duration: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

pub fn probe(path: &Path) -> Result<MediaInfo> {
    init()?;
    let input = format::input(&path)?;

    let mut video_duration = None;
    let mut dimensions = None;
    if let Some(stream) = input.streams().best(media::Type::Video) {
        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        dimensions = Some(Dimensions::new(decoder.width(), decoder.height()));
        if stream.duration() > 0 {
            video_duration = Some(stream.duration() as f64 * f64::from(stream.time_base()));
        }
    }

    let duration = if input.duration() > 0 {
        input.duration() as f64 * f64::from(rescale::TIME_BASE)
    } else {
        input
            .streams()
            .filter(|s| s.duration() > 0)
            .map(|s| s.duration() as f64 * f64::from(s.time_base()))
            .fold(0.0, f64::max)
    };
    if duration <= 0.0 {
        return Err(Error::Media(format!(
            "could not determine duration of {}",
            path.display()
        )));
    }

    Ok(MediaInfo {
        duration,
        video_duration,
        dimensions,
    })
}

/// Duration of an audio (or any media) file in seconds
pub fn duration(path: &Path) -> Result<f64> {
    probe(path).map(|info| info.duration)
}
