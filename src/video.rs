//! Video assembly: retimed, fill-cropped, graded footage with narration and a
//! burned-in caption layer, encoded at a fixed frame rate.

use std::path::{Path, PathBuf};

use ffmpeg::encoder;
use ffmpeg::util::frame::{audio::Audio, video::Video};
use ffmpeg_next::{
    self as ffmpeg, channel_layout, codec, decoder, filter, format, media, picture, Dictionary,
    Packet, Rational, Rescale,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::probe;
use crate::style::{Dimensions, Vibe};

pub const FPS: i32 = 24;
pub const FALLBACK_CLIP_SECS: f64 = 5.0;

const DARKEN: f32 = 0.8;
const CONTRAST_BOOST: f32 = 1.2;
const AUDIO_BIT_RATE: usize = 128_000;

fn frame_time_base() -> Rational {
    Rational(1, FPS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Retime {
    /// Footage is shorter than the narration and is played `passes` times
    Loop { passes: u32 },
    /// Footage is cut at the narration length
    Trim,
}

#[must_use]
pub fn plan_retime(footage_secs: f64, audio_secs: f64) -> Retime {
    if footage_secs > 0.0 && footage_secs < audio_secs {
        Retime::Loop {
            passes: (audio_secs / footage_secs).ceil() as u32,
        }
    } else {
        Retime::Trim
    }
}

/// Number of output frames covering `seconds` at [`FPS`]
#[must_use]
pub fn frame_count(seconds: f64) -> u64 {
    ((seconds * f64::from(FPS)).round() as u64).max(1)
}

/// Scale size and centered crop offset that fill `target` without letterboxing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillGeometry {
    pub scaled: Dimensions,
    pub crop_x: u32,
    pub crop_y: u32,
    pub target: Dimensions,
}

#[must_use]
pub fn fill_geometry(source: Dimensions, target: Dimensions) -> FillGeometry {
    if source.aspect() > target.aspect() {
        let width = (f64::from(source.width) * f64::from(target.height) / f64::from(source.height))
            .round() as u32;
        let width = width.max(target.width);
        FillGeometry {
            scaled: Dimensions::new(width, target.height),
            crop_x: (width - target.width) / 2,
            crop_y: 0,
            target,
        }
    } else {
        let height = (f64::from(source.height) * f64::from(target.width) / f64::from(source.width))
            .round() as u32;
        let height = height.max(target.height);
        FillGeometry {
            scaled: Dimensions::new(target.width, height),
            crop_x: 0,
            crop_y: (height - target.height) / 2,
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorGrade {
    /// Multiplier applied to every RGB channel
    pub brightness: f32,
    pub contrast: Option<f32>,
}

impl ColorGrade {
    #[must_use]
    pub fn for_vibe(vibe: Vibe) -> Self {
        Self {
            brightness: DARKEN,
            contrast: vibe.boosts_contrast().then_some(CONTRAST_BOOST),
        }
    }

    fn filters(&self) -> String {
        let b = self.brightness;
        let mut chain = format!("colorchannelmixer=rr={b}:gg={b}:bb={b}");
        if let Some(contrast) = self.contrast {
            chain.push_str(&format!(",eq=contrast={contrast}"));
        }
        chain
    }
}

/// Quote a path for use as a filter option inside a filter graph description
#[must_use]
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut option = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        if matches!(ch, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(ch);
    }
    format!("'{}'", option.replace('\'', "'\\''"))
}

#[must_use]
pub fn video_filter_spec(geometry: &FillGeometry, grade: &ColorGrade, subtitle: Option<&Path>) -> String {
    let chain = format!(
        "fps={FPS},scale={}:{}:flags=bicubic,crop={}:{}:{}:{},setsar=1,format=rgb24,{}",
        geometry.scaled.width,
        geometry.scaled.height,
        geometry.target.width,
        geometry.target.height,
        geometry.crop_x,
        geometry.crop_y,
        grade.filters()
    );
    match subtitle {
        Some(path) => format!(
            "movie={},format=rgba [sub]; [in] {chain} [base]; [base][sub] overlay=0:0:eof_action=repeat,format=yuv420p [out]",
            escape_filter_path(path)
        ),
        None => format!("[in] {chain},format=yuv420p [out]"),
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub footage: PathBuf,
    pub audio: PathBuf,
    /// Full-frame transparent caption image
    pub subtitle: Option<PathBuf>,
    pub output: PathBuf,
    pub target: Dimensions,
    pub grade: ColorGrade,
    pub preset: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyReport {
    pub audio_duration: f64,
    pub video_duration: f64,
    pub frames: u64,
    pub retime: Retime,
    pub passes: u32,
    pub dimensions: Dimensions,
}

/// Build the final video. On failure no output file is left behind.
pub fn assemble(job: &AssemblyJob) -> Result<AssemblyReport> {
    probe::init()?;
    let result = assemble_into(job);
    if result.is_err() {
        discard(&job.output);
    }
    result
}

fn assemble_into(job: &AssemblyJob) -> Result<AssemblyReport> {
    let audio_duration = probe::duration(&job.audio)?;
    let footage = probe::probe(&job.footage)?;
    let source = footage.dimensions.ok_or_else(|| {
        Error::Media(format!("{} has no video stream", job.footage.display()))
    })?;

    let frames = frame_count(audio_duration);
    let retime = plan_retime(footage.duration, audio_duration);
    let geometry = fill_geometry(source, job.target);
    let spec = video_filter_spec(&geometry, &job.grade, job.subtitle.as_deref());
    info!(
        "Assembling {} frames at {} ({:?}, footage {:.2}s, narration {:.2}s)",
        frames, job.target, retime, footage.duration, audio_duration
    );
    debug!("Video filter spec: {spec}");

    let mut audio_input = format::input(&job.audio)?;
    let mut output = format::output(&job.output)?;

    let (audio_stream_index, mut audio) = {
        let stream = audio_input
            .streams()
            .best(media::Type::Audio)
            .ok_or(ffmpeg::Error::StreamNotFound)?;
        (stream.index(), AudioTranscoder::new(&stream, &mut output, 0)?)
    };
    let video = VideoEncoder::new(&mut output, 1, job.target, &job.preset)?;

    output.write_header()?;
    let audio_time_base = stream_time_base(&output, 0)?;
    let video_time_base = stream_time_base(&output, 1)?;

    for (stream, packet) in audio_input.packets() {
        if stream.index() == audio_stream_index {
            audio.send_packet(&packet)?;
            audio.receive_decoded(&mut output, audio_time_base)?;
        }
    }
    audio.flush(&mut output, audio_time_base)?;

    let mut compositor = FrameCompositor::new(spec, video, frames);
    let mut offset = 0;
    let mut passes = 0;
    while !compositor.done() {
        let mut reader = FootageReader::open(&job.footage)?;
        let pass = reader.run_pass(&mut compositor, offset, &mut output, video_time_base)?;
        if pass.frames == 0 {
            return Err(Error::Media(format!(
                "{} has no decodable video frames",
                job.footage.display()
            )));
        }
        offset = pass.next_offset;
        passes += 1;
    }
    compositor.finish(&mut output, video_time_base)?;
    output.write_trailer()?;

    Ok(AssemblyReport {
        audio_duration,
        video_duration: frames as f64 / f64::from(FPS),
        frames,
        retime,
        passes,
        dimensions: job.target,
    })
}

/// Encode a plain clip of one color, used when no stock footage is available
pub fn solid_color_clip(dest: &Path, size: Dimensions, color: [u8; 3], seconds: f64, preset: &str) -> Result<()> {
    probe::init()?;
    let result = write_solid_clip(dest, size, color, seconds, preset);
    if result.is_err() {
        discard(dest);
    }
    result
}

fn write_solid_clip(dest: &Path, size: Dimensions, color: [u8; 3], seconds: f64, preset: &str) -> Result<()> {
    let mut output = format::output(&dest)?;
    let mut video = VideoEncoder::new(&mut output, 0, size, preset)?;
    output.write_header()?;
    let time_base = stream_time_base(&output, 0)?;

    let mut frame = Video::new(format::Pixel::YUV420P, size.width, size.height);
    let (y, u, v) = rgb_to_yuv(color);
    frame.data_mut(0).fill(y);
    frame.data_mut(1).fill(u);
    frame.data_mut(2).fill(v);

    for _ in 0..frame_count(seconds) {
        video.encode(&mut frame, &mut output, time_base)?;
    }
    video.finish(&mut output, time_base)?;
    output.write_trailer()?;
    debug!("Wrote {seconds}s solid clip to {}", dest.display());
    Ok(())
}

/// BT.601 limited-range conversion
#[must_use]
pub fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let y = 16.0 + 0.256_788 * r + 0.504_129 * g + 0.097_906 * b;
    let u = 128.0 - 0.148_223 * r - 0.290_993 * g + 0.439_216 * b;
    let v = 128.0 + 0.439_216 * r - 0.367_788 * g - 0.071_427 * b;
    let clamp = |x: f64| x.round().clamp(0.0, 255.0) as u8;
    (clamp(y), clamp(u), clamp(v))
}

fn stream_time_base(output: &format::context::Output, index: usize) -> Result<Rational> {
    Ok(output
        .stream(index)
        .ok_or(ffmpeg::Error::StreamNotFound)?
        .time_base())
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial output {}: {e}", path.display());
        }
    }
}

struct VideoEncoder {
    output_stream_index: usize,
    encoder: encoder::Video,
    next_pts: i64,
}

impl VideoEncoder {
    fn new(
        output: &mut format::context::Output,
        output_stream_index: usize,
        size: Dimensions,
        preset: &str,
    ) -> Result<Self> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let codec = encoder::find(codec::Id::H264).or_else(|| encoder::find(codec::Id::MPEG4));
        let mut output_stream = output.add_stream(codec)?;
        let mut encoder = codec::context::Context::new_with_codec(
            codec.ok_or_else(|| Error::Media("no H.264 or MPEG-4 encoder available".to_string()))?,
        )
        .encoder()
        .video()?;
        encoder.set_width(size.width);
        encoder.set_height(size.height);
        encoder.set_format(format::Pixel::YUV420P);
        encoder.set_frame_rate(Some(Rational(FPS, 1)));
        encoder.set_time_base(frame_time_base());
        output_stream.set_time_base(frame_time_base());

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", preset);

        let opened_encoder = encoder.open_with(opts)?;
        output_stream.set_parameters(&opened_encoder);

        Ok(Self {
            output_stream_index,
            encoder: opened_encoder,
            next_pts: 0,
        })
    }

    fn frames_encoded(&self) -> u64 {
        self.next_pts as u64
    }

    fn encode(
        &mut self,
        frame: &mut Video,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<()> {
        frame.set_pts(Some(self.next_pts));
        frame.set_kind(picture::Type::None);
        self.next_pts += 1;
        self.encoder.send_frame(frame)?;
        self.receive_and_write_packets(output, output_time_base)
    }

    fn finish(&mut self, output: &mut format::context::Output, output_time_base: Rational) -> Result<()> {
        self.encoder.send_eof()?;
        self.receive_and_write_packets(output, output_time_base)
    }

    fn receive_and_write_packets(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_stream_index);
            packet.set_duration(1);
            packet.rescale_ts(frame_time_base(), output_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

/// Filter graph plus encoder; stops accepting frames once the target count is met
struct FrameCompositor {
    spec: String,
    graph: Option<filter::Graph>,
    encoder: VideoEncoder,
    target_frames: u64,
}

impl FrameCompositor {
    fn new(spec: String, encoder: VideoEncoder, target_frames: u64) -> Self {
        Self {
            spec,
            graph: None,
            encoder,
            target_frames,
        }
    }

    fn done(&self) -> bool {
        self.encoder.frames_encoded() >= self.target_frames
    }

    /// Returns true once enough frames have been encoded
    fn push(
        &mut self,
        frame: &Video,
        time_base: Rational,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<bool> {
        if self.graph.is_none() {
            self.graph = Some(video_graph(&self.spec, frame, time_base)?);
        }
        let Some(graph) = self.graph.as_mut() else {
            return Err(Error::Media("video filter graph unavailable".to_string()));
        };

        graph
            .get("in")
            .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
            .source()
            .add(frame)?;

        let mut filtered = Video::empty();
        while graph
            .get("out")
            .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
            .sink()
            .frame(&mut filtered)
            .is_ok()
        {
            if self.encoder.frames_encoded() >= self.target_frames {
                break;
            }
            self.encoder.encode(&mut filtered, output, output_time_base)?;
        }
        Ok(self.done())
    }

    fn finish(&mut self, output: &mut format::context::Output, output_time_base: Rational) -> Result<()> {
        self.encoder.finish(output, output_time_base)
    }
}

fn video_graph(spec: &str, first: &Video, time_base: Rational) -> Result<filter::Graph> {
    let mut filter_graph = filter::Graph::new();

    let pix_fmt = first
        .format()
        .descriptor()
        .ok_or_else(|| Error::Media("footage has an unknown pixel format".to_string()))?
        .name();
    let aspect = first.aspect_ratio();
    let aspect = if aspect.numerator() > 0 && aspect.denominator() > 0 {
        aspect
    } else {
        Rational(1, 1)
    };
    let args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}",
        first.width(),
        first.height(),
        pix_fmt,
        time_base,
        aspect
    );

    filter_graph.add(
        &filter::find("buffer").ok_or_else(|| Error::Media("Failed to find filter".to_string()))?,
        "in",
        &args,
    )?;
    filter_graph.add(
        &filter::find("buffersink").ok_or_else(|| Error::Media("Failed to find filter".to_string()))?,
        "out",
        "",
    )?;

    filter_graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
    filter_graph.validate()?;
    debug!("Video filter graph: {}", filter_graph.dump());

    Ok(filter_graph)
}

struct PassSummary {
    frames: u64,
    next_offset: i64,
}

/// One decoding pass over the footage file
struct FootageReader {
    input: format::context::Input,
    stream_index: usize,
    decoder: decoder::Video,
    time_base: Rational,
    frame_step: i64,
}

impl FootageReader {
    fn open(path: &Path) -> Result<Self> {
        let input = format::input(&path)?;
        let (stream_index, time_base, rate, parameters) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            (
                stream.index(),
                stream.time_base(),
                stream.avg_frame_rate(),
                stream.parameters(),
            )
        };
        let decoder = codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;
        let rate = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate
        } else {
            Rational(FPS, 1)
        };
        let frame_step = 1_i64.rescale(rate.invert(), time_base).max(1);

        Ok(Self {
            input,
            stream_index,
            decoder,
            time_base,
            frame_step,
        })
    }

    /// Feed every frame to `compositor`, shifting timestamps by `offset`
    fn run_pass(
        &mut self,
        compositor: &mut FrameCompositor,
        offset: i64,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<PassSummary> {
        let Self {
            input,
            stream_index,
            decoder,
            time_base,
            frame_step,
        } = self;
        let mut pass = PassState {
            offset,
            first_ts: None,
            time_base: *time_base,
            frame_step: *frame_step,
            summary: PassSummary {
                frames: 0,
                next_offset: offset,
            },
        };

        for (stream, packet) in input.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            if pass.drain(decoder, compositor, output, output_time_base)? {
                return Ok(pass.summary);
            }
        }
        decoder.send_eof()?;
        pass.drain(decoder, compositor, output, output_time_base)?;
        Ok(pass.summary)
    }
}

struct PassState {
    offset: i64,
    first_ts: Option<i64>,
    time_base: Rational,
    frame_step: i64,
    summary: PassSummary,
}

impl PassState {
    fn drain(
        &mut self,
        decoder: &mut decoder::Video,
        compositor: &mut FrameCompositor,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<bool> {
        let mut frame = Video::empty();
        while decoder.receive_frame(&mut frame).is_ok() {
            let ts = frame
                .timestamp()
                .unwrap_or(self.summary.frames as i64 * self.frame_step);
            let first = *self.first_ts.get_or_insert(ts);
            let pts = self.offset + (ts - first).max(0);
            frame.set_pts(Some(pts));
            self.summary.frames += 1;
            self.summary.next_offset = self.summary.next_offset.max(pts + self.frame_step);
            if compositor.push(&frame, self.time_base, output, output_time_base)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

struct AudioTranscoder {
    output_stream_index: usize,
    decoder: decoder::Audio,
    encoder: encoder::Audio,
    filter_graph: filter::Graph,
    sample_rate: i32,
    samples_written: i64,
}

impl AudioTranscoder {
    fn new(
        input_stream: &format::stream::Stream,
        output: &mut format::context::Output,
        output_stream_index: usize,
    ) -> Result<Self> {
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);
        let codec_params = input_stream.parameters();
        let mut decoder = codec::context::Context::from_parameters(codec_params)?
            .decoder()
            .audio()?;

        if global_header {
            decoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let codec = encoder::find(codec::Id::AAC)
            .ok_or(ffmpeg::Error::EncoderNotFound)?
            .audio()?;
        let mut output_stream = output.add_stream(codec)?;
        let context = codec::context::Context::from_parameters(output_stream.parameters())?;
        let mut encoder = context.encoder().audio()?;

        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let input_layout = input_layout(&decoder);
        let channel_layout = codec
            .channel_layouts()
            .map(|layouts| layouts.best(input_layout.channels()))
            .unwrap_or(channel_layout::ChannelLayout::STEREO);

        let sample_rate = decoder.rate() as i32;
        encoder.set_channel_layout(channel_layout);
        encoder.set_rate(sample_rate);
        encoder.set_format(
            codec
                .formats()
                .ok_or_else(|| Error::Media("Unknown supported formats".to_string()))?
                .next()
                .ok_or_else(|| Error::Media("Failed to get sample format".to_string()))?,
        );
        encoder.set_bit_rate(AUDIO_BIT_RATE);
        encoder.set_time_base(Rational(1, sample_rate));
        output_stream.set_time_base(Rational(1, sample_rate));

        let opened_encoder = encoder.open_as(codec)?;
        output_stream.set_parameters(&opened_encoder);

        let filter_graph = Self::filter_graph(
            "anull",
            &decoder,
            input_layout,
            input_stream.time_base(),
            &opened_encoder,
        )?;

        Ok(Self {
            output_stream_index,
            decoder,
            encoder: opened_encoder,
            filter_graph,
            sample_rate,
            samples_written: 0,
        })
    }

    fn filter_graph(
        spec: &str,
        decoder: &codec::decoder::Audio,
        layout: channel_layout::ChannelLayout,
        time_base: Rational,
        encoder: &codec::encoder::Audio,
    ) -> Result<filter::Graph> {
        let mut filter_graph = filter::Graph::new();

        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            time_base,
            decoder.rate(),
            decoder.format().name(),
            layout.bits()
        );

        filter_graph.add(
            &filter::find("abuffer").ok_or_else(|| Error::Media("Failed to find filter".to_string()))?,
            "in",
            &args,
        )?;
        filter_graph.add(
            &filter::find("abuffersink").ok_or_else(|| Error::Media("Failed to find filter".to_string()))?,
            "out",
            "",
        )?;

        {
            let mut out = filter_graph
                .get("out")
                .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?;
            out.set_sample_format(encoder.format());
            out.set_channel_layout(encoder.channel_layout());
            out.set_sample_rate(encoder.rate());
        }

        filter_graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
        filter_graph.validate()?;
        debug!("Audio filter graph: {}", filter_graph.dump());

        if let Some(codec) = encoder.codec() {
            if !codec
                .capabilities()
                .contains(ffmpeg::codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE)
            {
                filter_graph
                    .get("out")
                    .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
                    .sink()
                    .set_frame_size(encoder.frame_size());
            }
        }

        Ok(filter_graph)
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn receive_decoded(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<()> {
        let mut frame = Audio::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            let timestamp = frame.timestamp();
            frame.set_pts(timestamp);
            self.filter_graph
                .get("in")
                .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
                .source()
                .add(&frame)?;
            self.receive_filtered(output, output_time_base)?;
        }
        Ok(())
    }

    /// Encoder timestamps count samples, so gaps or odd input timestamps never leak through
    fn receive_filtered(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<()> {
        let mut frame = Audio::empty();
        while self
            .filter_graph
            .get("out")
            .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
            .sink()
            .frame(&mut frame)
            .is_ok()
        {
            frame.set_pts(Some(self.samples_written));
            self.samples_written += frame.samples() as i64;
            self.encoder.send_frame(&frame)?;
            self.receive_and_write_packets(output, output_time_base)?;
        }
        Ok(())
    }

    fn flush(&mut self, output: &mut format::context::Output, output_time_base: Rational) -> Result<()> {
        self.decoder.send_eof()?;
        self.receive_decoded(output, output_time_base)?;
        self.filter_graph
            .get("in")
            .ok_or_else(|| Error::Media("Failed to get filter".to_string()))?
            .source()
            .flush()?;
        self.receive_filtered(output, output_time_base)?;
        self.encoder.send_eof()?;
        self.receive_and_write_packets(output, output_time_base)
    }

    fn receive_and_write_packets(
        &mut self,
        output: &mut format::context::Output,
        output_time_base: Rational,
    ) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.output_stream_index);
            packet.rescale_ts(Rational(1, self.sample_rate), output_time_base);
            packet.write_interleaved(output)?;
        }
        Ok(())
    }
}

fn input_layout(decoder: &decoder::Audio) -> channel_layout::ChannelLayout {
    let layout = decoder.channel_layout();
    if layout.is_empty() {
        channel_layout::ChannelLayout::default(i32::from(decoder.channels()))
    } else {
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-bit mono PCM tone, enough for the decoder and for duration probing
    fn write_wav(path: &Path, seconds: f64) {
        let rate = 22_050_u32;
        let samples = (seconds * f64::from(rate)) as u32;
        let data_len = samples * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2_u16.to_le_bytes());
        bytes.extend_from_slice(&16_u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            let t = f64::from(i) / f64::from(rate);
            let value = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn shorter_footage_loops() {
        assert_eq!(plan_retime(5.0, 12.0), Retime::Loop { passes: 3 });
        assert_eq!(plan_retime(5.0, 10.0), Retime::Loop { passes: 2 });
    }

    #[test]
    fn longer_or_equal_footage_trims() {
        assert_eq!(plan_retime(30.0, 12.0), Retime::Trim);
        assert_eq!(plan_retime(12.0, 12.0), Retime::Trim);
    }

    #[test]
    fn frame_count_rounds_to_nearest_frame() {
        assert_eq!(frame_count(40.0), 960);
        assert_eq!(frame_count(1.52), 36);
        assert_eq!(frame_count(0.0), 1);
    }

    #[test]
    fn wide_source_into_portrait_crops_width() {
        let g = fill_geometry(Dimensions::new(1920, 1080), Dimensions::new(1080, 1920));
        assert_eq!(g.scaled, Dimensions::new(3413, 1920));
        assert_eq!((g.crop_x, g.crop_y), (1166, 0));
    }

    #[test]
    fn tall_source_into_landscape_crops_height() {
        let g = fill_geometry(Dimensions::new(1080, 1920), Dimensions::new(1920, 1080));
        assert_eq!(g.scaled, Dimensions::new(1920, 3413));
        assert_eq!((g.crop_x, g.crop_y), (0, 1166));
    }

    #[test]
    fn matching_aspect_needs_no_crop() {
        let g = fill_geometry(Dimensions::new(640, 360), Dimensions::new(1920, 1080));
        assert_eq!(g.scaled, Dimensions::new(1920, 1080));
        assert_eq!((g.crop_x, g.crop_y), (0, 0));
    }

    #[test]
    fn grade_only_boosts_contrast_for_scary_vibe() {
        assert_eq!(
            ColorGrade::for_vibe(Vibe::Professional).filters(),
            "colorchannelmixer=rr=0.8:gg=0.8:bb=0.8"
        );
        assert_eq!(
            ColorGrade::for_vibe(Vibe::Urgent).filters(),
            "colorchannelmixer=rr=0.8:gg=0.8:bb=0.8,eq=contrast=1.2"
        );
    }

    #[test]
    fn filter_paths_are_escaped() {
        assert_eq!(escape_filter_path(Path::new("/tmp/run 1/sub.png")), "'/tmp/run 1/sub.png'");
        assert_eq!(escape_filter_path(Path::new(r"C:\w\s.png")), r"'C\:\\w\\s.png'");
        assert_eq!(escape_filter_path(Path::new("it's.png")), r"'it\'\''s.png'");
    }

    #[test]
    fn filter_spec_overlays_subtitle_when_present() {
        let geometry = fill_geometry(Dimensions::new(1280, 720), Dimensions::new(1080, 1920));
        let grade = ColorGrade::for_vibe(Vibe::Happy);
        let with = video_filter_spec(&geometry, &grade, Some(Path::new("/w/subtitle.png")));
        assert!(with.starts_with("movie='/w/subtitle.png',format=rgba [sub]; [in] fps=24,"));
        assert!(with.contains("crop=1080:1920:1166:0"));
        assert!(with.ends_with("overlay=0:0:eof_action=repeat,format=yuv420p [out]"));

        let without = video_filter_spec(&geometry, &grade, None);
        assert!(without.starts_with("[in] fps=24,"));
        assert!(!without.contains("movie="));
    }

    #[test]
    fn black_maps_to_limited_range() {
        assert_eq!(rgb_to_yuv([0, 0, 0]), (16, 128, 128));
        assert_eq!(rgb_to_yuv([255, 255, 255]), (235, 128, 128));
    }

    #[test]
    fn solid_clip_has_requested_size_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("bg.mp4");
        solid_color_clip(&clip, Dimensions::new(160, 90), [0, 0, 0], 2.0, "ultrafast").unwrap();

        let info = probe::probe(&clip).unwrap();
        assert_eq!(info.dimensions, Some(Dimensions::new(160, 90)));
        let video = info.video_duration.unwrap();
        assert!((video - 2.0).abs() <= 1.0 / 24.0 + 1e-3, "duration {video}");
    }

    fn job(dir: &Path, footage: PathBuf, audio: PathBuf, target: Dimensions) -> AssemblyJob {
        AssemblyJob {
            footage,
            audio,
            subtitle: None,
            output: dir.join("final.mp4"),
            target,
            grade: ColorGrade::for_vibe(Vibe::Urgent),
            preset: "ultrafast".to_string(),
        }
    }

    #[test]
    fn short_footage_is_looped_to_audio_length() {
        let dir = tempfile::tempdir().unwrap();
        let footage = dir.path().join("bg.mp4");
        let audio = dir.path().join("audio.wav");
        solid_color_clip(&footage, Dimensions::new(160, 90), [20, 40, 60], 1.0, "ultrafast").unwrap();
        write_wav(&audio, 2.5);

        let target = Dimensions::new(180, 320);
        let report = assemble(&job(dir.path(), footage, audio, target)).unwrap();
        assert_eq!(report.retime, Retime::Loop { passes: 3 });
        assert_eq!(report.frames, 60);
        assert!(report.passes >= 3);

        let info = probe::probe(&dir.path().join("final.mp4")).unwrap();
        assert_eq!(info.dimensions, Some(target));
        let video = info.video_duration.unwrap();
        assert!((video - 2.5).abs() <= 1.0 / 24.0 + 1e-3, "duration {video}");
    }

    #[test]
    fn long_footage_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let footage = dir.path().join("bg.mp4");
        let audio = dir.path().join("audio.wav");
        solid_color_clip(&footage, Dimensions::new(90, 160), [0, 0, 0], 3.0, "ultrafast").unwrap();
        write_wav(&audio, 1.0);

        let target = Dimensions::new(320, 180);
        let report = assemble(&job(dir.path(), footage, audio, target)).unwrap();
        assert_eq!(report.retime, Retime::Trim);
        assert_eq!(report.frames, 24);
        assert_eq!(report.passes, 1);

        let info = probe::probe(&dir.path().join("final.mp4")).unwrap();
        assert_eq!(info.dimensions, Some(target));
    }

    #[test]
    fn failed_assembly_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 1.0);
        let bogus = dir.path().join("bg.mp4");
        std::fs::write(&bogus, b"not a video").unwrap();

        let job = job(dir.path(), bogus, audio, Dimensions::new(320, 180));
        assert!(assemble(&job).is_err());
        assert!(!job.output.exists());
    }
}
