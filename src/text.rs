//! Word-wrapped, outlined, centered text rasterized onto RGBA images

use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::style::{Dimensions, BLACK, WHITE};

/// Bold fonts tried when no font is configured or the configured one fails
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// DejaVu Sans Bold, used when neither a configured nor a system font loads
const BUILTIN_FONT: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

/// Extra pixels between lines
const LINE_SPACING: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Characters per line
    pub wrap_width: usize,
    /// Font size as a fraction of the canvas width
    pub size_ratio: f32,
    pub fill: [u8; 3],
    pub stroke: [u8; 3],
    pub stroke_width: u32,
}

impl TextStyle {
    /// Thumbnail title: 12 chars per line, 12% of width, 8px outline
    #[must_use]
    pub fn title(fill: [u8; 3]) -> Self {
        Self {
            wrap_width: 12,
            size_ratio: 0.12,
            fill,
            stroke: BLACK,
            stroke_width: 8,
        }
    }

    /// Burned-in caption: 20 chars per line, 8% of width, 4px outline
    #[must_use]
    pub fn subtitle() -> Self {
        Self {
            wrap_width: 20,
            size_ratio: 0.08,
            fill: WHITE,
            stroke: BLACK,
            stroke_width: 4,
        }
    }
}

/// Greedy word wrap. Words longer than `width` are broken into pieces.
#[must_use]
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(width) {
            let piece: String = piece.iter().collect();
            let piece_len = piece.chars().count();
            if current_len > 0 && current_len + 1 + piece_len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Load `preferred` if given and usable, else the first readable well-known
/// system font, else the bundled default
pub fn load_font(preferred: Option<&Path>) -> Result<Font> {
    if let Some(path) = preferred {
        match font_from_file(path) {
            Ok(font) => return Ok(font),
            Err(e) => warn!("Configured font unusable, trying defaults: {e}"),
        }
    }
    match FALLBACK_FONTS
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.is_file())
        .find_map(|path| font_from_file(&path).ok())
    {
        Some(font) => Ok(font),
        None => {
            debug!("No system bold font found, using the bundled one");
            builtin_font()
        }
    }
}

/// The font compiled into the binary
pub fn builtin_font() -> Result<Font> {
    Font::from_bytes(BUILTIN_FONT, FontSettings::default())
        .map_err(|e| Error::Font(format!("bundled font is unreadable: {e}")))
}

fn font_from_file(path: &Path) -> Result<Font> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Font(format!("failed to read {}: {e}", path.display())))?;
    let font = Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| Error::Font(format!("failed to parse {}: {e}", path.display())))?;
    debug!("Using font {}", path.display());
    Ok(font)
}

/// Draw `text` centered on `canvas`, each line centered, outlined by the stroke.
/// Returns the wrapped lines that were drawn.
pub fn draw_centered(canvas: &mut RgbaImage, text: &str, font: &Font, style: &TextStyle) -> Vec<String> {
    let lines = wrap(text, style.wrap_width);
    if lines.is_empty() {
        return lines;
    }
    let (width, height) = canvas.dimensions();
    let px = (width as f32 * style.size_ratio).max(1.0);

    let (ascent, descent, advance) = match font.horizontal_line_metrics(px) {
        Some(m) => (m.ascent, m.descent, m.new_line_size + LINE_SPACING),
        None => (px * 0.8, -px * 0.2, px + LINE_SPACING),
    };
    let block_height = (ascent - descent) + advance * (lines.len() - 1) as f32;
    let top = height as f32 / 2.0 - block_height / 2.0;

    let mut mask = Coverage::new(width, height);
    for (i, line) in lines.iter().enumerate() {
        let baseline = top + ascent + advance * i as f32;
        let line_width = measure(font, line, px);
        let mut pen_x = width as f32 / 2.0 - line_width / 2.0;
        let mut previous = None;
        for ch in line.chars() {
            if let Some(prev) = previous {
                pen_x += font.horizontal_kern(prev, ch, px).unwrap_or(0.0);
            }
            let (metrics, bitmap) = font.rasterize(ch, px);
            let x0 = (pen_x + metrics.xmin as f32).round() as i64;
            let y0 = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i64;
            mask.stamp(x0, y0, metrics.width, metrics.height, &bitmap);
            pen_x += metrics.advance_width;
            previous = Some(ch);
        }
    }

    let outline = mask.dilate(style.stroke_width);
    mask.composite(canvas, &outline, style);
    lines
}

/// Full-frame transparent layer with the script drawn in the subtitle style
#[must_use]
pub fn subtitle_layer(text: &str, size: Dimensions, font: &Font) -> RgbaImage {
    let mut layer = RgbaImage::from_pixel(size.width, size.height, Rgba([0, 0, 0, 0]));
    draw_centered(&mut layer, text, font, &TextStyle::subtitle());
    layer
}

fn measure(font: &Font, line: &str, px: f32) -> f32 {
    let mut total = 0.0;
    let mut previous = None;
    for ch in line.chars() {
        if let Some(prev) = previous {
            total += font.horizontal_kern(prev, ch, px).unwrap_or(0.0);
        }
        total += font.metrics(ch, px).advance_width;
        previous = Some(ch);
    }
    total
}

/// Per-pixel glyph coverage in [0, 1], with the bounding box of what was drawn
struct Coverage {
    width: u32,
    height: u32,
    alpha: Vec<f32>,
    bounds: Option<(u32, u32, u32, u32)>,
}

impl Coverage {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![0.0; (width as usize) * (height as usize)],
            bounds: None,
        }
    }

    fn stamp(&mut self, x0: i64, y0: i64, w: usize, h: usize, bitmap: &[u8]) {
        for gy in 0..h {
            let y = y0 + gy as i64;
            if y < 0 || y >= i64::from(self.height) {
                continue;
            }
            for gx in 0..w {
                let x = x0 + gx as i64;
                if x < 0 || x >= i64::from(self.width) {
                    continue;
                }
                let value = f32::from(bitmap[gy * w + gx]) / 255.0;
                if value <= 0.0 {
                    continue;
                }
                let (x, y) = (x as u32, y as u32);
                let idx = self.index(x, y);
                self.alpha[idx] = self.alpha[idx].max(value);
                self.grow(x, y);
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn grow(&mut self, x: u32, y: u32) {
        self.bounds = Some(match self.bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    /// Bounding box widened by `radius`, clamped to the canvas
    fn region(&self, radius: u32) -> Option<(u32, u32, u32, u32)> {
        self.bounds.map(|(x0, y0, x1, y1)| {
            (
                x0.saturating_sub(radius),
                y0.saturating_sub(radius),
                (x1 + radius).min(self.width - 1),
                (y1 + radius).min(self.height - 1),
            )
        })
    }

    /// Max filter over a disk of `radius`; this is the stroke coverage
    fn dilate(&self, radius: u32) -> Vec<f32> {
        let mut out = self.alpha.clone();
        let Some((rx0, ry0, rx1, ry1)) = self.region(radius) else {
            return out;
        };
        let r = radius as i64;
        let offsets: Vec<(i64, i64)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
            .collect();

        for y in ry0..=ry1 {
            for x in rx0..=rx1 {
                let mut best = 0.0f32;
                for (dx, dy) in &offsets {
                    let sx = i64::from(x) + dx;
                    let sy = i64::from(y) + dy;
                    if sx < 0 || sy < 0 || sx >= i64::from(self.width) || sy >= i64::from(self.height) {
                        continue;
                    }
                    best = best.max(self.alpha[self.index(sx as u32, sy as u32)]);
                    if best >= 1.0 {
                        break;
                    }
                }
                let idx = self.index(x, y);
                out[idx] = best;
            }
        }
        out
    }

    fn composite(&self, canvas: &mut RgbaImage, outline: &[f32], style: &TextStyle) {
        let Some((rx0, ry0, rx1, ry1)) = self.region(style.stroke_width) else {
            return;
        };
        for y in ry0..=ry1 {
            for x in rx0..=rx1 {
                let idx = self.index(x, y);
                let pixel = canvas.get_pixel_mut(x, y);
                blend(pixel, style.stroke, outline[idx]);
                blend(pixel, style.fill, self.alpha[idx]);
            }
        }
    }
}

/// Source-over of an opaque color with coverage `alpha`
fn blend(dst: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let src_a = alpha.min(1.0);
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for c in 0..3 {
        let src = f32::from(color[c]) / 255.0;
        let under = f32::from(dst[c]) / 255.0;
        let value = (src * src_a + under * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_topic_at_twelve() {
        let lines = wrap("PSYCHOLOGY OF MONEY", 12);
        assert_eq!(lines, vec!["PSYCHOLOGY", "OF MONEY"]);
    }

    #[test]
    fn forty_chars_give_at_least_three_lines() {
        let topic = "THE HIDDEN HISTORY OF ANCIENT ROME TODAY";
        assert_eq!(topic.chars().count(), 40);
        let lines = wrap(topic, 12);
        assert!(lines.len() >= 3, "{lines:?}");
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
    }

    #[test]
    fn long_words_are_broken() {
        assert_eq!(wrap("SUPERCALIFRAGILISTIC", 8), vec!["SUPERCAL", "IFRAGILI", "STIC"]);
        assert!(wrap("   ", 5).is_empty());
    }

    #[test]
    fn blend_onto_transparent_takes_source_color() {
        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, [255, 255, 255], 1.0);
        assert_eq!(px, Rgba([255, 255, 255, 255]));

        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, [255, 0, 0], 0.5);
        assert_eq!(px[0], 255);
        assert_eq!(px[3], 128);
    }

    #[test]
    fn blend_over_opaque_mixes() {
        let mut px = Rgba([0, 0, 0, 255]);
        blend(&mut px, [200, 100, 0], 0.5);
        assert_eq!(px, Rgba([100, 50, 0, 255]));
    }

    #[test]
    fn dilate_spreads_coverage_by_radius() {
        let mut mask = Coverage::new(11, 11);
        mask.stamp(5, 5, 1, 1, &[255]);
        let out = mask.dilate(2);
        assert_eq!(out[mask.index(5, 5)], 1.0);
        assert_eq!(out[mask.index(7, 5)], 1.0);
        assert_eq!(out[mask.index(5, 3)], 1.0);
        assert_eq!(out[mask.index(7, 7)], 0.0);
        assert_eq!(out[mask.index(8, 5)], 0.0);
    }

    #[test]
    fn missing_preferred_font_falls_back() {
        let font = load_font(Some(Path::new("/nonexistent/font.ttf"))).unwrap();
        assert!(font.lookup_glyph_index('M') != 0);
    }

    #[test]
    fn bundled_font_covers_title_characters() {
        let font = builtin_font().unwrap();
        for ch in "PSYCHOLOGY OF MONEY".chars().filter(|c| !c.is_whitespace()) {
            assert!(font.lookup_glyph_index(ch) != 0, "no glyph for {ch}");
        }
    }

    #[test]
    fn draws_stroke_and_fill() {
        let font = builtin_font().unwrap();
        let mut canvas = RgbaImage::from_pixel(360, 640, Rgba([0, 0, 255, 255]));
        let lines = draw_centered(&mut canvas, "PSYCHOLOGY OF MONEY", &font, &TextStyle::title(WHITE));
        assert_eq!(lines, vec!["PSYCHOLOGY", "OF MONEY"]);
        assert!(canvas.pixels().any(|p| *p == Rgba([255, 255, 255, 255])));
        assert!(canvas.pixels().any(|p| *p == Rgba([0, 0, 0, 255])));
        // corners stay untouched
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    }
}
