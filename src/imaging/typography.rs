//! Typography engine: a 16-bit straight-alpha canvas with text drawing.
//!
//! A [`TypographyHandle`] owns one canvas. Pixels are stored as RGBA
//! quanta in `0..=65535`, whatever the image was decoded from; the handle
//! remembers the decoded [`PixelLayout`] so that metadata reads and PNG
//! output report the same channel layout the geometry engine would.
//!
//! 8-bit sources are stored as `v * 257`, so an 8-bit image survives a
//! decode/encode cycle bit-exactly.
//!
//! ## Crate mapping
//!
//! | Primitive | Crate / function |
//! |---|---|
//! | Decode / encode | `png` (`Transformations::EXPAND`, 16-bit kept big-endian) |
//! | Advances, kerning, line metrics | `fontdue::Font` |
//! | Glyph outlines | `ttf_parser::Face::outline_glyph` into a `tiny_skia::PathBuilder` |
//! | Fill, stroke, rotation | `Mask::fill_path`, `Path::stroke`, `Transform::from_rotate_at` |
//! | Shadow softening | `image::imageops::fast_blur` |
//!
//! Coverage is rendered at 8 bits and blended into the 16-bit canvas here.

use super::backend::{Backend, EngineImage, EngineStats, ImagingError, NativeLease, Result};
use super::calculations::{gravity_origin, line_offset};
use super::fonts::LoadedFont;
use super::layout::{BitDepth, ColorModel, PixelLayout};
use super::params::{Color, Gravity, TextAlign};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{FillRule, LineJoin, Mask, PathBuilder, Transform};

const QUANTUM_MAX: f64 = 65535.0;

/// Owning handle to one canvas inside the typography engine.
#[derive(Debug)]
pub struct TypographyHandle {
    width: u32,
    height: u32,
    quanta: Vec<u16>,
    layout: PixelLayout,
    lease: NativeLease,
}

impl TypographyHandle {
    fn from_parts(
        stats: &Arc<EngineStats>,
        width: u32,
        height: u32,
        quanta: Vec<u16>,
        layout: PixelLayout,
    ) -> Self {
        Self {
            width,
            height,
            quanta,
            layout,
            lease: NativeLease::acquire(stats, Backend::Typography),
        }
    }

    /// Decode a PNG into a new canvas.
    pub fn load_buffer(stats: &Arc<EngineStats>, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ImagingError::LoadFailed("empty buffer".into()));
        }
        let load_failed =
            |e: png::DecodingError| ImagingError::LoadFailed(format!("PNG decode failed: {e}"));

        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(png::Transformations::EXPAND);
        let mut reader = decoder.read_info().map_err(load_failed)?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).map_err(load_failed)?;

        let model = match info.color_type {
            png::ColorType::Grayscale => ColorModel::Gray,
            png::ColorType::GrayscaleAlpha => ColorModel::GrayAlpha,
            png::ColorType::Rgb => ColorModel::Rgb,
            png::ColorType::Rgba => ColorModel::Rgba,
            png::ColorType::Indexed => {
                return Err(ImagingError::LoadFailed(
                    "indexed PNG was not expanded".into(),
                ));
            }
        };
        let (depth, sample_bytes) = match info.bit_depth {
            png::BitDepth::Sixteen => (BitDepth::Sixteen, 2),
            _ => (BitDepth::Eight, 1),
        };
        let layout = PixelLayout::new(model, depth);
        let (width, height) = (info.width, info.height);
        let channels = layout.channels() as usize;

        let mut quanta = allocate(width, height)?;
        let row_bytes = width as usize * channels * sample_bytes;
        for y in 0..height as usize {
            let row = &buf[y * info.line_size..y * info.line_size + row_bytes];
            for x in 0..width as usize {
                let px = &row[x * channels * sample_bytes..(x + 1) * channels * sample_bytes];
                let sample = |i: usize| match sample_bytes {
                    2 => u16::from_be_bytes([px[2 * i], px[2 * i + 1]]),
                    _ => px[i] as u16 * 257,
                };
                let rgba = match model {
                    ColorModel::Gray => [sample(0), sample(0), sample(0), u16::MAX],
                    ColorModel::GrayAlpha => [sample(0), sample(0), sample(0), sample(1)],
                    ColorModel::Rgb => [sample(0), sample(1), sample(2), u16::MAX],
                    ColorModel::Rgba => [sample(0), sample(1), sample(2), sample(3)],
                };
                let at = (y * width as usize + x) * 4;
                quanta[at..at + 4].copy_from_slice(&rgba);
            }
        }
        Ok(Self::from_parts(stats, width, height, quanta, layout))
    }

    /// Encode as PNG in the handle's own layout. `compression` is 0–9.
    pub fn encode_png(&self, compression: u8) -> Result<Vec<u8>> {
        let save_failed =
            |e: png::EncodingError| ImagingError::SaveFailed(format!("PNG encode failed: {e}"));

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(match self.layout.model {
                ColorModel::Gray => png::ColorType::Grayscale,
                ColorModel::GrayAlpha => png::ColorType::GrayscaleAlpha,
                ColorModel::Rgb => png::ColorType::Rgb,
                ColorModel::Rgba => png::ColorType::Rgba,
            });
            encoder.set_depth(match self.layout.depth {
                BitDepth::Eight => png::BitDepth::Eight,
                BitDepth::Sixteen => png::BitDepth::Sixteen,
            });
            encoder.set_compression(match compression {
                0..=3 => png::Compression::Fast,
                4..=6 => png::Compression::Default,
                _ => png::Compression::Best,
            });
            let mut writer = encoder.write_header().map_err(save_failed)?;
            writer
                .write_image_data(&self.interleaved())
                .map_err(save_failed)?;
            writer.finish().map_err(save_failed)?;
        }
        Ok(out)
    }

    /// Samples in the logical layout, big-endian for 16-bit.
    fn interleaved(&self) -> Vec<u8> {
        let picks: &[usize] = match self.layout.model {
            ColorModel::Gray => &[0],
            ColorModel::GrayAlpha => &[0, 3],
            ColorModel::Rgb => &[0, 1, 2],
            ColorModel::Rgba => &[0, 1, 2, 3],
        };
        let per_sample = match self.layout.depth {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
        };
        let mut out = Vec::with_capacity(self.quanta.len() / 4 * picks.len() * per_sample);
        for px in self.quanta.chunks_exact(4) {
            for &c in picks {
                match self.layout.depth {
                    BitDepth::Eight => out.push(((px[c] as u32 + 128) / 257) as u8),
                    BitDepth::Sixteen => out.extend_from_slice(&px[c].to_be_bytes()),
                }
            }
        }
        out
    }

    /// Write the canvas as a PNG file.
    pub fn save(&self, path: &Path, compression: u8) -> Result<()> {
        let bytes = self.encode_png(compression)?;
        std::fs::write(path, bytes).map_err(|e| {
            ImagingError::SaveFailed(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn lease(&self) -> &NativeLease {
        &self.lease
    }

    /// RGBA quanta of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u16; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u16; 4];
        px.copy_from_slice(&self.quanta[at..at + 4]);
        Some(px)
    }

    // =====================================================================
    // Text
    // =====================================================================

    /// Draw `text` in place.
    ///
    /// With [`Gravity::None`], (`x`, `y`) is the baseline origin of the first
    /// line and the rotation pivot. Otherwise the block is anchored by
    /// gravity, (`x`, `y`) pushes it inward and it rotates about its centre.
    /// Empty text is a no-op.
    pub fn annotate(
        &mut self,
        ctx: &DrawingContext,
        x: i64,
        y: i64,
        angle: f64,
        text: &str,
    ) -> Result<()> {
        if !angle.is_finite() {
            return Err(ImagingError::Typography(format!(
                "text angle must be finite, got {angle}"
            )));
        }
        if text.is_empty() {
            return Ok(());
        }
        let block = TextBlock::layout(ctx, text);
        let (block_w, block_h) = (block.width_px(), block.height_px());
        let (block_x, block_y, pivot) = match ctx.gravity {
            Gravity::None => {
                let top = y.saturating_sub(block.ascent_px() as i64);
                (x, top, (x, y))
            }
            gravity => {
                let canvas = (self.width, self.height);
                let (bx, by) = gravity_origin(gravity, canvas, (block_w, block_h), (x, y));
                let pivot = (
                    bx.saturating_add(block_w as i64 / 2),
                    by.saturating_add(block_h as i64 / 2),
                );
                (bx, by, pivot)
            }
        };
        let placement = Transform::from_translate(block_x as f32, block_y as f32).post_concat(
            Transform::from_rotate_at(angle as f32, pivot.0 as f32, pivot.1 as f32),
        );

        let Some(outline) = block.outline(ctx)? else {
            log::debug!("no visible glyphs in {text:?}");
            return Ok(());
        };
        let layers = Layers::render(ctx, &outline, placement, (self.width, self.height))?;

        let mut inks = vec![ctx.fill];
        if let (Some(shadow), Some(mask)) = (&ctx.shadow, &layers.shadow) {
            self.paint(mask, shadow.color);
            inks.push(shadow.color);
        }
        self.paint(&layers.fill, ctx.fill);
        if let (Some(stroke), Some(mask)) = (&ctx.stroke, &layers.stroke) {
            self.paint(mask, stroke.color);
            inks.push(stroke.color);
        }

        if self.layout.model.is_gray() && inks.iter().any(|c| c.a > 0 && !c.is_gray()) {
            self.layout.model = self.layout.model.to_color();
        }
        log::debug!(
            "annotated {} line(s) at ({x}, {y}) angle {angle} on {}x{}",
            block.lines.len(),
            self.width,
            self.height
        );
        Ok(())
    }

    /// Blend `color` through a canvas-sized coverage mask, straight alpha,
    /// source over.
    fn paint(&mut self, mask: &Mask, color: Color) {
        let ink = color.to_array().map(|v| v as f64 / 255.0);
        if ink[3] == 0.0 {
            return;
        }
        for (px, &coverage) in self.quanta.chunks_exact_mut(4).zip(mask.data()) {
            if coverage > 0 {
                blend_quantum(px, ink, coverage as f64 / 255.0);
            }
        }
    }
}

impl EngineImage for TypographyHandle {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn channels(&self) -> u8 {
        self.layout.channels()
    }

    fn has_alpha(&self) -> bool {
        self.layout.has_alpha()
    }
}

fn allocate(width: u32, height: u32) -> Result<Vec<u16>> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            ImagingError::AllocationFailed(format!("{width}x{height} canvas is too large"))
        })?;
    let mut quanta = Vec::new();
    quanta.try_reserve_exact(len).map_err(|e| {
        ImagingError::AllocationFailed(format!("{width}x{height} canvas: {e}"))
    })?;
    quanta.resize(len, 0);
    Ok(quanta)
}

fn blend_quantum(dst: &mut [u16], ink: [f64; 4], coverage: f64) {
    let sa = coverage * ink[3];
    let da = dst[3] as f64 / QUANTUM_MAX;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return;
    }
    for c in 0..3 {
        let d = dst[c] as f64 / QUANTUM_MAX;
        let v = (ink[c] * sa + d * da * (1.0 - sa)) / oa;
        dst[c] = (v.clamp(0.0, 1.0) * QUANTUM_MAX).round() as u16;
    }
    dst[3] = (oa.min(1.0) * QUANTUM_MAX).round() as u16;
}

// =========================================================================
// Drawing context
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub offset: (i32, i32),
    pub blur: u32,
}

/// Font and ink settings for one `annotate` call.
#[derive(Clone)]
pub struct DrawingContext {
    font: Arc<LoadedFont>,
    size: f32,
    kerning: f32,
    antialias: bool,
    gravity: Gravity,
    align: TextAlign,
    fill: Color,
    stroke: Option<Stroke>,
    shadow: Option<Shadow>,
}

impl std::fmt::Debug for DrawingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawingContext")
            .field("font", &self.font.name())
            .field("size", &self.size)
            .field("kerning", &self.kerning)
            .field("antialias", &self.antialias)
            .field("gravity", &self.gravity)
            .field("align", &self.align)
            .field("fill", &self.fill)
            .field("stroke", &self.stroke)
            .field("shadow", &self.shadow)
            .finish()
    }
}

impl DrawingContext {
    pub fn new(font: Arc<LoadedFont>, size: f32) -> Result<Self> {
        if !(size.is_finite() && size > 0.0) {
            return Err(ImagingError::Typography(format!(
                "font size must be positive, got {size}"
            )));
        }
        Ok(Self {
            font,
            size,
            kerning: 0.0,
            antialias: true,
            gravity: Gravity::None,
            align: TextAlign::Left,
            fill: Color::BLACK,
            stroke: None,
            shadow: None,
        })
    }

    /// Extra advance between glyphs, in pixels, on top of the font's kerning.
    pub fn with_kerning(mut self, kerning: f32) -> Self {
        self.kerning = kerning;
        self
    }

    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn with_gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_fill(mut self, fill: Color) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_stroke(mut self, stroke: Option<Stroke>) -> Self {
        self.stroke = stroke.filter(|s| s.width > 0.0 && s.color.a > 0);
        self
    }

    pub fn with_shadow(mut self, shadow: Option<Shadow>) -> Self {
        self.shadow = shadow.filter(|s| s.color.a > 0);
        self
    }

    pub fn size(&self) -> f32 {
        self.size
    }
}

// =========================================================================
// Layout and coverage masks
// =========================================================================

fn blank_mask(width: u32, height: u32) -> Result<Mask> {
    Mask::new(width, height).ok_or_else(|| {
        ImagingError::AllocationFailed(format!("{width}x{height} coverage mask"))
    })
}

/// Canvas-sized coverage for each ink, already placed and rotated.
struct Layers {
    fill: Mask,
    stroke: Option<Mask>,
    shadow: Option<Mask>,
}

impl Layers {
    fn render(
        ctx: &DrawingContext,
        outline: &tiny_skia::Path,
        placement: Transform,
        (width, height): (u32, u32),
    ) -> Result<Self> {
        let aa = ctx.antialias;
        let mut fill = blank_mask(width, height)?;
        fill.fill_path(outline, FillRule::Winding, aa, placement);

        // The stroke straddles the glyph edge: half outside, half inside.
        let stroked = match &ctx.stroke {
            Some(stroke) => {
                let style = tiny_skia::Stroke {
                    width: stroke.width,
                    line_join: LineJoin::Round,
                    ..tiny_skia::Stroke::default()
                };
                outline.stroke(&style, 1.0)
            }
            None => None,
        };
        let stroke = match &stroked {
            Some(path) => {
                let mut ring = blank_mask(width, height)?;
                ring.fill_path(path, FillRule::Winding, aa, placement);
                Some(ring)
            }
            None => None,
        };

        let shadow = match &ctx.shadow {
            Some(shadow) => {
                let (dx, dy) = shadow.offset;
                let shifted =
                    placement.post_concat(Transform::from_translate(dx as f32, dy as f32));
                let mut body = blank_mask(width, height)?;
                body.fill_path(outline, FillRule::Winding, aa, shifted);
                if let Some(path) = &stroked {
                    let mut ring = blank_mask(width, height)?;
                    ring.fill_path(path, FillRule::Winding, aa, shifted);
                    for (b, r) in body.data_mut().iter_mut().zip(ring.data()) {
                        *b = (*b).max(*r);
                    }
                }
                Some(soften(body, shadow.blur)?)
            }
            None => None,
        };

        Ok(Self {
            fill,
            stroke,
            shadow,
        })
    }
}

/// Gaussian-blur a mask with `radius` as sigma.
fn soften(mut mask: Mask, radius: u32) -> Result<Mask> {
    if radius == 0 {
        return Ok(mask);
    }
    let (width, height) = (mask.width(), mask.height());
    let gray = image::GrayImage::from_raw(width, height, mask.data().to_vec()).ok_or_else(|| {
        ImagingError::Typography(format!("{width}x{height} shadow mask has the wrong size"))
    })?;
    let blurred = image::imageops::fast_blur(&gray, radius as f32);
    mask.data_mut().copy_from_slice(blurred.as_raw());
    Ok(mask)
}

/// Receives font-unit outlines, y up, and emits pixel paths, y down.
struct GlyphPen {
    builder: PathBuilder,
    origin: (f32, f32),
    scale: f32,
}

impl GlyphPen {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin.0 + x * self.scale, self.origin.1 - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphPen {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

struct PlacedGlyph {
    character: char,
    x: f32,
}

struct Line {
    glyphs: Vec<PlacedGlyph>,
    width: f32,
}

struct TextBlock {
    lines: Vec<Line>,
    ascent: f32,
    descent: f32,
    line_height: f32,
    width: f32,
}

impl TextBlock {
    fn layout(ctx: &DrawingContext, text: &str) -> Self {
        let font = ctx.font.metrics();
        let (ascent, descent, line_height) = match font.horizontal_line_metrics(ctx.size) {
            Some(m) => (m.ascent, m.descent, m.new_line_size),
            None => (ctx.size * 0.8, -ctx.size * 0.2, ctx.size * 1.2),
        };

        let lines: Vec<Line> = text
            .split('\n')
            .map(|line| {
                let mut glyphs = Vec::new();
                let mut pen = 0.0f32;
                let mut prev: Option<char> = None;
                for character in line.chars().filter(|c| *c != '\r') {
                    if let Some(p) = prev {
                        pen += font.horizontal_kern(p, character, ctx.size).unwrap_or(0.0);
                        pen += ctx.kerning;
                    }
                    glyphs.push(PlacedGlyph { character, x: pen });
                    pen += font.metrics(character, ctx.size).advance_width;
                    prev = Some(character);
                }
                Line {
                    glyphs,
                    width: pen.max(0.0),
                }
            })
            .collect();
        let width = lines.iter().map(|l| l.width).fold(0.0, f32::max);
        Self {
            lines,
            ascent,
            descent,
            line_height,
            width,
        }
    }

    fn ascent_px(&self) -> u32 {
        self.ascent.ceil().max(0.0) as u32
    }

    fn width_px(&self) -> u32 {
        (self.width.ceil() as u32).max(1)
    }

    fn height_px(&self) -> u32 {
        let rows = self.lines.len().saturating_sub(1) as f32;
        let h = self.ascent_px() as f32 + (-self.descent).ceil().max(0.0) + rows * self.line_height;
        (h.ceil() as u32).max(1)
    }

    /// All glyph outlines of the block in block space, top-left at the
    /// origin. `None` when nothing would be inked.
    fn outline(&self, ctx: &DrawingContext) -> Result<Option<tiny_skia::Path>> {
        let face = ctx.font.face()?;
        let mut pen = GlyphPen {
            builder: PathBuilder::new(),
            origin: (0.0, 0.0),
            scale: ctx.size / face.units_per_em().max(1) as f32,
        };
        for (row, line) in self.lines.iter().enumerate() {
            let baseline = self.ascent_px() as f32 + row as f32 * self.line_height;
            let left = line_offset(ctx.align, self.width, line.width);
            for glyph in &line.glyphs {
                let Some(id) = face.glyph_index(glyph.character) else {
                    continue;
                };
                pen.origin = (left + glyph.x, baseline);
                face.outline_glyph(id, &mut pen);
            }
        }
        Ok(pen.builder.finish())
    }
}
