//! Geometry/format engine: the `image` crate behind an owning handle.
//!
//! A [`GeometryHandle`] is the sole owner of one decoded `DynamicImage`.
//! Every primitive reads `self` and returns a *new* handle; nothing here
//! mutates an existing image. Results take their own [`NativeLease`] from
//! the same engine context as their source.
//!
//! ## Crate mapping
//!
//! | Primitive | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with content sniffing |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` |
//! | Crop / rot / flip | `crop_imm`, `rotate90/180/270`, `fliph/flipv` |
//! | Arbitrary rotation | `tiny_skia::Pixmap::draw_pixmap`, bilinear, 8-bit premultiplied |
//! | Encode | `PngEncoder`, `JpegEncoder`, `WebPEncoder`, `AvifEncoder`, `write_to` |

use super::backend::{Backend, EngineImage, EngineStats, ImagingError, NativeLease, Result};
use super::calculations::{centre_window, clip_overlap, rotated_bounds};
use super::composite::BlendMode;
use super::layout::{BitDepth, ColorModel, PixelLayout, convert_to};
use super::params::{
    Angle, Color, ColorSpace, Direction, Interesting, Kernel, OutputFormat, SaveOptions,
};
use image::codecs::png::{CompressionType, PngEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    DynamicImage, ImageBuffer, ImageDecoder, ImageReader, Luma, Pixel, Rgb, Rgba, RgbaImage,
};
use std::io::{BufRead, Cursor, Seek};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{ColorU8, FilterQuality, Pixmap, PixmapPaint, Transform};

/// Owning handle to one image inside the geometry engine.
#[derive(Debug)]
pub struct GeometryHandle {
    image: DynamicImage,
    orientation: Orientation,
    lease: NativeLease,
}

impl GeometryHandle {
    /// Take ownership of an already decoded image. Empty images are
    /// rejected.
    pub fn from_image(stats: &Arc<EngineStats>, image: DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImagingError::InvalidOperation(format!(
                "image has zero size ({}x{})",
                image.width(),
                image.height()
            )));
        }
        PixelLayout::of(&image)?;
        Ok(Self::adopt(stats, image))
    }

    fn adopt(stats: &Arc<EngineStats>, image: DynamicImage) -> Self {
        Self {
            image,
            orientation: Orientation::NoTransforms,
            lease: NativeLease::acquire(stats, Backend::Geometry),
        }
    }

    /// Wrap `image` without validating it.
    #[cfg(test)]
    pub(crate) fn unchecked(stats: &Arc<EngineStats>, image: DynamicImage) -> Self {
        Self::adopt(stats, image)
    }

    /// Decode an image file. The format is sniffed from content.
    pub fn load_file(stats: &Arc<EngineStats>, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ImagingError::NotFound(path.to_path_buf()));
        }
        let reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(ImagingError::Io)?;
        Self::decode(stats, reader, &path.display().to_string())
    }

    /// Decode an in-memory encoded image.
    pub fn load_buffer(stats: &Arc<EngineStats>, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ImagingError::LoadFailed("empty buffer".into()));
        }
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(ImagingError::Io)?;
        Self::decode(stats, reader, "buffer")
    }

    fn decode<R: BufRead + Seek>(
        stats: &Arc<EngineStats>,
        reader: ImageReader<R>,
        what: &str,
    ) -> Result<Self> {
        let load_failed = |e: image::ImageError| {
            ImagingError::LoadFailed(format!("failed to decode {what}: {e}"))
        };
        let mut decoder = reader.into_decoder().map_err(load_failed)?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let image = DynamicImage::from_decoder(decoder).map_err(load_failed)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ImagingError::LoadFailed(format!("{what} has zero size")));
        }
        // Float decodes (e.g. 32-bit TIFF) are narrowed to 16-bit so every
        // geometry image has a lossless interchange form.
        let image = match PixelLayout::of(&image) {
            Ok(_) => image,
            Err(_) => {
                let model = if image.color().has_alpha() {
                    ColorModel::Rgba
                } else {
                    ColorModel::Rgb
                };
                convert_to(&image, PixelLayout::new(model, BitDepth::Sixteen))
            }
        };
        let mut handle = Self::from_image(stats, image)?;
        handle.orientation = orientation;
        Ok(handle)
    }

    fn derive(&self, image: DynamicImage) -> Result<Self> {
        Self::from_image(self.lease.stats(), image)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn layout(&self) -> PixelLayout {
        // Checked at construction.
        PixelLayout::of(&self.image).unwrap_or(PixelLayout::RGBA8)
    }

    pub fn lease(&self) -> &NativeLease {
        &self.lease
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// A new handle holding a copy of the same pixels.
    pub fn copy(&self) -> Result<Self> {
        self.derive(self.image.clone())
    }

    /// Change the sample depth, keeping the color model.
    pub fn cast(&self, depth: BitDepth) -> Result<Self> {
        let layout = self.layout();
        if layout.depth == depth {
            return self.copy();
        }
        self.derive(convert_to(&self.image, PixelLayout::new(layout.model, depth)))
    }

    // =====================================================================
    // Transforms
    // =====================================================================

    /// Resize by independent scale factors.
    pub fn resize(&self, hscale: f64, vscale: f64, kernel: Kernel) -> Result<Self> {
        if !(hscale.is_finite() && vscale.is_finite()) || hscale <= 0.0 || vscale <= 0.0 {
            return Err(ImagingError::InvalidOperation(format!(
                "resize scale must be positive, got {hscale}x{vscale}"
            )));
        }
        let width = super::calculations::scaled_edge(self.image.width(), hscale);
        let height = super::calculations::scaled_edge(self.image.height(), vscale);
        self.derive(self.image.resize_exact(width, height, filter_for(kernel)))
    }

    /// Extract a rectangle. The rectangle must lie inside the image.
    pub fn extract_area(&self, left: u32, top: u32, width: u32, height: u32) -> Result<Self> {
        check_area(self.image.width(), self.image.height(), left, top, width, height)?;
        self.derive(self.image.crop_imm(left, top, width, height))
    }

    /// Crop to `width`×`height`, choosing the window by `interesting`.
    pub fn smartcrop(&self, width: u32, height: u32, interesting: Interesting) -> Result<Self> {
        let (src_w, src_h) = (self.image.width(), self.image.height());
        if width == 0 || height == 0 || width > src_w || height > src_h {
            return Err(ImagingError::InvalidOperation(format!(
                "smart crop {width}x{height} does not fit in {src_w}x{src_h}"
            )));
        }
        let (left, top) = match interesting {
            Interesting::Centre => centre_window((src_w, src_h), (width, height)),
            Interesting::Entropy => entropy_window(&self.image, width, height),
            Interesting::Attention => attention_window(&self.image, width, height),
        };
        self.extract_area(left, top, width, height)
    }

    /// Rotate by a fixed right angle, clockwise.
    pub fn rot(&self, angle: Angle) -> Result<Self> {
        let rotated = match angle {
            Angle::D90 => self.image.rotate90(),
            Angle::D180 => self.image.rotate180(),
            Angle::D270 => self.image.rotate270(),
        };
        self.derive(rotated)
    }

    /// Rotate clockwise by any angle. The output is the rotated bounding box;
    /// uncovered pixels take `background`. Right angles are exact; other
    /// angles resample at 8 bits and keep the source's layout and depth.
    pub fn rotate(&self, degrees: f64, background: Color) -> Result<Self> {
        if !degrees.is_finite() {
            return Err(ImagingError::InvalidOperation(format!(
                "rotation angle must be finite, got {degrees}"
            )));
        }
        if degrees.rem_euclid(360.0) == 0.0 {
            return self.copy();
        }
        if let Some(angle) = Angle::from_degrees(degrees) {
            return self.rot(angle);
        }

        let rotated = rotate_bilinear(&self.image.to_rgba8(), degrees, background)?;

        let layout = self.layout();
        let mut model = layout.model;
        if background.a < 255 {
            model = model.with_alpha();
        }
        if model.is_gray() && !background.is_gray() {
            model = model.to_color();
        }
        let target = PixelLayout::new(model, layout.depth);
        self.derive(convert_to(&DynamicImage::ImageRgba8(rotated), target))
    }

    pub fn flip(&self, direction: Direction) -> Result<Self> {
        let flipped = match direction {
            Direction::Horizontal => self.image.fliph(),
            Direction::Vertical => self.image.flipv(),
        };
        self.derive(flipped)
    }

    /// Apply the EXIF orientation captured at decode time.
    pub fn autorot(&self) -> Result<Self> {
        let mut image = self.image.clone();
        image.apply_orientation(self.orientation);
        self.derive(image)
    }

    /// Place the image at (`x`, `y`) on a `width`×`height` canvas of `background`.
    ///
    /// Parts of the image outside the canvas are clipped.
    pub fn embed(
        &self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImagingError::InvalidOperation(
                "embed canvas must not be empty".into(),
            ));
        }
        let layout = self.layout();
        let mut model = layout.model;
        if background.a < 255 {
            model = model.with_alpha();
        }
        if model.is_gray() && !background.is_gray() {
            model = model.to_color();
        }
        let target = PixelLayout::new(model, layout.depth);

        let fill = Rgba(background.to_array().map(|v| v as u16 * 257));
        let canvas = DynamicImage::ImageRgba16(ImageBuffer::from_pixel(width, height, fill));
        let mut canvas = convert_to(&canvas, target);
        let source = if target == layout {
            self.image.clone()
        } else {
            convert_to(&self.image, target)
        };
        paste(&mut canvas, &source, (x, y))?;
        self.derive(canvas)
    }

    /// Append an opaque alpha channel. Images that already have one are copied.
    pub fn add_alpha(&self) -> Result<Self> {
        let layout = self.layout();
        if layout.has_alpha() {
            return self.copy();
        }
        self.derive(convert_to(
            &self.image,
            PixelLayout::new(layout.model.with_alpha(), layout.depth),
        ))
    }

    /// Convert between gray and sRGB, preserving any alpha channel.
    pub fn colourspace(&self, space: ColorSpace) -> Result<Self> {
        let layout = self.layout();
        let model = match space {
            ColorSpace::Grayscale => layout.model.to_gray(),
            ColorSpace::Srgb => layout.model.to_color(),
        };
        if model == layout.model {
            return self.copy();
        }
        self.derive(convert_to(&self.image, PixelLayout::new(model, layout.depth)))
    }

    /// Remove alpha by blending over `background`.
    pub fn flatten(&self, background: Color) -> Result<Self> {
        let layout = self.layout();
        if !layout.has_alpha() {
            return self.copy();
        }
        let bg = background.to_array().map(|v| v as f32 / 255.0);
        let mut buf = self.image.to_rgba32f();
        for p in buf.pixels_mut() {
            let a = p.0[3];
            for c in 0..3 {
                p.0[c] = p.0[c] * a + bg[c] * (1.0 - a);
            }
            p.0[3] = 1.0;
        }
        let mut model = layout.model.without_alpha();
        if model.is_gray() && !background.is_gray() {
            model = model.to_color();
        }
        self.derive(convert_to(
            &DynamicImage::ImageRgba32F(buf),
            PixelLayout::new(model, layout.depth),
        ))
    }

    /// Split an RGBA image into its RGB and alpha planes.
    pub fn split_alpha(&self) -> Result<(Self, Self)> {
        let (rgb, alpha) = match &self.image {
            DynamicImage::ImageRgba8(buf) => {
                let (rgb, alpha) = split_planes::<_, Rgb<u8>, Luma<u8>>(buf);
                (DynamicImage::ImageRgb8(rgb), DynamicImage::ImageLuma8(alpha))
            }
            DynamicImage::ImageRgba16(buf) => {
                let (rgb, alpha) = split_planes::<_, Rgb<u16>, Luma<u16>>(buf);
                (DynamicImage::ImageRgb16(rgb), DynamicImage::ImageLuma16(alpha))
            }
            other => {
                return Err(ImagingError::Engine(format!(
                    "split_alpha needs an RGBA image, got {:?}",
                    other.color()
                )));
            }
        };
        let rgb = self.derive(rgb)?;
        let alpha = self.derive(alpha)?;
        Ok((rgb, alpha))
    }

    /// Join an RGB image with a single-band alpha plane of the same size and depth.
    pub fn bandjoin(&self, alpha: &GeometryHandle) -> Result<Self> {
        if self.image.width() != alpha.image.width() || self.image.height() != alpha.image.height()
        {
            return Err(ImagingError::Engine("bandjoin planes differ in size".into()));
        }
        let joined = match (&self.image, &alpha.image) {
            (DynamicImage::ImageRgb8(rgb), DynamicImage::ImageLuma8(a)) => {
                DynamicImage::ImageRgba8(join_planes::<_, _, Rgba<u8>>(rgb, a))
            }
            (DynamicImage::ImageRgb16(rgb), DynamicImage::ImageLuma16(a)) => {
                DynamicImage::ImageRgba16(join_planes::<_, _, Rgba<u16>>(rgb, a))
            }
            (rgb, a) => {
                return Err(ImagingError::Engine(format!(
                    "bandjoin needs RGB + single band of equal depth, got {:?} + {:?}",
                    rgb.color(),
                    a.color()
                )));
            }
        };
        self.derive(joined)
    }

    /// Apply `v * a + b` to every sample; `b` is in sample units.
    pub fn linear(&self, a: f64, b: f64) -> Result<Self> {
        let mut image = self.image.clone();
        match &mut image {
            DynamicImage::ImageLuma8(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageLumaA8(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageRgb8(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageRgba8(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageLuma16(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageLumaA16(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageRgb16(buf) => linear_samples(&mut **buf, a, b),
            DynamicImage::ImageRgba16(buf) => linear_samples(&mut **buf, a, b),
            other => {
                return Err(ImagingError::Engine(format!(
                    "linear does not support {:?}",
                    other.color()
                )));
            }
        }
        self.derive(image)
    }

    /// Bounding box of everything that differs from the top-left pixel by
    /// more than `threshold` (in 8-bit units) in any channel.
    ///
    /// Returns `None` when the whole image is background.
    pub fn find_trim(&self, threshold: f64) -> Option<(u32, u32, u32, u32)> {
        let buf = self.image.to_rgba16();
        let background = *buf.get_pixel_checked(0, 0)?;
        let limit = threshold.max(0.0) * 257.0;

        let (mut left, mut top) = (u32::MAX, u32::MAX);
        let (mut right, mut bottom) = (0u32, 0u32);
        for (x, y, p) in buf.enumerate_pixels() {
            let differs = p
                .0
                .iter()
                .zip(background.0.iter())
                .any(|(&v, &bg)| (v as f64 - bg as f64).abs() > limit);
            if differs {
                left = left.min(x);
                top = top.min(y);
                right = right.max(x);
                bottom = bottom.max(y);
            }
        }
        if left == u32::MAX {
            return None;
        }
        Some((left, top, right - left + 1, bottom - top + 1))
    }

    /// Blend `overlay` onto `self` with `mode`. Both must be RGBA of the same
    /// size and depth.
    pub fn composite2(&self, overlay: &GeometryHandle, mode: BlendMode) -> Result<Self> {
        if self.image.width() != overlay.image.width()
            || self.image.height() != overlay.image.height()
        {
            return Err(ImagingError::Engine(format!(
                "composite2 operands differ in size: {}x{} vs {}x{}",
                self.image.width(),
                self.image.height(),
                overlay.image.width(),
                overlay.image.height()
            )));
        }
        let blended = match (&self.image, &overlay.image) {
            (DynamicImage::ImageRgba8(base), DynamicImage::ImageRgba8(top)) => {
                DynamicImage::ImageRgba8(blend_buffers(base, top, mode))
            }
            (DynamicImage::ImageRgba16(base), DynamicImage::ImageRgba16(top)) => {
                DynamicImage::ImageRgba16(blend_buffers(base, top, mode))
            }
            (base, top) => {
                return Err(ImagingError::Engine(format!(
                    "composite2 needs two RGBA images of equal depth, got {:?} and {:?}",
                    base.color(),
                    top.color()
                )));
            }
        };
        self.derive(blended)
    }

    // =====================================================================
    // Encoding
    // =====================================================================

    /// Encode to `format`. The image is narrowed to what the codec accepts.
    pub fn encode(&self, format: OutputFormat, options: &SaveOptions) -> Result<Vec<u8>> {
        let layout = self.layout();
        let eight_bit =
            |model: ColorModel| convert_to(&self.image, PixelLayout::new(model, BitDepth::Eight));
        let save_failed = |e: image::ImageError| {
            ImagingError::SaveFailed(format!("{} encode failed: {e}", format.name()))
        };

        let mut bytes = Vec::new();
        match format {
            OutputFormat::Png => {
                let compression = match options.compression {
                    0..=3 => CompressionType::Fast,
                    4..=6 => CompressionType::Default,
                    _ => CompressionType::Best,
                };
                let encoder = PngEncoder::new_with_quality(
                    &mut bytes,
                    compression,
                    image::codecs::png::FilterType::Adaptive,
                );
                self.image.write_with_encoder(encoder).map_err(save_failed)?;
            }
            OutputFormat::Jpeg => {
                let flat = eight_bit(layout.model.without_alpha());
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut bytes,
                    options.quality.value() as u8,
                );
                flat.write_with_encoder(encoder).map_err(save_failed)?;
            }
            OutputFormat::WebP => {
                if !options.lossless {
                    return Err(ImagingError::UnsupportedFormat(
                        "lossy WebP encoding is not available; request lossless".into(),
                    ));
                }
                let narrowed = eight_bit(layout.model.to_color());
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut bytes);
                narrowed.write_with_encoder(encoder).map_err(save_failed)?;
            }
            OutputFormat::Avif => {
                let speed = 10u8.saturating_sub(options.effort.min(9)).max(1);
                let narrowed = eight_bit(layout.model.to_color());
                let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                    &mut bytes,
                    speed,
                    options.quality.value() as u8,
                );
                narrowed.write_with_encoder(encoder).map_err(save_failed)?;
            }
            OutputFormat::Tiff => {
                self.image
                    .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Tiff)
                    .map_err(save_failed)?;
            }
            OutputFormat::Gif => {
                eight_bit(ColorModel::Rgba)
                    .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Gif)
                    .map_err(save_failed)?;
            }
        }
        Ok(bytes)
    }

    pub fn save(&self, path: &Path, format: OutputFormat, options: &SaveOptions) -> Result<()> {
        let bytes = self.encode(format, options)?;
        std::fs::write(path, bytes).map_err(|e| {
            ImagingError::SaveFailed(format!("failed to write {}: {e}", path.display()))
        })
    }
}

impl EngineImage for GeometryHandle {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }
}

fn filter_for(kernel: Kernel) -> FilterType {
    match kernel {
        Kernel::Nearest => FilterType::Nearest,
        Kernel::Linear => FilterType::Triangle,
        Kernel::Cubic => FilterType::CatmullRom,
        Kernel::Gaussian => FilterType::Gaussian,
        Kernel::Lanczos3 => FilterType::Lanczos3,
    }
}

fn check_area(src_w: u32, src_h: u32, left: u32, top: u32, width: u32, height: u32) -> Result<()> {
    let fits = width > 0
        && height > 0
        && left.checked_add(width).is_some_and(|r| r <= src_w)
        && top.checked_add(height).is_some_and(|b| b <= src_h);
    if fits {
        Ok(())
    } else {
        Err(ImagingError::InvalidOperation(format!(
            "area {width}x{height}+{left}+{top} is outside the {src_w}x{src_h} image"
        )))
    }
}

// =========================================================================
// Sample arithmetic
// =========================================================================

/// Integer sample types the engine blends and scales.
pub(crate) trait Sample: image::Primitive + 'static {
    const FULL_SCALE: f32;

    fn to_unit(self) -> f32;

    fn from_unit(value: f32) -> Self;
}

impl Sample for u8 {
    const FULL_SCALE: f32 = 255.0;

    fn to_unit(self) -> f32 {
        self as f32 / Self::FULL_SCALE
    }

    fn from_unit(value: f32) -> Self {
        (value.clamp(0.0, 1.0) * Self::FULL_SCALE).round() as u8
    }
}

impl Sample for u16 {
    const FULL_SCALE: f32 = 65535.0;

    fn to_unit(self) -> f32 {
        self as f32 / Self::FULL_SCALE
    }

    fn from_unit(value: f32) -> Self {
        (value.clamp(0.0, 1.0) * Self::FULL_SCALE).round() as u16
    }
}

fn linear_samples<S: Sample>(samples: &mut [S], a: f64, b: f64) {
    let max = S::FULL_SCALE as f64;
    for v in samples.iter_mut() {
        let scaled = (v.to_unit() as f64 * max) * a + b;
        *v = S::from_unit((scaled / max) as f32);
    }
}

type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Split a four-band buffer into its first three bands and its last one.
fn split_planes<P, C, A>(buf: &Buffer<P>) -> (Buffer<C>, Buffer<A>)
where
    P: Pixel,
    C: Pixel<Subpixel = P::Subpixel>,
    A: Pixel<Subpixel = P::Subpixel>,
{
    let (w, h) = buf.dimensions();
    let color = ImageBuffer::from_fn(w, h, |x, y| {
        *C::from_slice(&buf.get_pixel(x, y).channels()[..3])
    });
    let alpha = ImageBuffer::from_fn(w, h, |x, y| {
        *A::from_slice(&buf.get_pixel(x, y).channels()[3..4])
    });
    (color, alpha)
}

fn join_planes<C, A, P>(color: &Buffer<C>, alpha: &Buffer<A>) -> Buffer<P>
where
    C: Pixel,
    A: Pixel<Subpixel = C::Subpixel>,
    P: Pixel<Subpixel = C::Subpixel>,
{
    let (w, h) = color.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let c = color.get_pixel(x, y).channels();
        let a = alpha.get_pixel(x, y).channels()[0];
        *P::from_slice(&[c[0], c[1], c[2], a])
    })
}

fn blend_buffers<P>(base: &Buffer<P>, overlay: &Buffer<P>, mode: BlendMode) -> Buffer<P>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let mut out = base.clone();
    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        *dst = blend_pixel(*dst, *src, mode);
    }
    out
}

fn unit_channels<P>(pixel: &P) -> [f32; 4]
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let c = pixel.channels();
    [c[0].to_unit(), c[1].to_unit(), c[2].to_unit(), c[3].to_unit()]
}

/// Separable blend with source-over alpha compositing on RGBA pixels.
///
/// A fully transparent source leaves the base untouched, and an opaque
/// source in `Over` mode replaces it, both bit-exactly.
fn blend_pixel<P>(base: P, src: P, mode: BlendMode) -> P
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let src_alpha = src.channels()[3];
    if src_alpha == <P::Subpixel as Sample>::from_unit(0.0) {
        return base;
    }
    if mode == BlendMode::Over && src_alpha == <P::Subpixel as Sample>::from_unit(1.0) {
        return src;
    }

    let b = unit_channels(&base);
    let s = unit_channels(&src);
    let (ab, as_) = (b[3], s[3]);
    let ao = as_ + ab * (1.0 - as_);

    let mut out = [0.0f32; 4];
    for c in 0..3 {
        let mixed = match mode {
            BlendMode::Over => s[c],
            BlendMode::Multiply => s[c] * b[c],
            BlendMode::Add => (s[c] + b[c]).min(1.0),
        };
        let cs = (1.0 - ab) * s[c] + ab * mixed;
        let co = as_ * cs + ab * b[c] * (1.0 - as_);
        out[c] = co / ao;
    }
    out[3] = ao;
    let samples = out.map(<P::Subpixel as Sample>::from_unit);
    *P::from_slice(&samples)
}

fn paste(canvas: &mut DynamicImage, source: &DynamicImage, offset: (i64, i64)) -> Result<()> {
    match (canvas, source) {
        (DynamicImage::ImageLuma8(c), DynamicImage::ImageLuma8(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageLumaA8(c), DynamicImage::ImageLumaA8(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageRgb8(c), DynamicImage::ImageRgb8(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageRgba8(c), DynamicImage::ImageRgba8(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageLuma16(c), DynamicImage::ImageLuma16(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageLumaA16(c), DynamicImage::ImageLumaA16(s)) => {
            paste_buffer(c, s, offset)
        }
        (DynamicImage::ImageRgb16(c), DynamicImage::ImageRgb16(s)) => paste_buffer(c, s, offset),
        (DynamicImage::ImageRgba16(c), DynamicImage::ImageRgba16(s)) => {
            paste_buffer(c, s, offset)
        }
        (c, s) => {
            return Err(ImagingError::Engine(format!(
                "cannot paste {:?} onto {:?}",
                s.color(),
                c.color()
            )));
        }
    }
    Ok(())
}

fn paste_buffer<P: Pixel>(canvas: &mut Buffer<P>, source: &Buffer<P>, offset: (i64, i64)) {
    let Some(overlap) = clip_overlap(source.dimensions(), canvas.dimensions(), offset) else {
        return;
    };
    for row in 0..overlap.height {
        for col in 0..overlap.width {
            let pixel = *source.get_pixel(overlap.src_x + col, overlap.src_y + row);
            canvas.put_pixel(overlap.dst_x + col, overlap.dst_y + row, pixel);
        }
    }
}

/// Rotate clockwise about the centre into the rotated bounding box.
fn rotate_bilinear(source: &RgbaImage, degrees: f64, background: Color) -> Result<RgbaImage> {
    let (src_w, src_h) = source.dimensions();
    let (out_w, out_h) = rotated_bounds(src_w, src_h, degrees);
    let pixmap_failed =
        |w: u32, h: u32| ImagingError::AllocationFailed(format!("{w}x{h} rotation buffer"));

    let mut src = Pixmap::new(src_w, src_h).ok_or_else(|| pixmap_failed(src_w, src_h))?;
    for (dst, px) in src.pixels_mut().iter_mut().zip(source.pixels()) {
        let [r, g, b, a] = px.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }

    let mut out = Pixmap::new(out_w, out_h).ok_or_else(|| pixmap_failed(out_w, out_h))?;
    let [r, g, b, a] = background.to_array();
    out.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

    let (cx, cy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);
    let centred = Transform::from_translate(cx - src_w as f32 / 2.0, cy - src_h as f32 / 2.0);
    let transform = centred.post_concat(Transform::from_rotate_at(degrees as f32, cx, cy));
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    out.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);

    let straight: Vec<u8> = out
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(out_w, out_h, straight)
        .ok_or_else(|| ImagingError::Engine("rotation produced a short buffer".into()))
}

/// Shannon entropy of a luma histogram.
fn entropy(histogram: &[u32; 256]) -> f64 {
    let total: u64 = histogram.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

fn strip_entropy(luma: &image::GrayImage, left: u32, top: u32, width: u32, height: u32) -> f64 {
    let mut histogram = [0u32; 256];
    for y in top..top + height {
        for x in left..left + width {
            histogram[luma.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    entropy(&histogram)
}

/// Shrink the window one edge strip at a time, always dropping the strip
/// with less entropy.
fn entropy_window(image: &DynamicImage, width: u32, height: u32) -> (u32, u32) {
    let luma = image.to_luma8();
    let (mut left, mut top) = (0u32, 0u32);
    let (mut w, mut h) = luma.dimensions();

    while w > width {
        let step = (w - width).min((w / 8).max(1));
        let lhs = strip_entropy(&luma, left, top, step, h);
        let rhs = strip_entropy(&luma, left + w - step, top, step, h);
        if lhs < rhs {
            left += step;
        }
        w -= step;
    }
    while h > height {
        let step = (h - height).min((h / 8).max(1));
        let upper = strip_entropy(&luma, left, top, w, step);
        let lower = strip_entropy(&luma, left, top + h - step, w, step);
        if upper < lower {
            top += step;
        }
        h -= step;
    }
    (left, top)
}

/// Pick the window with the most edge energy plus saturation.
fn attention_window(image: &DynamicImage, width: u32, height: u32) -> (u32, u32) {
    let rgb = image.to_rgb8();
    let luma = image.to_luma8();
    let (w, h) = rgb.dimensions();

    // Summed-area table of the score map, one row/column of zero padding.
    let stride = (w + 1) as usize;
    let mut sat = vec![0f64; stride * (h + 1) as usize];
    for y in 0..h {
        let mut row_sum = 0f64;
        for x in 0..w {
            let here = luma.get_pixel(x, y).0[0] as f64;
            let right = luma.get_pixel((x + 1).min(w - 1), y).0[0] as f64;
            let below = luma.get_pixel(x, (y + 1).min(h - 1)).0[0] as f64;
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let saturation = (r.max(g).max(b) - r.min(g).min(b)) as f64;
            row_sum += (right - here).abs() + (below - here).abs() + saturation;
            let idx = (y as usize + 1) * stride + x as usize + 1;
            sat[idx] = sat[idx - stride] + row_sum;
        }
    }

    let area = |x: u32, y: u32| {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = ((x + width) as usize, (y + height) as usize);
        sat[y1 * stride + x1] - sat[y0 * stride + x1] - sat[y1 * stride + x0]
            + sat[y0 * stride + x0]
    };

    let mut best = centre_window((w, h), (width, height));
    let mut best_score = area(best.0, best.1);
    for y in 0..=(h - height) {
        for x in 0..=(w - width) {
            let score = area(x, y);
            if score > best_score {
                best_score = score;
                best = (x, y);
            }
        }
    }
    best
}
