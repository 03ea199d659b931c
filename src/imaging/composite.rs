//! Layering one image over another.
//!
//! The pipeline, all in the geometry engine:
//!
//! 1. Move each operand to the geometry engine and normalize it to RGBA,
//!    one operand at a time. No step holds both operands' locks, so an
//!    image can be composited with itself.
//! 2. Bring the overlay to the base's bit depth.
//! 3. Scale the overlay's alpha plane by the opacity; RGB is untouched.
//! 4. Paste the overlay at its offset on a transparent canvas the size of
//!    the base, clipping whatever falls outside.
//! 5. Blend the canvas onto the base with the chosen mode.
//!
//! Every intermediate is an owned engine handle, so an early `?` releases
//! whatever was built so far.

use super::backend::{EngineImage, ImagingError, Result};
use super::geometry::GeometryHandle;
use super::handle::ImageHandle;
use super::params::{Color, ColorSpace};

/// Separable blend applied after positioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Porter-Duff source over.
    #[default]
    Over,
    /// Channel sum, clamped.
    Add,
    /// Channel product.
    Multiply,
}

impl BlendMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "over" => Some(Self::Over),
            "add" => Some(Self::Add),
            "multiply" => Some(Self::Multiply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    x: i64,
    y: i64,
    mode: BlendMode,
    opacity: f64,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            mode: BlendMode::Over,
            opacity: 1.0,
        }
    }
}

impl CompositeOptions {
    /// Opacity outside `0.0..=1.0` is clamped; NaN means fully opaque.
    pub fn new(mode: BlendMode, opacity: f64) -> Self {
        let opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        Self {
            x: 0,
            y: 0,
            mode,
            opacity,
        }
    }

    /// Place the overlay's top-left corner at (`x`, `y`) on the base.
    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn offset(&self) -> (i64, i64) {
        (self.x, self.y)
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }
}

/// Normalize any layout to RGBA, keeping an existing alpha channel.
fn to_rgba(image: &GeometryHandle) -> Result<GeometryHandle> {
    match image.channels() {
        4 => image.copy(),
        3 => image.add_alpha(),
        1 | 2 => {
            let color = image.colourspace(ColorSpace::Srgb)?;
            if color.has_alpha() {
                Ok(color)
            } else {
                color.add_alpha()
            }
        }
        n => Err(ImagingError::Engine(format!(
            "cannot normalize a {n}-channel image"
        ))),
    }
}

/// Ensure geometry and normalize under `handle`'s lock only.
fn normalized(handle: &ImageHandle, role: &str) -> Result<GeometryHandle> {
    let geometry = handle.geometry()?;
    if geometry.width() == 0 || geometry.height() == 0 {
        return Err(ImagingError::InvalidOperation(format!(
            "{role} image has zero size"
        )));
    }
    to_rgba(&geometry)
}

pub fn composite(
    base: &ImageHandle,
    overlay: &ImageHandle,
    options: &CompositeOptions,
) -> Result<ImageHandle> {
    let base_rgba = normalized(base, "base")?;
    let overlay_rgba = normalized(overlay, "overlay")?;
    log::debug!(
        "compositing {}x{} over {}x{} at {:?}, {:?}, opacity {}",
        overlay_rgba.width(),
        overlay_rgba.height(),
        base_rgba.width(),
        base_rgba.height(),
        options.offset(),
        options.mode,
        options.opacity
    );

    let depth = base_rgba.layout().depth;
    let overlay_rgba = if overlay_rgba.layout().depth == depth {
        overlay_rgba
    } else {
        log::debug!("casting overlay to the base's {depth:?} samples");
        overlay_rgba.cast(depth)?
    };

    let faded = if options.opacity < 1.0 {
        let (rgb, alpha) = overlay_rgba.split_alpha()?;
        let scaled = alpha.linear(options.opacity, 0.0)?;
        rgb.bandjoin(&scaled)?
    } else {
        overlay_rgba
    };

    let positioned = faded.embed(
        options.x,
        options.y,
        base_rgba.width(),
        base_rgba.height(),
        Color::TRANSPARENT,
    )?;
    let blended = base_rgba.composite2(&positioned, options.mode)?;
    Ok(ImageHandle::from_geometry(base.engines(), blended))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::Backend;
    use crate::imaging::engines::Engines;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::sync::Arc;

    fn handle(engines: &Arc<Engines>, image: DynamicImage) -> ImageHandle {
        ImageHandle::from_image(engines, image).unwrap()
    }

    fn rgba8(h: &ImageHandle) -> RgbaImage {
        h.to_image().unwrap().to_rgba8()
    }

    #[test]
    fn opacity_is_clamped() {
        assert_eq!(CompositeOptions::new(BlendMode::Over, 1.7).opacity(), 1.0);
        assert_eq!(CompositeOptions::new(BlendMode::Over, -3.0).opacity(), 0.0);
        assert_eq!(CompositeOptions::new(BlendMode::Over, f64::NAN).opacity(), 1.0);
        assert_eq!(CompositeOptions::new(BlendMode::Add, 0.25).opacity(), 0.25);
    }

    #[test]
    fn blend_mode_parse() {
        assert_eq!(BlendMode::parse("Multiply"), Some(BlendMode::Multiply));
        assert_eq!(BlendMode::parse("screen"), None);
    }

    #[test]
    fn opaque_covering_overlay_replaces_base() {
        let engines = Arc::new(Engines::default());
        let base = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))),
        );
        let overlay_img = RgbImage::from_fn(6, 5, |x, y| Rgb([(x * 40) as u8, (y * 50) as u8, 9]));
        let overlay = handle(&engines, DynamicImage::ImageRgb8(overlay_img.clone()));

        let out = base
            .composite(&overlay, &CompositeOptions::default())
            .unwrap();
        assert_eq!((out.width().unwrap(), out.height().unwrap()), (4, 3));
        let pixels = rgba8(&out);
        for (x, y, p) in pixels.enumerate_pixels() {
            let [r, g, b] = overlay_img.get_pixel(x, y).0;
            assert_eq!(p.0, [r, g, b, 255]);
        }
    }

    #[test]
    fn overlay_outside_base_leaves_base_unchanged() {
        let engines = Arc::new(Engines::default());
        let base_img = RgbImage::from_fn(5, 5, |x, y| Rgb([x as u8 * 3, y as u8 * 7, 200]));
        let base = handle(&engines, DynamicImage::ImageRgb8(base_img.clone()));
        let overlay = handle(
            &engines,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]))),
        );
        for (x, y) in [(5, 0), (0, 5), (-3, 0), (100, -100)] {
            let out = base
                .composite(&overlay, &CompositeOptions::default().at(x, y))
                .unwrap();
            let pixels = rgba8(&out);
            for (px, py, p) in pixels.enumerate_pixels() {
                let [r, g, b] = base_img.get_pixel(px, py).0;
                assert_eq!(p.0, [r, g, b, 255]);
            }
        }
    }

    #[test]
    fn zero_opacity_returns_base() {
        let engines = Arc::new(Engines::default());
        let base_img = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 140]));
        let base = handle(&engines, DynamicImage::ImageRgba8(base_img.clone()));
        let overlay = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([250, 250, 250]))),
        );
        for mode in [BlendMode::Over, BlendMode::Add, BlendMode::Multiply] {
            let out = base
                .composite(&overlay, &CompositeOptions::new(mode, 0.0))
                .unwrap();
            assert_eq!(rgba8(&out).as_raw(), base_img.as_raw());
        }
    }

    #[test]
    fn half_opacity_scales_alpha_not_color() {
        let engines = Arc::new(Engines::default());
        let base = handle(
            &engines,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]))),
        );
        let overlay = handle(
            &engines,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 200]))),
        );
        let out = base
            .composite(&overlay, &CompositeOptions::new(BlendMode::Over, 0.5))
            .unwrap();
        // Over a transparent base the result is the faded overlay itself.
        assert_eq!(rgba8(&out).get_pixel(0, 0).0, [200, 100, 50, 100]);
    }

    #[test]
    fn offset_overlay_is_clipped() {
        let engines = Arc::new(Engines::default());
        let base = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))),
        );
        let overlay = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([255, 255, 255]))),
        );
        let out = base
            .composite(&overlay, &CompositeOptions::default().at(2, -1))
            .unwrap();
        let pixels = rgba8(&out);
        assert_eq!(pixels.get_pixel(2, 0).0, [255, 255, 255, 255]);
        assert_eq!(pixels.get_pixel(3, 1).0, [255, 255, 255, 255]);
        assert_eq!(pixels.get_pixel(3, 2).0, [0, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(1, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn gray_operands_are_normalized_to_rgba() {
        let engines = Arc::new(Engines::default());
        let base = handle(
            &engines,
            DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([128]))),
        );
        let overlay = handle(
            &engines,
            DynamicImage::ImageLumaA8(image::GrayAlphaImage::from_pixel(
                1,
                1,
                image::LumaA([10, 255]),
            )),
        );
        let out = base.composite(&overlay, &CompositeOptions::default()).unwrap();
        assert_eq!(out.channels().unwrap(), 4);
        let pixels = rgba8(&out);
        assert_eq!(pixels.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(pixels.get_pixel(1, 1).0, [128, 128, 128, 255]);
    }

    #[test]
    fn multiply_and_add_modes() {
        let engines = Arc::new(Engines::default());
        let base = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([128, 255, 0]))),
        );
        let overlay = handle(
            &engines,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 128, 200]))),
        );
        let multiplied = base
            .composite(&overlay, &CompositeOptions::new(BlendMode::Multiply, 1.0))
            .unwrap();
        assert_eq!(rgba8(&multiplied).get_pixel(0, 0).0, [128, 128, 0, 255]);
        let added = base
            .composite(&overlay, &CompositeOptions::new(BlendMode::Add, 1.0))
            .unwrap();
        assert_eq!(rgba8(&added).get_pixel(0, 0).0, [255, 255, 200, 255]);
    }

    #[test]
    fn composite_with_itself_does_not_deadlock() {
        let engines = Arc::new(Engines::default());
        let image = handle(
            &engines,
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([9, 8, 7, 255]))),
        );
        image.ensure(Backend::Typography).unwrap();
        let out = image
            .composite(&image, &CompositeOptions::new(BlendMode::Over, 0.5))
            .unwrap();
        assert_eq!((out.width().unwrap(), out.height().unwrap()), (2, 2));
        assert_eq!(image.backend(), Backend::Geometry);
    }

    #[test]
    fn mixed_depths_follow_the_base() {
        let engines = Arc::new(Engines::default());
        let base = handle(&engines, DynamicImage::new_rgb8(2, 2));
        let overlay = handle(&engines, DynamicImage::new_rgba16(1, 1));
        let out = base.composite(&overlay, &CompositeOptions::default()).unwrap();
        assert_eq!(out.to_image().unwrap().color(), image::ColorType::Rgba8);
    }

    #[test]
    fn intermediates_are_all_released() {
        let engines = Arc::new(Engines::default());
        let base = handle(&engines, DynamicImage::new_rgb8(4, 4));
        let overlay = handle(&engines, DynamicImage::new_luma8(2, 2));
        let out = base
            .composite(&overlay, &CompositeOptions::new(BlendMode::Over, 0.3).at(1, 1))
            .unwrap();
        let snap = engines.stats().snapshot();
        // base + overlay + result remain; everything else came and went.
        assert_eq!(snap.live(), 3);
        assert!(snap.released() > 0);
        drop(out);
        drop(base);
        drop(overlay);
        assert_eq!(engines.stats().snapshot().live(), 0);
    }

    #[test]
    fn overlay_at_extreme_offsets_leaves_base_unchanged() {
        let engines = Arc::new(Engines::default());
        let base_img = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let base = handle(&engines, DynamicImage::ImageRgba8(base_img.clone()));
        let overlay = handle(&engines, DynamicImage::new_rgba8(2, 2));
        for (x, y) in [(i64::MAX, 0), (0, i64::MAX), (i64::MIN, i64::MIN)] {
            let out = base
                .composite(&overlay, &CompositeOptions::default().at(x, y))
                .unwrap();
            assert_eq!(rgba8(&out).as_raw(), base_img.as_raw());
        }
    }

    #[test]
    fn zero_size_operands_are_rejected_without_leaks() {
        let engines = Arc::new(Engines::default());
        let empty = ImageHandle::from_geometry(
            &engines,
            GeometryHandle::unchecked(engines.stats(), DynamicImage::new_rgb8(0, 0)),
        );
        let image = handle(&engines, DynamicImage::new_rgb8(2, 2));
        let before = engines.stats().snapshot();

        for (base, overlay) in [(&empty, &image), (&image, &empty)] {
            assert!(matches!(
                base.composite(overlay, &CompositeOptions::default()),
                Err(ImagingError::InvalidOperation(_))
            ));
        }
        let after = engines.stats().snapshot();
        assert_eq!(after.live(), before.live());
        assert_eq!(after.conversions, before.conversions);
    }

    #[test]
    fn failed_composite_leaks_nothing() {
        let engines = Arc::new(Engines::default());
        let base = handle(&engines, DynamicImage::new_rgb8(2, 2));
        let overlay = handle(&engines, DynamicImage::new_rgb8(2, 2));
        engines.shutdown();
        assert!(matches!(
            base.composite(&overlay, &CompositeOptions::default()),
            Err(ImagingError::InvalidOperation(_))
        ));
        assert_eq!(engines.stats().snapshot().live(), 2);
    }
}
