//! Logical pixel layouts shared by both engines.
//!
//! A layout is a color model plus a bit depth. The geometry engine reads it
//! straight off the `DynamicImage` variant; the typography engine remembers
//! the layout it decoded from so it reports (and re-encodes) the same one.

use super::backend::{ImagingError, Result};
use image::{ColorType, DynamicImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelLayout {
    pub model: ColorModel,
    pub depth: BitDepth,
}

impl ColorModel {
    pub fn channels(self) -> u8 {
        match self {
            ColorModel::Gray => 1,
            ColorModel::GrayAlpha => 2,
            ColorModel::Rgb => 3,
            ColorModel::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ColorModel::GrayAlpha | ColorModel::Rgba)
    }

    pub fn is_gray(self) -> bool {
        matches!(self, ColorModel::Gray | ColorModel::GrayAlpha)
    }

    pub fn with_alpha(self) -> Self {
        match self {
            ColorModel::Gray | ColorModel::GrayAlpha => ColorModel::GrayAlpha,
            ColorModel::Rgb | ColorModel::Rgba => ColorModel::Rgba,
        }
    }

    pub fn without_alpha(self) -> Self {
        match self {
            ColorModel::Gray | ColorModel::GrayAlpha => ColorModel::Gray,
            ColorModel::Rgb | ColorModel::Rgba => ColorModel::Rgb,
        }
    }

    /// The color counterpart of this model, keeping alpha presence.
    pub fn to_color(self) -> Self {
        if self.has_alpha() {
            ColorModel::Rgba
        } else {
            ColorModel::Rgb
        }
    }

    /// The gray counterpart of this model, keeping alpha presence.
    pub fn to_gray(self) -> Self {
        if self.has_alpha() {
            ColorModel::GrayAlpha
        } else {
            ColorModel::Gray
        }
    }
}

impl PixelLayout {
    pub const RGBA8: PixelLayout = PixelLayout {
        model: ColorModel::Rgba,
        depth: BitDepth::Eight,
    };

    pub fn new(model: ColorModel, depth: BitDepth) -> Self {
        Self { model, depth }
    }

    /// Layout of a decoded image. Float images have no integer layout.
    pub fn of(image: &DynamicImage) -> Result<Self> {
        Self::from_color_type(image.color())
    }

    pub fn from_color_type(color: ColorType) -> Result<Self> {
        let (model, depth) = match color {
            ColorType::L8 => (ColorModel::Gray, BitDepth::Eight),
            ColorType::La8 => (ColorModel::GrayAlpha, BitDepth::Eight),
            ColorType::Rgb8 => (ColorModel::Rgb, BitDepth::Eight),
            ColorType::Rgba8 => (ColorModel::Rgba, BitDepth::Eight),
            ColorType::L16 => (ColorModel::Gray, BitDepth::Sixteen),
            ColorType::La16 => (ColorModel::GrayAlpha, BitDepth::Sixteen),
            ColorType::Rgb16 => (ColorModel::Rgb, BitDepth::Sixteen),
            ColorType::Rgba16 => (ColorModel::Rgba, BitDepth::Sixteen),
            other => {
                return Err(ImagingError::Engine(format!(
                    "no integer pixel layout for {other:?}"
                )));
            }
        };
        Ok(Self { model, depth })
    }

    pub fn channels(self) -> u8 {
        self.model.channels()
    }

    pub fn has_alpha(self) -> bool {
        self.model.has_alpha()
    }
}

/// Convert an image to the given layout, using the `image` crate's own
/// channel and depth conversions.
pub fn convert_to(image: &DynamicImage, layout: PixelLayout) -> DynamicImage {
    match (layout.model, layout.depth) {
        (ColorModel::Gray, BitDepth::Eight) => DynamicImage::ImageLuma8(image.to_luma8()),
        (ColorModel::GrayAlpha, BitDepth::Eight) => {
            DynamicImage::ImageLumaA8(image.to_luma_alpha8())
        }
        (ColorModel::Rgb, BitDepth::Eight) => DynamicImage::ImageRgb8(image.to_rgb8()),
        (ColorModel::Rgba, BitDepth::Eight) => DynamicImage::ImageRgba8(image.to_rgba8()),
        (ColorModel::Gray, BitDepth::Sixteen) => DynamicImage::ImageLuma16(image.to_luma16()),
        (ColorModel::GrayAlpha, BitDepth::Sixteen) => {
            DynamicImage::ImageLumaA16(image.to_luma_alpha16())
        }
        (ColorModel::Rgb, BitDepth::Sixteen) => DynamicImage::ImageRgb16(image.to_rgb16()),
        (ColorModel::Rgba, BitDepth::Sixteen) => DynamicImage::ImageRgba16(image.to_rgba16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_common_types() {
        let gray = DynamicImage::new_luma8(2, 2);
        let layout = PixelLayout::of(&gray).unwrap();
        assert_eq!(layout.model, ColorModel::Gray);
        assert_eq!(layout.channels(), 1);
        assert!(!layout.has_alpha());

        let rgba16 = DynamicImage::new_rgba16(2, 2);
        let layout = PixelLayout::of(&rgba16).unwrap();
        assert_eq!(layout, PixelLayout::new(ColorModel::Rgba, BitDepth::Sixteen));
        assert_eq!(layout.channels(), 4);
    }

    #[test]
    fn float_images_have_no_layout() {
        let float = DynamicImage::new_rgb32f(1, 1);
        assert!(matches!(
            PixelLayout::of(&float),
            Err(ImagingError::Engine(_))
        ));
    }

    #[test]
    fn model_alpha_transitions() {
        assert_eq!(ColorModel::Gray.with_alpha(), ColorModel::GrayAlpha);
        assert_eq!(ColorModel::Rgba.without_alpha(), ColorModel::Rgb);
        assert_eq!(ColorModel::GrayAlpha.to_color(), ColorModel::Rgba);
        assert_eq!(ColorModel::Rgb.to_gray(), ColorModel::Gray);
    }

    #[test]
    fn convert_to_changes_variant() {
        let gray = DynamicImage::new_luma8(3, 1);
        let rgba = convert_to(&gray, PixelLayout::RGBA8);
        assert_eq!(rgba.color(), ColorType::Rgba8);
        assert_eq!(rgba.width(), 3);
    }
}
