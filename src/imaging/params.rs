//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are shared by
//! the routing layer ([`handle`](super::handle)) and both engines, so a
//! caller never sees an engine-specific enum.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`SaveOptions`]: Quality, lossless flag, PNG compression, encoder effort.
//! - [`OutputFormat`]: Encodable formats and extension lookup.
//! - [`Kernel`], [`Angle`], [`Direction`], [`Interesting`], [`ColorSpace`]: geometry knobs.
//! - [`Color`]: RGBA color with CSS-ish parsing; used for backgrounds and text ink.
//! - [`Gravity`], [`TextAlign`]: text placement.

use std::path::Path;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoder settings for `to_file` / `to_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub quality: Quality,
    /// Request lossless output. Only meaningful for WebP, which this build
    /// can only write losslessly.
    pub lossless: bool,
    /// PNG compression level, 0 (fastest) to 9 (smallest).
    pub compression: u8,
    /// Encoder effort, 0 (fastest) to 9 (slowest). Drives the AVIF speed.
    pub effort: u8,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            lossless: true,
            compression: 6,
            effort: 4,
        }
    }
}

impl SaveOptions {
    pub fn with_quality(quality: u32) -> Self {
        Self {
            quality: Quality::new(quality),
            ..Self::default()
        }
    }
}

/// Output formats the geometry engine can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
    Tiff,
    Gif,
    Avif,
}

impl OutputFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Gif => "gif",
            Self::Avif => "avif",
        }
    }
}

/// Resampling kernel for resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kernel {
    Nearest,
    Linear,
    Cubic,
    Gaussian,
    #[default]
    Lanczos3,
}

impl Kernel {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nearest" => Some(Self::Nearest),
            "linear" => Some(Self::Linear),
            "cubic" => Some(Self::Cubic),
            "gaussian" => Some(Self::Gaussian),
            "lanczos3" | "lanczos" => Some(Self::Lanczos3),
            _ => None,
        }
    }
}

/// Fixed right-angle rotations (clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Angle {
    D90,
    D180,
    D270,
}

impl Angle {
    /// Map a whole-degree angle to a fixed rotation, if it is one.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        let normalized = degrees.rem_euclid(360.0);
        if normalized == 90.0 {
            Some(Self::D90)
        } else if normalized == 180.0 {
            Some(Self::D180)
        } else if normalized == 270.0 {
            Some(Self::D270)
        } else {
            None
        }
    }
}

/// Flip direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Strategy for choosing the crop window in a smart crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interesting {
    /// Keep the centre.
    Centre,
    /// Repeatedly drop the lower-entropy edge.
    #[default]
    Entropy,
    /// Keep the window with the most edge energy and saturation.
    Attention,
}

impl Interesting {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "centre" | "center" => Some(Self::Centre),
            "entropy" => Some(Self::Entropy),
            "attention" => Some(Self::Attention),
            _ => None,
        }
    }
}

/// Target color space for `colourspace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Grayscale,
    Srgb,
}

/// Straight-alpha RGBA color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_gray(self) -> bool {
        self.r == self.g && self.g == self.b
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`, `rgba(r, g, b, a)`
    /// (alpha as 0.0–1.0) or one of a few names.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        match s.as_str() {
            "black" => return Some(Self::BLACK),
            "white" => return Some(Self::WHITE),
            "transparent" | "none" => return Some(Self::TRANSPARENT),
            "red" => return Some(Self::rgb(255, 0, 0)),
            "green" => return Some(Self::rgb(0, 128, 0)),
            "blue" => return Some(Self::rgb(0, 0, 255)),
            "gray" | "grey" => return Some(Self::rgb(128, 128, 128)),
            _ => {}
        }

        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(body) = s.strip_prefix("rgba(").and_then(|r| r.strip_suffix(')')) {
            let parts: Vec<&str> = body.split(',').map(str::trim).collect();
            if parts.len() != 4 {
                return None;
            }
            let alpha: f32 = parts[3].parse().ok()?;
            if !(0.0..=1.0).contains(&alpha) {
                return None;
            }
            return Some(Self::rgba(
                parts[0].parse().ok()?,
                parts[1].parse().ok()?,
                parts[2].parse().ok()?,
                (alpha * 255.0).round() as u8,
            ));
        }
        if let Some(body) = s.strip_prefix("rgb(").and_then(|r| r.strip_suffix(')')) {
            let parts: Vec<&str> = body.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return None;
            }
            return Some(Self::rgb(
                parts[0].parse().ok()?,
                parts[1].parse().ok()?,
                parts[2].parse().ok()?,
            ));
        }
        None
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let nib = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
            Some(Color::rgb(nib(0)?, nib(1)?, nib(2)?))
        }
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// Where a text block is anchored on the image.
///
/// `None` means the `(x, y)` given to `draw_text` is the baseline origin of
/// the first line. Any other gravity places the whole block against that
/// edge or corner and treats `(x, y)` as an inward offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gravity {
    #[default]
    None,
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Gravity {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "northwest" => Some(Self::NorthWest),
            "north" => Some(Self::North),
            "northeast" => Some(Self::NorthEast),
            "west" => Some(Self::West),
            "center" | "centre" => Some(Self::Center),
            "east" => Some(Self::East),
            "southwest" => Some(Self::SouthWest),
            "south" => Some(Self::South),
            "southeast" => Some(Self::SouthEast),
            _ => None,
        }
    }
}

/// Horizontal alignment of lines within a multi-line text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(250).value(), 100);
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            OutputFormat::from_path(Path::new("a/b.JPG")),
            Some(OutputFormat::Jpeg)
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("x.tif")),
            Some(OutputFormat::Tiff)
        );
        assert_eq!(OutputFormat::from_path(Path::new("x.bmp")), None);
        assert_eq!(OutputFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn angle_from_degrees() {
        assert_eq!(Angle::from_degrees(90.0), Some(Angle::D90));
        assert_eq!(Angle::from_degrees(-90.0), Some(Angle::D270));
        assert_eq!(Angle::from_degrees(540.0), Some(Angle::D180));
        assert_eq!(Angle::from_degrees(45.0), None);
        assert_eq!(Angle::from_degrees(0.0), None);
    }

    #[test]
    fn color_parse_hex_forms() {
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse("#102030"), Some(Color::rgb(16, 32, 48)));
        assert_eq!(
            Color::parse("#10203080"),
            Some(Color::rgba(16, 32, 48, 128))
        );
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#gggggg"), None);
    }

    #[test]
    fn color_parse_functional_and_names() {
        assert_eq!(Color::parse("rgb(1, 2, 3)"), Some(Color::rgb(1, 2, 3)));
        assert_eq!(
            Color::parse("rgba(255,0,0,0.5)"),
            Some(Color::rgba(255, 0, 0, 128))
        );
        assert_eq!(Color::parse("rgba(255,0,0,2)"), None);
        assert_eq!(Color::parse(" Black "), Some(Color::BLACK));
        assert_eq!(Color::parse("none"), Some(Color::TRANSPARENT));
        assert_eq!(Color::parse("chartreuse"), None);
    }

    #[test]
    fn color_is_gray() {
        assert!(Color::rgb(7, 7, 7).is_gray());
        assert!(!Color::rgb(7, 7, 8).is_gray());
    }

    #[test]
    fn enum_parsers() {
        assert_eq!(Kernel::parse("Lanczos"), Some(Kernel::Lanczos3));
        assert_eq!(Interesting::parse("center"), Some(Interesting::Centre));
        assert_eq!(Gravity::parse("SouthEast"), Some(Gravity::SouthEast));
        assert_eq!(Gravity::parse("up"), None);
    }
}
