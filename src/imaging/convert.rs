//! Moving pixels between engines.
//!
//! The only path between the two engines is a PNG intermediate at the
//! source's own depth and color model. Neither function consumes its
//! input: the caller drops the old handle once the new one exists.

use super::backend::{EngineImage, ImagingError, Result};
use super::geometry::GeometryHandle;
use super::params::{OutputFormat, SaveOptions};
use super::typography::TypographyHandle;

const INTERMEDIATE_COMPRESSION: u8 = 1;

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_DECODE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Make the next conversion on this thread fail at its decode step.
#[cfg(test)]
pub(crate) fn fail_next_decode() {
    FAIL_NEXT_DECODE.with(|flag| flag.set(true));
}

#[cfg(test)]
fn decode_gate() -> Result<()> {
    if FAIL_NEXT_DECODE.with(|flag| flag.replace(false)) {
        return Err(ImagingError::Engine("decode refused".into()));
    }
    Ok(())
}

#[cfg(not(test))]
fn decode_gate() -> Result<()> {
    Ok(())
}

fn intermediate_options() -> SaveOptions {
    SaveOptions {
        lossless: true,
        compression: INTERMEDIATE_COMPRESSION,
        ..SaveOptions::default()
    }
}

pub fn to_typography(source: &GeometryHandle) -> Result<TypographyHandle> {
    let bytes = source
        .encode(OutputFormat::Png, &intermediate_options())
        .map_err(|e| ImagingError::ConversionFailed(format!("geometry encode: {e}")))?;
    let converted = decode_gate()
        .and_then(|()| TypographyHandle::load_buffer(source.lease().stats(), &bytes))
        .map_err(|e| ImagingError::ConversionFailed(format!("typography decode: {e}")))?;
    log::debug!(
        "geometry -> typography: {}x{}, {} channel(s), {} byte intermediate",
        converted.width(),
        converted.height(),
        converted.channels(),
        bytes.len()
    );
    Ok(converted)
}

pub fn to_geometry(source: &TypographyHandle) -> Result<GeometryHandle> {
    let bytes = source
        .encode_png(INTERMEDIATE_COMPRESSION)
        .map_err(|e| ImagingError::ConversionFailed(format!("typography encode: {e}")))?;
    let converted = decode_gate()
        .and_then(|()| GeometryHandle::load_buffer(source.lease().stats(), &bytes))
        .map_err(|e| ImagingError::ConversionFailed(format!("geometry decode: {e}")))?;
    log::debug!(
        "typography -> geometry: {}x{}, {} channel(s), {} byte intermediate",
        converted.width(),
        converted.height(),
        converted.channels(),
        bytes.len()
    );
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::EngineStats;
    use image::{DynamicImage, ImageBuffer, LumaA, Rgb, Rgba};
    use std::sync::Arc;

    fn geometry(stats: &Arc<EngineStats>, image: DynamicImage) -> GeometryHandle {
        GeometryHandle::from_image(stats, image).unwrap()
    }

    #[test]
    fn round_trip_is_pixel_exact_8_bit() {
        let stats = Arc::new(EngineStats::default());
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_fn(7, 5, |x, y| {
            Rgba([(x * 31) as u8, (y * 47) as u8, (x * y) as u8, (255 - x * 9) as u8])
        }));
        let source = geometry(&stats, image.clone());
        let back = to_geometry(&to_typography(&source).unwrap()).unwrap();
        assert_eq!(back.image().color(), image.color());
        assert_eq!(back.image().as_bytes(), image.as_bytes());
    }

    #[test]
    fn round_trip_is_pixel_exact_16_bit() {
        let stats = Arc::new(EngineStats::default());
        let image = DynamicImage::ImageRgb16(ImageBuffer::from_fn(4, 4, |x, y| {
            Rgb([(x * 16001) as u16, (y * 9999 + 3) as u16, 65535])
        }));
        let source = geometry(&stats, image.clone());
        let back = to_geometry(&to_typography(&source).unwrap()).unwrap();
        assert_eq!(back.image().as_bytes(), image.as_bytes());
    }

    #[test]
    fn gray_alpha_reports_same_channels_in_both_engines() {
        let stats = Arc::new(EngineStats::default());
        let image = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(3, 3, LumaA([90, 200])));
        let source = geometry(&stats, image);
        let typo = to_typography(&source).unwrap();
        assert_eq!(typo.channels(), source.channels());
        assert_eq!(typo.has_alpha(), source.has_alpha());
        assert_eq!((typo.width(), typo.height()), (3, 3));
    }

    #[test]
    fn conversion_leaves_source_alive_and_counts_new_handle() {
        let stats = Arc::new(EngineStats::default());
        let source = geometry(&stats, DynamicImage::new_rgb8(2, 2));
        let converted = to_typography(&source).unwrap();
        let snap = stats.snapshot();
        assert_eq!(snap.geometry_created, 1);
        assert_eq!(snap.typography_created, 1);
        assert_eq!(snap.released(), 0);
        drop(converted);
        drop(source);
        assert_eq!(stats.snapshot().live(), 0);
    }
}
