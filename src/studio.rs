//! Entry point: one [`Studio`] owns one pair of engines.
//!
//! Handles loaded through a studio share its engine context (fonts, encoder
//! defaults, resource counters). After [`Studio::shutdown`] every operation
//! on those handles fails with `InvalidOperation`; handles still release
//! their native resources when dropped.

use crate::config::EngineConfig;
use crate::imaging::{
    Engines, GeometryHandle, ImageHandle, ImagingError, Result, SaveOptions, StatsSnapshot,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct Studio {
    engines: Arc<Engines>,
}

impl Default for Studio {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Studio {
    pub fn new(config: &EngineConfig) -> Self {
        let engines = Engines::new(
            config.font_registry(),
            config.text_defaults(),
            config.save_options(),
        );
        log::debug!(
            "studio started: {} font dir(s), default font {:?}",
            config.fonts.dirs.len(),
            config.fonts.default
        );
        Self {
            engines: Arc::new(engines),
        }
    }

    /// Decode an image file into a geometry-backed handle.
    pub fn load(&self, path: &Path) -> Result<ImageHandle> {
        self.engines.check_active()?;
        let geometry = GeometryHandle::load_file(self.engines.stats(), path)?;
        Ok(ImageHandle::from_geometry(&self.engines, geometry))
    }

    /// Decode an in-memory image into a geometry-backed handle.
    pub fn load_buffer(&self, bytes: &[u8]) -> Result<ImageHandle> {
        self.engines.check_active()?;
        let geometry = GeometryHandle::load_buffer(self.engines.stats(), bytes)?;
        Ok(ImageHandle::from_geometry(&self.engines, geometry))
    }

    pub fn from_image(&self, image: image::DynamicImage) -> Result<ImageHandle> {
        ImageHandle::from_image(&self.engines, image)
    }

    /// Write `image` to `path` with the configured encoder defaults.
    pub fn save(&self, image: &ImageHandle, path: &Path) -> Result<()> {
        if !Arc::ptr_eq(image.engines(), &self.engines) {
            return Err(ImagingError::InvalidOperation(
                "image belongs to a different studio".into(),
            ));
        }
        image.to_file(path, &self.engines.save_defaults())
    }

    pub fn save_defaults(&self) -> SaveOptions {
        self.engines.save_defaults()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engines.stats().snapshot()
    }

    pub fn engines(&self) -> &Arc<Engines> {
        &self.engines
    }

    pub fn is_active(&self) -> bool {
        self.engines.is_active()
    }

    pub fn shutdown(&self) {
        self.engines.shutdown();
    }
}

/// Identifiers of this crate and the engines it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versions {
    pub brushwork: &'static str,
    pub geometry: &'static str,
    pub typography: &'static str,
}

impl std::fmt::Display for Versions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "brushwork {} (geometry: {}, typography: {})",
            self.brushwork, self.geometry, self.typography
        )
    }
}

pub fn versions() -> Versions {
    Versions {
        brushwork: env!("CARGO_PKG_VERSION"),
        geometry: "image 0.25",
        typography: "fontdue 0.9 + tiny-skia 0.11 + png 0.17",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Backend;
    use crate::test_helpers::fixtures_dir;

    #[test]
    fn load_fixture_is_geometry_backed() {
        let studio = Studio::default();
        let image = studio.load(&fixtures_dir().join("alpha-1x1.png")).unwrap();
        assert_eq!(image.backend(), Backend::Geometry);
        assert_eq!((image.width().unwrap(), image.height().unwrap()), (1, 1));
        assert!(image.has_alpha().unwrap());
        assert_eq!(studio.stats().geometry_created, 1);
    }

    #[test]
    fn load_missing_path_is_not_found() {
        let studio = Studio::default();
        assert!(matches!(
            studio.load(Path::new("/no/such/image.png")),
            Err(ImagingError::NotFound(_))
        ));
    }

    #[test]
    fn load_bad_buffers_fail() {
        let studio = Studio::default();
        assert!(matches!(
            studio.load_buffer(&[]),
            Err(ImagingError::LoadFailed(_))
        ));
        assert!(matches!(
            studio.load_buffer(&[0x89, b'P', b'N', b'G']),
            Err(ImagingError::LoadFailed(_))
        ));
    }

    #[test]
    fn shutdown_blocks_loads_and_operations() {
        let studio = Studio::default();
        let bytes = std::fs::read(fixtures_dir().join("alpha-1x1.png")).unwrap();
        let image = studio.load_buffer(&bytes).unwrap();
        studio.shutdown();
        assert!(!studio.is_active());
        assert!(matches!(
            studio.load_buffer(&bytes),
            Err(ImagingError::InvalidOperation(_))
        ));
        assert!(matches!(
            image.channels(),
            Err(ImagingError::InvalidOperation(_))
        ));
        drop(image);
        assert_eq!(studio.stats().live(), 0);
    }

    #[test]
    fn save_rejects_foreign_images() {
        let a = Studio::default();
        let b = Studio::default();
        let image = a.from_image(image::DynamicImage::new_rgb8(1, 1)).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            b.save(&image, &dir.path().join("x.png")),
            Err(ImagingError::InvalidOperation(_))
        ));
        a.save(&image, &dir.path().join("x.png")).unwrap();
    }

    #[test]
    fn versions_name_every_engine() {
        let v = versions();
        assert_eq!(v.brushwork, env!("CARGO_PKG_VERSION"));
        let text = v.to_string();
        assert!(text.contains("image"));
        assert!(text.contains("fontdue"));
    }
}
