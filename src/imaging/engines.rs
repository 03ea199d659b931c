//! The engine context shared by every handle loaded through one studio.

use super::backend::{EngineStats, ImagingError, Result};
use super::fonts::FontRegistry;
use super::params::SaveOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Text settings used when a draw call leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextDefaults {
    pub size: f32,
    pub antialias: bool,
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self {
            size: 24.0,
            antialias: true,
        }
    }
}

#[derive(Debug)]
pub struct Engines {
    stats: Arc<EngineStats>,
    fonts: FontRegistry,
    text: TextDefaults,
    save: SaveOptions,
    active: AtomicBool,
}

impl Engines {
    pub fn new(fonts: FontRegistry, text: TextDefaults, save: SaveOptions) -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            fonts,
            text,
            save,
            active: AtomicBool::new(true),
        }
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn text_defaults(&self) -> TextDefaults {
        self.text
    }

    pub fn save_defaults(&self) -> SaveOptions {
        self.save
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fail every later operation. Native handles still drop normally.
    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log::debug!("engines shut down with {} live handle(s)", self.stats.snapshot().live());
        }
    }

    pub fn check_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ImagingError::InvalidOperation(
                "image engines have been shut down".into(),
            ))
        }
    }
}

impl Default for Engines {
    fn default() -> Self {
        Self::new(
            FontRegistry::default(),
            TextDefaults::default(),
            SaveOptions::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_sticky() {
        let engines = Engines::default();
        assert!(engines.check_active().is_ok());
        engines.shutdown();
        engines.shutdown();
        assert!(!engines.is_active());
        assert!(matches!(
            engines.check_active(),
            Err(ImagingError::InvalidOperation(_))
        ));
    }

    #[test]
    fn defaults() {
        let engines = Engines::default();
        assert_eq!(engines.text_defaults().size, 24.0);
        assert!(engines.text_defaults().antialias);
        assert_eq!(engines.save_defaults(), SaveOptions::default());
        assert_eq!(engines.stats().snapshot().live(), 0);
    }
}
