//! Backend identity, the shared error type, and native resource accounting.
//!
//! Two engines sit behind every [`ImageHandle`](super::ImageHandle):
//!
//! | Backend | Engine | Native resource |
//! |---|---|---|
//! | [`Backend::Geometry`] | `image` crate | one decoded `DynamicImage` |
//! | [`Backend::Typography`] | 16-bit RGBA canvas + `fontdue`/`tiny-skia` | one drawing canvas |
//!
//! Each engine handle holds a [`NativeLease`] taken from the [`EngineStats`]
//! of the engine context that created it. Dropping the handle returns the
//! lease exactly once, which is what the no-leak tests count.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Load failed: {0}")]
    LoadFailed(String),
    #[error("Backend conversion failed: {0}")]
    ConversionFailed(String),
    #[error("Geometry engine error: {0}")]
    Engine(String),
    #[error("Typography engine error: {0}")]
    Typography(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Save failed: {0}")]
    SaveFailed(String),
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),
}

/// Result type for every imaging operation.
pub type Result<T> = std::result::Result<T, ImagingError>;

/// Which engine currently holds an image's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Geometry,
    Typography,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Geometry => f.write_str("geometry"),
            Backend::Typography => f.write_str("typography"),
        }
    }
}

/// Metadata reads that both engine handles answer identically.
///
/// `channels` follows the logical interleaved layout: 1 gray, 2 gray+alpha,
/// 3 rgb, 4 rgba. Neither engine may report its internal storage layout.
pub trait EngineImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn channels(&self) -> u8;
    fn has_alpha(&self) -> bool;
}

/// Identity of one native engine resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(u64);

/// Live counters of native resources created and released by one engine context.
#[derive(Debug, Default)]
pub struct EngineStats {
    next_id: AtomicU64,
    geometry_created: AtomicU64,
    geometry_released: AtomicU64,
    typography_created: AtomicU64,
    typography_released: AtomicU64,
    conversions: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub geometry_created: u64,
    pub geometry_released: u64,
    pub typography_created: u64,
    pub typography_released: u64,
    pub conversions: u64,
}

impl StatsSnapshot {
    /// Native handles currently alive across both engines.
    pub fn live(&self) -> u64 {
        (self.geometry_created - self.geometry_released)
            + (self.typography_created - self.typography_released)
    }

    /// Native handles released across both engines.
    pub fn released(&self) -> u64 {
        self.geometry_released + self.typography_released
    }
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            geometry_created: self.geometry_created.load(Ordering::SeqCst),
            geometry_released: self.geometry_released.load(Ordering::SeqCst),
            typography_created: self.typography_created.load(Ordering::SeqCst),
            typography_released: self.typography_released.load(Ordering::SeqCst),
            conversions: self.conversions.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn record_conversion(&self) {
        self.conversions.fetch_add(1, Ordering::SeqCst);
    }

    fn counters(&self, backend: Backend) -> (&AtomicU64, &AtomicU64) {
        match backend {
            Backend::Geometry => (&self.geometry_created, &self.geometry_released),
            Backend::Typography => (&self.typography_created, &self.typography_released),
        }
    }
}

/// Ownership token for one native resource.
///
/// Not `Clone`: a lease is returned exactly once, when its owner drops.
#[derive(Debug)]
pub struct NativeLease {
    id: NativeId,
    backend: Backend,
    stats: std::sync::Arc<EngineStats>,
}

impl NativeLease {
    pub(crate) fn acquire(stats: &std::sync::Arc<EngineStats>, backend: Backend) -> Self {
        let id = NativeId(stats.next_id.fetch_add(1, Ordering::SeqCst));
        stats.counters(backend).0.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            backend,
            stats: std::sync::Arc::clone(stats),
        }
    }

    pub fn id(&self) -> NativeId {
        self.id
    }

    pub(crate) fn stats(&self) -> &std::sync::Arc<EngineStats> {
        &self.stats
    }
}

impl Drop for NativeLease {
    fn drop(&mut self) {
        self.stats
            .counters(self.backend)
            .1
            .fetch_add(1, Ordering::SeqCst);
    }
}
