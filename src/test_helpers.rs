//! Shared test utilities for the brushwork test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let image = image::open(fixtures_dir().join("alpha-1x1.png")).unwrap();
//! let font = FontSpec::File(fixture_font());
//! ```

use std::path::PathBuf;

// =========================================================================
// Fixture paths
// =========================================================================

/// The checked-in `fixtures/` directory.
///
/// Holds `alpha-1x1.png` (one RGBA8 pixel, `[200, 40, 90, 128]`) and
/// `fonts/DejaVuSansMono.ttf`. Tests only read from it.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Path to the bundled monospace font.
pub fn fixture_font() -> PathBuf {
    fixtures_dir().join("fonts/DejaVuSansMono.ttf")
}
