//! Font resolution for the typography engine.
//!
//! Fonts are named either by file path or by family. Family names are
//! matched against font file stems under the configured font directories,
//! ignoring case, spaces, hyphens and a trailing `Regular`:
//! `"DejaVu Sans Mono"` finds `DejaVuSansMono.ttf` and `dejavu-sans-mono-regular.otf`.
//!
//! Parsed fonts are cached per path for the lifetime of the registry. A
//! [`LoadedFont`] keeps the file bytes for glyph outlines next to the
//! `fontdue` metrics used for layout.

use super::backend::{ImagingError, Result};
use fontdue::{Font, FontSettings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// How a caller names a font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSpec {
    Family(String),
    File(PathBuf),
}

impl FontSpec {
    /// Treat anything that looks like a path to a font file as a file,
    /// everything else as a family name.
    pub fn parse(value: &str) -> Self {
        let path = Path::new(value);
        let has_font_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| FONT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if has_font_ext || value.contains(std::path::MAIN_SEPARATOR) {
            FontSpec::File(path.to_path_buf())
        } else {
            FontSpec::Family(value.to_string())
        }
    }
}

impl std::fmt::Display for FontSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontSpec::Family(name) => write!(f, "family '{name}'"),
            FontSpec::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Default)]
pub struct FontRegistry {
    dirs: Vec<PathBuf>,
    default: Option<FontSpec>,
    loaded: Mutex<HashMap<PathBuf, Arc<LoadedFont>>>,
}

/// One parsed font file.
pub struct LoadedFont {
    data: Vec<u8>,
    metrics: Font,
}

impl LoadedFont {
    /// Parse `data` for both metrics and outlines.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let metrics = Font::from_bytes(data.as_slice(), FontSettings::default())
            .map_err(|e| ImagingError::Typography(format!("invalid font data: {e}")))?;
        ttf_parser::Face::parse(&data, 0)
            .map_err(|e| ImagingError::Typography(format!("no outline tables: {e}")))?;
        Ok(Self { data, metrics })
    }

    /// Advance widths, kerning pairs and line metrics.
    pub fn metrics(&self) -> &Font {
        &self.metrics
    }

    /// Outline access. Parsing only reads table offsets.
    pub fn face(&self) -> Result<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, 0)
            .map_err(|e| ImagingError::Typography(format!("no outline tables: {e}")))
    }

    pub fn name(&self) -> Option<&str> {
        self.metrics.name()
    }
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("name", &self.name())
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl std::fmt::Debug for FontRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRegistry")
            .field("dirs", &self.dirs)
            .field("default", &self.default)
            .field("loaded", &self.loaded.lock().len())
            .finish()
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

impl FontRegistry {
    pub fn new(dirs: Vec<PathBuf>, default: Option<FontSpec>) -> Self {
        Self {
            dirs,
            default,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn default_font(&self) -> Option<&FontSpec> {
        self.default.as_ref()
    }

    /// Resolve `spec`, falling back to the configured default.
    pub fn resolve(&self, spec: Option<&FontSpec>) -> Result<Arc<LoadedFont>> {
        let spec = spec.or(self.default.as_ref()).ok_or_else(|| {
            ImagingError::InvalidOperation(
                "no font given and no default font configured".into(),
            )
        })?;
        let path = match spec {
            FontSpec::File(path) => path.clone(),
            FontSpec::Family(family) => self.find_family(family)?,
        };
        self.load(&path)
    }

    /// Locate a font file for `family` under the font directories.
    pub fn find_family(&self, family: &str) -> Result<PathBuf> {
        let wanted = normalize(family);
        let wanted_regular = format!("{wanted}regular");
        for dir in &self.dirs {
            let found = WalkDir::new(dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .find(|path| {
                    let is_font = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| {
                            FONT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str())
                        });
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(normalize)
                        .unwrap_or_default();
                    is_font && (stem == wanted || stem == wanted_regular)
                });
            if let Some(path) = found {
                log::debug!("font family '{family}' resolved to {}", path.display());
                return Ok(path);
            }
        }
        Err(ImagingError::Typography(format!(
            "font family '{family}' not found in {} font director{}",
            self.dirs.len(),
            if self.dirs.len() == 1 { "y" } else { "ies" }
        )))
    }

    fn load(&self, path: &Path) -> Result<Arc<LoadedFont>> {
        if let Some(font) = self.loaded.lock().get(path) {
            return Ok(Arc::clone(font));
        }
        if !path.exists() {
            return Err(ImagingError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let font = LoadedFont::from_bytes(bytes).map_err(|e| {
            ImagingError::Typography(format!("failed to parse font {}: {e}", path.display()))
        })?;
        let font = Arc::new(font);
        self.loaded
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{fixture_font, fixtures_dir};

    #[test]
    fn parse_distinguishes_files_and_families() {
        assert_eq!(
            FontSpec::parse("DejaVu Sans"),
            FontSpec::Family("DejaVu Sans".into())
        );
        assert_eq!(
            FontSpec::parse("Inter.TTF"),
            FontSpec::File(PathBuf::from("Inter.TTF"))
        );
        assert!(matches!(
            FontSpec::parse("fonts/custom/Inter"),
            FontSpec::File(_)
        ));
    }

    #[test]
    fn normalize_ignores_case_and_separators() {
        assert_eq!(normalize("DejaVu Sans-Mono"), "dejavusansmono");
    }

    #[test]
    fn find_family_by_stem() {
        let registry = FontRegistry::new(vec![fixtures_dir().join("fonts")], None);
        let path = registry.find_family("DejaVu Sans Mono").unwrap();
        assert_eq!(path.file_name().unwrap(), "DejaVuSansMono.ttf");
    }

    #[test]
    fn unknown_family_is_typography_error() {
        let registry = FontRegistry::new(vec![fixtures_dir().join("fonts")], None);
        assert!(matches!(
            registry.find_family("Comic Serif Deluxe"),
            Err(ImagingError::Typography(_))
        ));
    }

    #[test]
    fn resolve_without_any_font_is_invalid() {
        let registry = FontRegistry::default();
        assert!(matches!(
            registry.resolve(None),
            Err(ImagingError::InvalidOperation(_))
        ));
    }

    #[test]
    fn resolve_uses_default_and_caches() {
        let registry = FontRegistry::new(vec![], Some(FontSpec::File(fixture_font())));
        let a = registry.resolve(None).unwrap();
        let b = registry.resolve(None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn loaded_font_exposes_metrics_and_outlines() {
        let registry = FontRegistry::new(vec![], Some(FontSpec::File(fixture_font())));
        let font = registry.resolve(None).unwrap();
        let face = font.face().unwrap();
        let glyph = face.glyph_index('A').unwrap();
        assert!(face.glyph_bounding_box(glyph).is_some());
        assert!(font.metrics().lookup_glyph_index('A') > 0);
        assert_eq!(face.units_per_em(), font.metrics().units_per_em() as u16);
    }

    #[test]
    fn resolve_missing_file_is_not_found() {
        let registry = FontRegistry::default();
        let spec = FontSpec::File(PathBuf::from("/nonexistent/font.ttf"));
        assert!(matches!(
            registry.resolve(Some(&spec)),
            Err(ImagingError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_non_font_file_is_typography_error() {
        let registry = FontRegistry::default();
        let spec = FontSpec::File(fixtures_dir().join("alpha-1x1.png"));
        assert!(matches!(
            registry.resolve(Some(&spec)),
            Err(ImagingError::Typography(_))
        ));
    }
}
