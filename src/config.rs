//! Engine configuration.
//!
//! Loaded from an optional `brushwork.toml`. Every key has a default, so a
//! config file only needs the values it changes. Unknown keys are rejected
//! to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! [fonts]
//! dirs = ["fonts"]              # Searched recursively for .ttf/.otf/.ttc
//! default = "DejaVu Sans Mono"  # Family name or font file path
//!
//! [text]
//! size = 24.0                   # Font size in pixels
//! antialias = true
//!
//! [output]
//! quality = 90                  # JPEG/AVIF quality (1-100)
//! compression = 6               # PNG compression (0-9)
//! effort = 4                    # AVIF encoder effort (0-9)
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Relative font directories are resolved against the directory holding
//! the config file.

use crate::imaging::{FontRegistry, FontSpec, Quality, SaveOptions, TextDefaults};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory when no config is given.
pub const CONFIG_FILE_NAME: &str = "brushwork.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Where fonts are found and which one to use by default.
    pub fonts: FontsConfig,
    /// Defaults for text drawing.
    pub text: TextConfig,
    /// Encoder defaults for `to_file` / `to_buffer`.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontsConfig {
    pub dirs: Vec<PathBuf>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextConfig {
    pub size: f32,
    pub antialias: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        let defaults = TextDefaults::default();
        Self {
            size: defaults.size,
            antialias: defaults.antialias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub quality: u32,
    pub compression: u8,
    pub effort: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let defaults = SaveOptions::default();
        Self {
            quality: defaults.quality.value(),
            compression: defaults.compression,
            effort: defaults.effort,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.text.size.is_finite() && self.text.size > 0.0) {
            return Err(ConfigError::Validation(
                "text.size must be a positive number".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.output.compression > 9 {
            return Err(ConfigError::Validation(
                "output.compression must be 0-9".into(),
            ));
        }
        if self.output.effort > 9 {
            return Err(ConfigError::Validation("output.effort must be 0-9".into()));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.fonts.default.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "fonts.default must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Anchor relative font paths at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for dir in &mut self.fonts.dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let Some(FontSpec::File(path)) = self.fonts.default.as_deref().map(FontSpec::parse) {
            if path.is_relative() {
                self.fonts.default = Some(base.join(path).display().to_string());
            }
        }
    }

    pub fn font_registry(&self) -> FontRegistry {
        FontRegistry::new(
            self.fonts.dirs.clone(),
            self.fonts.default.as_deref().map(FontSpec::parse),
        )
    }

    pub fn text_defaults(&self) -> TextDefaults {
        TextDefaults {
            size: self.text.size,
            antialias: self.text.antialias,
        }
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            quality: Quality::new(self.output.quality),
            compression: self.output.compression,
            effort: self.output.effort,
            ..SaveOptions::default()
        }
    }
}

/// Parse and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load a config file. Relative font paths resolve against its directory.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}

/// Load `brushwork.toml` from `dir` if it exists, else the stock defaults.
pub fn discover_config(dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        load_config(&path)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Returns a fully-commented stock `brushwork.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Brushwork Configuration
# =======================
# All options are optional. Values shown are the defaults.

[fonts]
# Directories searched recursively for .ttf, .otf and .ttc files.
# Relative paths are resolved against this file's directory.
dirs = []
# Font used when a text command names none: a family name such as
# "DejaVu Sans Mono", or a path to a font file.
# default = "DejaVu Sans Mono"

[text]
# Font size in pixels.
size = 24.0
# Smooth glyph edges. Off gives hard, single-color edges.
antialias = true

[output]
# JPEG and AVIF quality (1-100).
quality = 90
# PNG compression level (0 = fastest, 9 = smallest).
compression = 6
# AVIF encoder effort (0 = fastest, 9 = slowest).
effort = 4

[processing]
# Maximum parallel workers for batch commands. Omit for one per CPU core.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_passes_validation() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.text.size, 24.0);
        assert_eq!(config.output.quality, 90);
        assert!(config.fonts.dirs.is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let config = parse_config(
            r#"
[text]
size = 40.0
"#,
        )
        .unwrap();
        assert_eq!(config.text.size, 40.0);
        assert!(config.text.antialias);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn unknown_key_rejected() {
        let result = parse_config(
            r#"
[text]
sise = 12.0
"#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(matches!(
            parse_config("[colors]\nbackground = \"#fff\"\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        for toml in [
            "[output]\nquality = 0\n",
            "[output]\nquality = 101\n",
            "[output]\ncompression = 10\n",
            "[output]\neffort = 12\n",
            "[text]\nsize = 0.0\n",
            "[processing]\nmax_processes = 0\n",
            "[fonts]\ndefault = \"  \"\n",
        ] {
            assert!(
                matches!(parse_config(toml), Err(ConfigError::Validation(_))),
                "accepted: {toml}"
            );
        }
    }

    #[test]
    fn load_config_resolves_relative_fonts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
[fonts]
dirs = ["fonts", "/usr/share/fonts"]
default = "fonts/Custom.ttf"
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.fonts.dirs[0], tmp.path().join("fonts"));
        assert_eq!(config.fonts.dirs[1], PathBuf::from("/usr/share/fonts"));
        assert_eq!(
            config.fonts.default.as_deref(),
            Some(tmp.path().join("fonts/Custom.ttf").display().to_string().as_str())
        );
    }

    #[test]
    fn family_default_is_left_alone() {
        let mut config = parse_config("[fonts]\ndefault = \"DejaVu Sans\"\n").unwrap();
        config.resolve_paths(Path::new("/somewhere"));
        assert_eq!(config.fonts.default.as_deref(), Some("DejaVu Sans"));
    }

    #[test]
    fn discover_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(discover_config(tmp.path()).unwrap(), EngineConfig::default());

        fs::write(tmp.path().join(CONFIG_FILE_NAME), "[output]\nquality = 50\n").unwrap();
        assert_eq!(discover_config(tmp.path()).unwrap().output.quality, 50);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_config(&tmp.path().join("nope.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn save_options_follow_output_section() {
        let config = parse_config("[output]\nquality = 70\ncompression = 9\n").unwrap();
        let options = config.save_options();
        assert_eq!(options.quality.value(), 70);
        assert_eq!(options.compression, 9);
        assert!(options.lossless);
    }

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        assert_eq!(
            effective_threads(&ProcessingConfig {
                max_processes: Some(99999)
            }),
            cores
        );
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn stock_config_toml_parses_to_defaults() {
        let parsed = parse_config(stock_config_toml()).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }
}
