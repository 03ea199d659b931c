//! CLI output formatting.
//!
//! Output is **image-centric**: each line leads with the file it is about,
//! followed by indented detail lines.
//!
//! # Output Format
//!
//! ## Info
//!
//! ```text
//! photo.png
//!     Size: 640x480
//!     Channels: 4 (rgba)
//! ```
//!
//! ## Batch (watermark)
//!
//! ```text
//! 001 beach.jpg → out/beach.jpg (1920x1080)
//! 002 broken.jpg
//!     Error: Load failed: ...
//!
//! Watermarked 1 image, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::imaging::StatsSnapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn layout_name(channels: u8) -> &'static str {
    match channels {
        1 => "gray",
        2 => "gray+alpha",
        3 => "rgb",
        4 => "rgba",
        _ => "unknown",
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Dimensions and layout of one image, as shown by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

pub fn format_info(summary: &ImageSummary) -> Vec<String> {
    vec![
        file_name(&summary.path),
        format!("    Size: {}x{}", summary.width, summary.height),
        format!(
            "    Channels: {} ({})",
            summary.channels,
            layout_name(summary.channels)
        ),
    ]
}

pub fn print_info(summary: &ImageSummary) {
    for line in format_info(summary) {
        println!("{}", line);
    }
}

/// Machine-readable `info` output: one JSON array for all inputs.
pub fn format_info_json(summaries: &[ImageSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summaries)
}

/// One line for a single written output.
pub fn format_written(output: &Path, width: u32, height: u32) -> String {
    format!("{} ({}x{})", output.display(), width, height)
}

/// Result of one input in a batch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Written {
        output: PathBuf,
        width: u32,
        height: u32,
    },
    Failed(String),
}

/// Format batch results in input order, followed by a summary line.
pub fn format_batch(verb: &str, results: &[(PathBuf, BatchOutcome)]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut failed = 0;
    for (i, (input, outcome)) in results.iter().enumerate() {
        match outcome {
            BatchOutcome::Written {
                output,
                width,
                height,
            } => lines.push(format!(
                "{} {} → {}",
                format_index(i + 1),
                file_name(input),
                format_written(output, *width, *height)
            )),
            BatchOutcome::Failed(error) => {
                failed += 1;
                lines.push(format!("{} {}", format_index(i + 1), file_name(input)));
                lines.push(format!("    Error: {}", error));
            }
        }
    }
    lines.push(String::new());
    let written = results.len() - failed;
    let mut summary = format!("{} {}", verb, plural(written, "image"));
    if failed > 0 {
        summary.push_str(&format!(", {} failed", failed));
    }
    lines.push(summary);
    lines
}

pub fn print_batch(verb: &str, results: &[(PathBuf, BatchOutcome)]) {
    for line in format_batch(verb, results) {
        println!("{}", line);
    }
}

/// Native handle counters, shown with `--stats`.
pub fn format_stats(stats: &StatsSnapshot) -> Vec<String> {
    vec![
        "Engine handles".to_string(),
        format!(
            "    geometry: {} created, {} released",
            stats.geometry_created, stats.geometry_released
        ),
        format!(
            "    typography: {} created, {} released",
            stats.typography_created, stats.typography_released
        ),
        format!("    conversions: {}", stats.conversions),
    ]
}

pub fn print_stats(stats: &StatsSnapshot) {
    for line in format_stats(stats) {
        eprintln!("{}", line);
    }
}
