use brushwork::config::{self, EngineConfig};
use brushwork::imaging::{
    Angle, BlendMode, Color, CompositeOptions, FontSpec, Gravity, ImageHandle, Interesting,
    Kernel, ResizeOptions, Shadow, Stroke, TextAlign, TextOptions,
};
use brushwork::output::{self, BatchOutcome, ImageSummary};
use brushwork::{Studio, versions};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    // Leaked once at startup, called exactly once
    Box::leak(versions().to_string().into_boxed_str())
}

#[derive(Parser)]
#[command(name = "brushwork")]
#[command(about = "Resize, crop, composite and caption images")]
#[command(long_about = "\
Resize, crop, composite and caption images

Geometry operations run on the `image` engine, text runs on a 16-bit
typography canvas. Images move between the two losslessly and only when an
operation needs the other engine.

Settings come from --config, else ./brushwork.toml, else built-in defaults.
Run 'brushwork gen-config' to generate a documented brushwork.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./brushwork.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print native handle counters to stderr when done
    #[arg(long, global = true)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

/// Text placement and ink shared by `text` and `watermark`.
#[derive(clap::Args, Clone)]
struct TextArgs {
    /// Text to draw; `\n` starts a new line
    #[arg(long)]
    text: String,

    /// Font family name or font file path
    #[arg(long)]
    font: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    size: Option<f32>,

    /// Extra space between glyphs in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    kerning: f32,

    /// Anchor: none, north, northeast, ..., center
    #[arg(long, default_value = "none", value_parser = parse_gravity)]
    gravity: Gravity,

    /// Line alignment: left, center or right
    #[arg(long, default_value = "left", value_parser = parse_align)]
    align: TextAlign,

    #[arg(long, default_value = "black", value_parser = parse_color)]
    fill: Color,

    /// Outline color
    #[arg(long, value_parser = parse_color)]
    stroke: Option<Color>,

    #[arg(long, default_value_t = 1.0)]
    stroke_width: f32,

    /// Drop shadow color
    #[arg(long, value_parser = parse_color)]
    shadow: Option<Color>,

    #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
    shadow_offset: i32,

    /// Shadow blur sigma in pixels
    #[arg(long, default_value_t = 0)]
    shadow_blur: u32,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    x: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    y: i64,

    /// Rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    angle: f64,
}

impl TextArgs {
    fn options(&self) -> TextOptions {
        TextOptions {
            font: self.font.as_deref().map(FontSpec::parse),
            size: self.size,
            kerning: self.kerning,
            gravity: self.gravity,
            align: self.align,
            fill: self.fill,
            stroke: self.stroke.map(|color| Stroke {
                color,
                width: self.stroke_width,
            }),
            shadow: self.shadow.map(|color| Shadow {
                color,
                offset: (self.shadow_offset, self.shadow_offset),
                blur: self.shadow_blur,
            }),
            x: self.x,
            y: self.y,
            angle: self.angle,
            ..TextOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print size and channel layout of images
    Info {
        inputs: Vec<PathBuf>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Resize to a width, keeping aspect ratio unless --height is given
    Resize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long, default_value = "lanczos3", value_parser = parse_kernel)]
        kernel: Kernel,
    },
    /// Cut out a region, or let --smart pick one
    Crop {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value_t = 0)]
        left: u32,
        #[arg(long, default_value_t = 0)]
        top: u32,
        /// centre, entropy or attention
        #[arg(long, value_parser = parse_interesting)]
        smart: Option<Interesting>,
    },
    /// Rotate by any angle; right angles are exact
    Rotate {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        degrees: f64,
        /// Fill for corners exposed by arbitrary angles
        #[arg(long, default_value = "transparent", value_parser = parse_color)]
        background: Color,
    },
    /// Draw text onto an image
    Text {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        text: TextArgs,
    },
    /// Layer one image over another
    Composite {
        base: PathBuf,
        overlay: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        x: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        y: i64,
        /// over, add or multiply
        #[arg(long, default_value = "over", value_parser = parse_blend)]
        mode: BlendMode,
        #[arg(long, default_value_t = 1.0)]
        opacity: f64,
    },
    /// Caption many images in parallel into a directory
    Watermark {
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
        #[command(flatten)]
        text: TextArgs,
    },
    /// Print a stock brushwork.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let engine_config = load_engine_config(cli.config.as_deref())?;
    let studio = Studio::new(&engine_config);

    match &cli.command {
        Command::Info { inputs, json } => {
            let mut summaries = Vec::with_capacity(inputs.len());
            for input in inputs {
                summaries.push(summarize(&studio, input)?);
            }
            if *json {
                println!("{}", output::format_info_json(&summaries)?);
            } else {
                for summary in &summaries {
                    output::print_info(summary);
                }
            }
        }
        Command::Resize {
            input,
            output,
            width,
            height,
            kernel,
        } => {
            let options = ResizeOptions {
                width: *width,
                height: *height,
                kernel: *kernel,
            };
            let resized = studio.load(input)?.resize(options)?;
            write(&studio, &resized, output)?;
        }
        Command::Crop {
            input,
            output,
            width,
            height,
            left,
            top,
            smart,
        } => {
            let image = studio.load(input)?;
            let cropped = match smart {
                Some(interesting) => image.smart_crop(*width, *height, *interesting)?,
                None => image.crop(*left, *top, *width, *height)?,
            };
            write(&studio, &cropped, output)?;
        }
        Command::Rotate {
            input,
            output,
            degrees,
            background,
        } => {
            let image = studio.load(input)?;
            let rotated = match Angle::from_degrees(*degrees) {
                Some(angle) => image.rotate(angle)?,
                None => image.rotate_by(*degrees, *background)?,
            };
            write(&studio, &rotated, output)?;
        }
        Command::Text {
            input,
            output,
            text,
        } => {
            let image = studio.load(input)?;
            let drawn = image.draw_text(&text.text, &text.options())?;
            write(&studio, &drawn, output)?;
        }
        Command::Composite {
            base,
            overlay,
            output,
            x,
            y,
            mode,
            opacity,
        } => {
            let base = studio.load(base)?;
            let overlay = studio.load(overlay)?;
            let options = CompositeOptions::new(*mode, *opacity).at(*x, *y);
            let layered = base.composite(&overlay, &options)?;
            write(&studio, &layered, output)?;
        }
        Command::Watermark {
            inputs,
            out_dir,
            text,
        } => {
            init_thread_pool(&engine_config.processing);
            std::fs::create_dir_all(out_dir)?;
            let options = text.options();
            let results: Vec<(PathBuf, BatchOutcome)> = inputs
                .par_iter()
                .map(|input| {
                    let outcome = watermark_one(&studio, input, out_dir, &text.text, &options);
                    (input.clone(), outcome)
                })
                .collect();
            output::print_batch("Watermarked", &results);
        }
        // Printed before the engines start.
        Command::GenConfig => {}
    }

    if cli.stats {
        output::print_stats(&studio.stats());
    }
    Ok(())
}

fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, config::ConfigError> {
    match path {
        Some(path) => config::load_config(path),
        None => config::discover_config(&std::env::current_dir()?),
    }
}

fn summarize(studio: &Studio, input: &Path) -> brushwork::imaging::Result<ImageSummary> {
    let image = studio.load(input)?;
    Ok(ImageSummary {
        path: input.to_path_buf(),
        width: image.width()?,
        height: image.height()?,
        channels: image.channels()?,
    })
}

fn write(studio: &Studio, image: &ImageHandle, path: &Path) -> brushwork::imaging::Result<()> {
    studio.save(image, path)?;
    println!(
        "{}",
        output::format_written(path, image.width()?, image.height()?)
    );
    Ok(())
}

/// Each input gets its own handle, so workers never share pixels.
fn watermark_one(
    studio: &Studio,
    input: &Path,
    out_dir: &Path,
    text: &str,
    options: &TextOptions,
) -> BatchOutcome {
    let run = || -> brushwork::imaging::Result<BatchOutcome> {
        let image = studio.load(input)?;
        let drawn = image.draw_text(text, options)?;
        let name = input.file_name().unwrap_or(input.as_os_str());
        let output = out_dir.join(name);
        studio.save(&drawn, &output)?;
        Ok(BatchOutcome::Written {
            output,
            width: drawn.width()?,
            height: drawn.height()?,
        })
    };
    run().unwrap_or_else(|e| BatchOutcome::Failed(e.to_string()))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn parse_color(value: &str) -> Result<Color, String> {
    Color::parse(value).ok_or_else(|| format!("unrecognized color '{value}'"))
}

fn parse_gravity(value: &str) -> Result<Gravity, String> {
    Gravity::parse(value).ok_or_else(|| format!("unknown gravity '{value}'"))
}

fn parse_align(value: &str) -> Result<TextAlign, String> {
    match value.to_ascii_lowercase().as_str() {
        "left" => Ok(TextAlign::Left),
        "center" | "centre" => Ok(TextAlign::Center),
        "right" => Ok(TextAlign::Right),
        _ => Err(format!("unknown alignment '{value}'")),
    }
}

fn parse_kernel(value: &str) -> Result<Kernel, String> {
    Kernel::parse(value).ok_or_else(|| format!("unknown kernel '{value}'"))
}

fn parse_interesting(value: &str) -> Result<Interesting, String> {
    Interesting::parse(value).ok_or_else(|| format!("unknown strategy '{value}'"))
}

fn parse_blend(value: &str) -> Result<BlendMode, String> {
    BlendMode::parse(value).ok_or_else(|| format!("unknown blend mode '{value}'"))
}
