//! Image handles over two engines.
//!
//! | Engine | Good at | Module |
//! |---|---|---|
//! | **Geometry** | decode/encode, resize, crop, rotate, composite | [`geometry`] |
//! | **Typography** | text with fonts, kerning, strokes, shadows | [`typography`] |
//!
//! An [`ImageHandle`] holds its pixels in exactly one engine and moves them
//! through a lossless PNG intermediate when an operation needs the other
//! one. See [`handle`] for the locking rules and [`composite`] for layering.
//!
//! The module is split into:
//! - **Calculations**: Pure functions for scale, placement and clipping math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: error type, backend identity and native resource accounting
//! - **Engines**: [`GeometryHandle`], [`TypographyHandle`] and the converter between them
//! - **Handle**: the routing [`ImageHandle`] and its operations

pub mod backend;
pub mod calculations;
pub mod composite;
mod convert;
pub mod engines;
pub mod fonts;
pub mod geometry;
pub mod handle;
pub mod layout;
mod params;
pub mod typography;

pub use backend::{Backend, EngineImage, EngineStats, ImagingError, NativeId, Result, StatsSnapshot};
pub use composite::{BlendMode, CompositeOptions};
pub use engines::{Engines, TextDefaults};
pub use fonts::{FontRegistry, FontSpec, LoadedFont};
pub use geometry::GeometryHandle;
pub use handle::{ImageHandle, ResizeOptions, TextOptions};
pub use layout::{BitDepth, ColorModel, PixelLayout};
pub use params::{
    Angle, Color, ColorSpace, Direction, Gravity, Interesting, Kernel, OutputFormat, Quality,
    SaveOptions, TextAlign,
};
pub use typography::{DrawingContext, Shadow, Stroke, TypographyHandle};
