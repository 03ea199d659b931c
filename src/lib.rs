//! # Brushwork
//!
//! Image handles that live in one of two engines and move between them only
//! when an operation needs the other one.
//!
//! # Architecture: Two Engines, One Handle
//!
//! ```text
//! load ──► Geometry (image crate)   resize, crop, rotate, composite, encode
//!              │  ▲
//!         PNG  ▼  │  PNG            lossless, at the source bit depth
//!              │  │
//!          Typography (16-bit canvas) draw text: fonts, kerning, stroke, shadow
//! ```
//!
//! An [`imaging::ImageHandle`] routes every operation to the engine that can
//! do it. Switching engines costs one encode and one decode through PNG, so
//! 8-bit and 16-bit pixels survive any number of switches unchanged. A chain
//! of geometry operations never touches the typography engine, and repeated
//! text draws never touch the geometry engine.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`studio`] | Entry point: owns one engine pair, loads and saves images |
//! | [`imaging`] | Engines, the routing handle, compositing and font lookup |
//! | [`config`] | `brushwork.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Native Resources Are Owned, Not Counted By Hand
//!
//! Every engine image carries a lease that is released exactly once when it
//! drops. Replacing a handle's payload during a conversion, failing halfway
//! through a composite, or shutting the studio down all release through the
//! same path. [`imaging::EngineStats`] exposes the counters so tests can
//! check that nothing leaks.
//!
//! ## One Lock Per Handle
//!
//! Conversion replaces a handle's payload in place, so each handle guards its
//! payload with a mutex. Distinct handles share nothing mutable and can be
//! processed on separate threads. Compositing an image with itself locks the
//! operands one after another, never both at once.
//!
//! ## Text Mutates In Place
//!
//! `draw_text` paints onto the handle it is called on and returns the same
//! image. Every other operation returns a new handle and leaves its input
//! untouched.

pub mod config;
pub mod imaging;
pub mod output;
pub mod studio;

pub use studio::{Studio, Versions, versions};

#[cfg(test)]
pub(crate) mod test_helpers;
