//! The routing core: one image, held by exactly one engine at a time.
//!
//! An [`ImageHandle`] wraps a [`Payload`] behind a mutex. Every operation
//! locks it, converts the payload to the engine the operation needs (at
//! most once, see [`convert`](super::convert)) and runs the primitive while
//! still holding the lock, so two threads sharing a handle can never both
//! decide to convert.
//!
//! Geometry operations return a new handle and leave the receiver's pixels
//! alone. [`ImageHandle::draw_text`] is the exception: it draws into the
//! receiver and returns the same handle, so a chain continuing from it
//! aliases the original image.
//!
//! Metadata reads use whichever engine is active and never convert.

use super::backend::{Backend, EngineImage, ImagingError, NativeId, Result};
use super::calculations::calculate_scale;
use super::composite::{self, CompositeOptions};
use super::convert;
use super::engines::Engines;
use super::fonts::FontSpec;
use super::geometry::GeometryHandle;
use super::params::{
    Angle, Color, ColorSpace, Direction, Gravity, Interesting, Kernel, OutputFormat, SaveOptions,
    TextAlign,
};
use super::typography::{DrawingContext, Shadow, Stroke, TypographyHandle};
use image::DynamicImage;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::path::Path;
use std::sync::Arc;

/// The engine-specific image an [`ImageHandle`] currently holds.
#[derive(Debug)]
pub(crate) enum Payload {
    Geometry(GeometryHandle),
    Typography(TypographyHandle),
}

impl Payload {
    fn backend(&self) -> Backend {
        match self {
            Payload::Geometry(_) => Backend::Geometry,
            Payload::Typography(_) => Backend::Typography,
        }
    }

    fn engine(&self) -> &dyn EngineImage {
        match self {
            Payload::Geometry(g) => g,
            Payload::Typography(t) => t,
        }
    }

    fn native_id(&self) -> NativeId {
        match self {
            Payload::Geometry(g) => g.lease().id(),
            Payload::Typography(t) => t.lease().id(),
        }
    }

    /// Build the equivalent payload in `target`. `self` is untouched.
    fn convert(&self, target: Backend) -> Result<Payload> {
        match (self, target) {
            (Payload::Geometry(g), Backend::Typography) => {
                Ok(Payload::Typography(convert::to_typography(g)?))
            }
            (Payload::Typography(t), Backend::Geometry) => {
                Ok(Payload::Geometry(convert::to_geometry(t)?))
            }
            (payload, target) => Err(ImagingError::InvalidOperation(format!(
                "image is already in the {target} engine ({} payload)",
                payload.backend()
            ))),
        }
    }
}

#[derive(Debug)]
struct Inner {
    engines: Arc<Engines>,
    payload: Mutex<Payload>,
}

/// Resize target. Without `height` the aspect ratio is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: Option<u32>,
    pub kernel: Kernel,
}

impl ResizeOptions {
    pub fn width(width: u32) -> Self {
        Self {
            width,
            height: None,
            kernel: Kernel::default(),
        }
    }

    pub fn exact(width: u32, height: u32) -> Self {
        Self {
            width,
            height: Some(height),
            kernel: Kernel::default(),
        }
    }
}

/// Everything [`ImageHandle::draw_text`] needs besides the text itself.
///
/// Unset `font`, `size` and `antialias` fall back to the studio's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub font: Option<FontSpec>,
    pub size: Option<f32>,
    pub kerning: f32,
    pub antialias: Option<bool>,
    pub gravity: Gravity,
    pub align: TextAlign,
    pub fill: Color,
    pub stroke: Option<Stroke>,
    pub shadow: Option<Shadow>,
    pub x: i64,
    pub y: i64,
    pub angle: f64,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font: None,
            size: None,
            kerning: 0.0,
            antialias: None,
            gravity: Gravity::None,
            align: TextAlign::Left,
            fill: Color::BLACK,
            stroke: None,
            shadow: None,
            x: 0,
            y: 0,
            angle: 0.0,
        }
    }
}

/// An image that moves between engines as operations require.
///
/// Cloning shares the same image: both clones see the same pixels and
/// backend.
#[derive(Clone)]
pub struct ImageHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("ImageHandle");
        match self.inner.payload.try_lock() {
            Some(payload) => s
                .field("backend", &payload.backend())
                .field("width", &payload.engine().width())
                .field("height", &payload.engine().height()),
            None => s.field("backend", &"<locked>"),
        };
        s.finish()
    }
}

impl ImageHandle {
    pub(crate) fn from_geometry(engines: &Arc<Engines>, geometry: GeometryHandle) -> Self {
        Self::from_payload(engines, Payload::Geometry(geometry))
    }

    fn from_payload(engines: &Arc<Engines>, payload: Payload) -> Self {
        Self {
            inner: Arc::new(Inner {
                engines: Arc::clone(engines),
                payload: Mutex::new(payload),
            }),
        }
    }

    /// Wrap an already decoded image. Empty and float images are rejected.
    pub fn from_image(engines: &Arc<Engines>, image: DynamicImage) -> Result<Self> {
        engines.check_active()?;
        let geometry = GeometryHandle::from_image(engines.stats(), image)?;
        Ok(Self::from_geometry(engines, geometry))
    }

    pub(crate) fn engines(&self) -> &Arc<Engines> {
        &self.inner.engines
    }

    /// Lock the payload, converting it to `backend` first if needed.
    ///
    /// On failure the previous payload stays in place.
    fn lock_ensured(&self, backend: Backend) -> Result<MutexGuard<'_, Payload>> {
        self.inner.engines.check_active()?;
        let mut payload = self.inner.payload.lock();
        if payload.backend() != backend {
            let from = payload.backend();
            let converted = payload.convert(backend)?;
            let previous = std::mem::replace(&mut *payload, converted);
            drop(previous);
            self.inner.engines.stats().record_conversion();
            log::debug!("image moved from {from} to {backend} engine");
        }
        Ok(payload)
    }

    /// Make `backend` the engine holding this image. A no-op if it already is.
    pub fn ensure(&self, backend: Backend) -> Result<()> {
        self.lock_ensured(backend).map(drop)
    }

    pub(crate) fn geometry(&self) -> Result<MappedMutexGuard<'_, GeometryHandle>> {
        let guard = self.lock_ensured(Backend::Geometry)?;
        MutexGuard::try_map(guard, |payload| match payload {
            Payload::Geometry(g) => Some(g),
            Payload::Typography(_) => None,
        })
        .map_err(|_| ImagingError::ConversionFailed("geometry payload missing after ensure".into()))
    }

    fn typography(&self) -> Result<MappedMutexGuard<'_, TypographyHandle>> {
        let guard = self.lock_ensured(Backend::Typography)?;
        MutexGuard::try_map(guard, |payload| match payload {
            Payload::Typography(t) => Some(t),
            Payload::Geometry(_) => None,
        })
        .map_err(|_| {
            ImagingError::ConversionFailed("typography payload missing after ensure".into())
        })
    }

    /// Run a geometry primitive and wrap its result in a new handle.
    fn derive<F>(&self, op: F) -> Result<ImageHandle>
    where
        F: FnOnce(&GeometryHandle) -> Result<GeometryHandle>,
    {
        let result = {
            let geometry = self.geometry()?;
            op(&geometry)?
        };
        Ok(Self::from_geometry(&self.inner.engines, result))
    }

    fn read<T>(&self, f: impl FnOnce(&dyn EngineImage) -> T) -> Result<T> {
        self.inner.engines.check_active()?;
        let payload = self.inner.payload.lock();
        Ok(f(payload.engine()))
    }

    // =====================================================================
    // Identity and metadata
    // =====================================================================

    /// The engine currently holding the pixels.
    pub fn backend(&self) -> Backend {
        self.inner.payload.lock().backend()
    }

    /// Identity of the native engine handle currently held.
    pub fn payload_id(&self) -> NativeId {
        self.inner.payload.lock().native_id()
    }

    /// Whether both handles are the same image (not merely equal pixels).
    pub fn same_image(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn width(&self) -> Result<u32> {
        self.read(|e| e.width())
    }

    pub fn height(&self) -> Result<u32> {
        self.read(|e| e.height())
    }

    /// Channels of the logical layout: 1 gray, 2 gray+alpha, 3 rgb, 4 rgba.
    pub fn channels(&self) -> Result<u8> {
        self.read(|e| e.channels())
    }

    pub fn has_alpha(&self) -> Result<bool> {
        self.read(|e| e.has_alpha())
    }

    // =====================================================================
    // Geometry operations
    // =====================================================================

    pub fn resize(&self, options: ResizeOptions) -> Result<ImageHandle> {
        if options.width == 0 || options.height == Some(0) {
            return Err(ImagingError::InvalidOperation(
                "resize target must not be empty".into(),
            ));
        }
        self.derive(|g| {
            let (hscale, vscale) =
                calculate_scale((g.width(), g.height()), options.width, options.height);
            g.resize(hscale, vscale, options.kernel)
        })
    }

    pub fn crop(&self, left: u32, top: u32, width: u32, height: u32) -> Result<ImageHandle> {
        self.derive(|g| g.extract_area(left, top, width, height))
    }

    pub fn smart_crop(
        &self,
        width: u32,
        height: u32,
        interesting: Interesting,
    ) -> Result<ImageHandle> {
        self.derive(|g| g.smartcrop(width, height, interesting))
    }

    /// Rotate clockwise by a right angle.
    pub fn rotate(&self, angle: Angle) -> Result<ImageHandle> {
        self.derive(|g| g.rot(angle))
    }

    /// Rotate clockwise by any angle onto a `background`-filled bounding box.
    pub fn rotate_by(&self, degrees: f64, background: Color) -> Result<ImageHandle> {
        self.derive(|g| g.rotate(degrees, background))
    }

    pub fn flip(&self, direction: Direction) -> Result<ImageHandle> {
        self.derive(|g| g.flip(direction))
    }

    /// Apply the EXIF orientation read at load time.
    pub fn auto_orient(&self) -> Result<ImageHandle> {
        self.derive(GeometryHandle::autorot)
    }

    pub fn embed(
        &self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<ImageHandle> {
        self.derive(|g| g.embed(x, y, width, height, background))
    }

    pub fn add_alpha(&self) -> Result<ImageHandle> {
        self.derive(GeometryHandle::add_alpha)
    }

    pub fn flatten(&self, background: Color) -> Result<ImageHandle> {
        self.derive(|g| g.flatten(background))
    }

    pub fn colourspace(&self, space: ColorSpace) -> Result<ImageHandle> {
        self.derive(|g| g.colourspace(space))
    }

    /// Crop away the border matching the top-left pixel within `threshold`
    /// (8-bit units). An image that is all border comes back unchanged.
    pub fn trim(&self, threshold: f64) -> Result<ImageHandle> {
        self.derive(|g| match g.find_trim(threshold) {
            Some((left, top, width, height)) => g.extract_area(left, top, width, height),
            None => g.copy(),
        })
    }

    /// Re-encode through `format` and decode the result, e.g. to bake in
    /// JPEG quantization or drop to 8-bit.
    pub fn convert_format(
        &self,
        format: OutputFormat,
        options: &SaveOptions,
    ) -> Result<ImageHandle> {
        self.derive(|g| {
            let bytes = g.encode(format, options)?;
            GeometryHandle::load_buffer(g.lease().stats(), &bytes)
        })
    }

    pub fn composite(
        &self,
        overlay: &ImageHandle,
        options: &CompositeOptions,
    ) -> Result<ImageHandle> {
        composite::composite(self, overlay, options)
    }

    // =====================================================================
    // Text
    // =====================================================================

    /// Draw `text` into this image and return the same handle.
    ///
    /// Unlike every other operation this mutates the receiver: the returned
    /// handle is `self`, so `same_image` holds between the two.
    pub fn draw_text(&self, text: &str, options: &TextOptions) -> Result<ImageHandle> {
        self.inner.engines.check_active()?;
        let engines = &self.inner.engines;
        let defaults = engines.text_defaults();
        let font = engines.fonts().resolve(options.font.as_ref())?;
        let ctx = DrawingContext::new(font, options.size.unwrap_or(defaults.size))?
            .with_kerning(options.kerning)
            .with_antialias(options.antialias.unwrap_or(defaults.antialias))
            .with_gravity(options.gravity)
            .with_align(options.align)
            .with_fill(options.fill)
            .with_stroke(options.stroke)
            .with_shadow(options.shadow);

        {
            let mut typography = self.typography()?;
            typography.annotate(&ctx, options.x, options.y, options.angle, text)?;
        }
        Ok(self.clone())
    }

    // =====================================================================
    // Output
    // =====================================================================

    /// Encode to `format`. PNG comes from whichever engine holds the image;
    /// other formats move it to the geometry engine.
    pub fn to_buffer(&self, format: OutputFormat, options: &SaveOptions) -> Result<Vec<u8>> {
        if format == OutputFormat::Png {
            self.inner.engines.check_active()?;
            let payload = self.inner.payload.lock();
            if let Payload::Typography(t) = &*payload {
                return t.encode_png(options.compression);
            }
        }
        self.geometry()?.encode(format, options)
    }

    /// Write to `path`, choosing the format from its extension. Routed like
    /// [`to_buffer`](Self::to_buffer).
    pub fn to_file(&self, path: &Path, options: &SaveOptions) -> Result<()> {
        let format = OutputFormat::from_path(path).ok_or_else(|| {
            ImagingError::UnsupportedFormat(format!(
                "cannot infer an output format from {}",
                path.display()
            ))
        })?;
        if format == OutputFormat::Png {
            self.inner.engines.check_active()?;
            let payload = self.inner.payload.lock();
            if let Payload::Typography(t) = &*payload {
                return t.save(path, options.compression);
            }
        }
        self.geometry()?.save(path, format, options)
    }

    /// A copy of the pixels as an `image` crate buffer.
    pub fn to_image(&self) -> Result<DynamicImage> {
        Ok(self.geometry()?.image().clone())
    }
}
