//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Gravity, TextAlign};

/// Calculate per-axis scale factors for a resize request.
///
/// When `height` is omitted the aspect ratio is preserved, so both factors
/// equal `width / source_width`.
///
/// # Examples
/// ```
/// # use brushwork::imaging::calculations::calculate_scale;
/// assert_eq!(calculate_scale((100, 50), 200, None), (2.0, 2.0));
/// assert_eq!(calculate_scale((100, 50), 50, Some(100)), (0.5, 2.0));
/// ```
pub fn calculate_scale(source: (u32, u32), width: u32, height: Option<u32>) -> (f64, f64) {
    let (src_w, src_h) = source;
    let hscale = width as f64 / src_w as f64;
    let vscale = match height {
        Some(h) => h as f64 / src_h as f64,
        None => hscale,
    };
    (hscale, vscale)
}

/// Apply a scale factor to one edge, never producing a zero-length edge.
pub fn scaled_edge(length: u32, scale: f64) -> u32 {
    ((length as f64 * scale).round() as u32).max(1)
}

/// Bounding box of a `width`×`height` rectangle rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let w = width as f64 * cos + height as f64 * sin;
    let h = width as f64 * sin + height as f64 * cos;
    // Trim float noise so 90° on 10×20 is 20×10, not 21×11.
    let snap = |v: f64| (v - 1e-9).ceil().max(1.0) as u32;
    (snap(w), snap(h))
}

/// Top-left corner of a `block` placed on a `canvas` by gravity.
///
/// The `offset` pushes the block inward from the anchored edges: for East
/// gravities a positive `x` moves left, for South gravities a positive `y`
/// moves up. Centered axes add the offset directly.
///
/// [`Gravity::None`] has no anchor; callers handle it before calling this.
pub fn gravity_origin(
    gravity: Gravity,
    canvas: (u32, u32),
    block: (u32, u32),
    offset: (i64, i64),
) -> (i64, i64) {
    let (cw, ch) = (canvas.0 as i64, canvas.1 as i64);
    let (bw, bh) = (block.0 as i64, block.1 as i64);
    let (ox, oy) = offset;

    let x = match gravity {
        Gravity::NorthWest | Gravity::West | Gravity::SouthWest | Gravity::None => ox,
        Gravity::North | Gravity::Center | Gravity::South => ((cw - bw) / 2).saturating_add(ox),
        Gravity::NorthEast | Gravity::East | Gravity::SouthEast => (cw - bw).saturating_sub(ox),
    };
    let y = match gravity {
        Gravity::NorthWest | Gravity::North | Gravity::NorthEast | Gravity::None => oy,
        Gravity::West | Gravity::Center | Gravity::East => ((ch - bh) / 2).saturating_add(oy),
        Gravity::SouthWest | Gravity::South | Gravity::SouthEast => (ch - bh).saturating_sub(oy),
    };
    (x, y)
}

/// Horizontal offset of a line inside a block of `block_width`.
pub fn line_offset(align: TextAlign, block_width: f32, line_width: f32) -> f32 {
    match align {
        TextAlign::Left => 0.0,
        TextAlign::Center => (block_width - line_width) / 2.0,
        TextAlign::Right => block_width - line_width,
    }
}

/// Window of `target` size centered in `source`.
pub fn centre_window(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    (
        (source.0.saturating_sub(target.0)) / 2,
        (source.1.saturating_sub(target.1)) / 2,
    )
}

/// Overlap between a `src` rectangle placed at `offset` and a `dst` canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute which part of `src` lands on `dst` when pasted at `offset`.
///
/// Returns `None` when nothing overlaps; offsets may be negative or far past
/// the canvas.
pub fn clip_overlap(src: (u32, u32), dst: (u32, u32), offset: (i64, i64)) -> Option<Overlap> {
    let (sw, sh) = (src.0 as i64, src.1 as i64);
    let (dw, dh) = (dst.0 as i64, dst.1 as i64);
    let (ox, oy) = offset;

    let left = ox.max(0);
    let top = oy.max(0);
    let right = ox.saturating_add(sw).min(dw);
    let bottom = oy.saturating_add(sh).min(dh);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Overlap {
        src_x: (left - ox) as u32,
        src_y: (top - oy) as u32,
        dst_x: left as u32,
        dst_y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_preserves_aspect_without_height() {
        assert_eq!(calculate_scale((1, 1), 8, None), (8.0, 8.0));
        assert_eq!(calculate_scale((400, 300), 200, None), (0.5, 0.5));
    }

    #[test]
    fn scale_independent_axes() {
        assert_eq!(calculate_scale((400, 300), 200, Some(600)), (0.5, 2.0));
    }

    #[test]
    fn scaled_edge_never_zero() {
        assert_eq!(scaled_edge(10, 0.01), 1);
        assert_eq!(scaled_edge(1, 8.0), 8);
        assert_eq!(scaled_edge(3, 0.5), 2);
    }

    #[test]
    fn rotated_bounds_right_angles() {
        assert_eq!(rotated_bounds(10, 20, 90.0), (20, 10));
        assert_eq!(rotated_bounds(10, 20, 180.0), (10, 20));
        assert_eq!(rotated_bounds(10, 20, 0.0), (10, 20));
    }

    #[test]
    fn rotated_bounds_diagonal_grows() {
        let (w, h) = rotated_bounds(100, 100, 45.0);
        assert_eq!((w, h), (142, 142));
    }

    #[test]
    fn gravity_corners() {
        let canvas = (100, 50);
        let block = (20, 10);
        assert_eq!(
            gravity_origin(Gravity::NorthWest, canvas, block, (0, 0)),
            (0, 0)
        );
        assert_eq!(
            gravity_origin(Gravity::SouthEast, canvas, block, (5, 5)),
            (75, 35)
        );
        assert_eq!(
            gravity_origin(Gravity::Center, canvas, block, (0, 0)),
            (40, 20)
        );
        assert_eq!(
            gravity_origin(Gravity::North, canvas, block, (0, 3)),
            (40, 3)
        );
    }

    #[test]
    fn gravity_saturates_at_extreme_offsets() {
        let (canvas, block) = ((100, 50), (20, 10));
        assert_eq!(
            gravity_origin(Gravity::Center, canvas, block, (i64::MAX, i64::MIN)),
            (i64::MAX, i64::MIN)
        );
        assert_eq!(
            gravity_origin(Gravity::SouthEast, canvas, block, (i64::MIN, i64::MAX)),
            (i64::MAX, i64::MIN)
        );
    }

    #[test]
    fn line_offsets() {
        assert_eq!(line_offset(TextAlign::Left, 100.0, 40.0), 0.0);
        assert_eq!(line_offset(TextAlign::Center, 100.0, 40.0), 30.0);
        assert_eq!(line_offset(TextAlign::Right, 100.0, 40.0), 60.0);
    }

    #[test]
    fn centre_window_of_smaller_target() {
        assert_eq!(centre_window((100, 80), (50, 40)), (25, 20));
        assert_eq!(centre_window((10, 10), (20, 20)), (0, 0));
    }

    #[test]
    fn overlap_inside() {
        let o = clip_overlap((4, 4), (10, 10), (2, 3)).unwrap();
        assert_eq!(
            o,
            Overlap {
                src_x: 0,
                src_y: 0,
                dst_x: 2,
                dst_y: 3,
                width: 4,
                height: 4
            }
        );
    }

    #[test]
    fn overlap_negative_offset_clips_source() {
        let o = clip_overlap((4, 4), (10, 10), (-1, -2)).unwrap();
        assert_eq!((o.src_x, o.src_y), (1, 2));
        assert_eq!((o.dst_x, o.dst_y), (0, 0));
        assert_eq!((o.width, o.height), (3, 2));
    }

    #[test]
    fn overlap_larger_source_is_clipped_to_canvas() {
        let o = clip_overlap((20, 20), (10, 10), (0, 0)).unwrap();
        assert_eq!((o.width, o.height), (10, 10));
    }

    #[test]
    fn overlap_entirely_outside() {
        assert_eq!(clip_overlap((4, 4), (10, 10), (10, 0)), None);
        assert_eq!(clip_overlap((4, 4), (10, 10), (0, -4)), None);
        assert_eq!(clip_overlap((4, 4), (10, 10), (1000, 1000)), None);
    }

    #[test]
    fn overlap_at_extreme_offsets() {
        assert_eq!(clip_overlap((4, 4), (10, 10), (i64::MAX, 0)), None);
        assert_eq!(clip_overlap((4, 4), (10, 10), (0, i64::MAX)), None);
        assert_eq!(clip_overlap((4, 4), (10, 10), (i64::MIN, i64::MIN)), None);
        assert_eq!(clip_overlap((u32::MAX, 4), (10, 10), (i64::MAX - 1, 0)), None);
    }
}
