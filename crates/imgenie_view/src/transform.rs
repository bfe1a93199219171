//! Zoom-to-pointer and drag-to-pan mathematics.
//!
//! The transform is applied with a top-left transform origin, so a point
//! `(x, y)` in image space lands at `(x * scale + translate_x, y * scale + translate_y)`
//! relative to the image element's static layout position.

use serde::{Deserialize, Serialize};

use crate::constants::{SCALE_MAX, SCALE_MIN, ZOOM_STEP};
use crate::drag::PanDragState;

/// A 2-D point in screen or image space.
pub type Point = (f64, f64);

/// Represents scale/translate transform state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Transform {
    /// Create a new transform with the given scale and translation.
    pub fn new(scale: f64, translate_x: f64, translate_y: f64) -> Self {
        Self {
            scale,
            translate_x,
            translate_y,
        }
    }

    /// Create an identity transform (scale=1, no translation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Map a point relative to the element's static offset into image space.
    pub fn to_image(&self, rel: Point) -> Point {
        (
            (rel.0 - self.translate_x) / self.scale,
            (rel.1 - self.translate_y) / self.scale,
        )
    }

    /// Map an image-space point back to a point relative to the static offset.
    pub fn to_screen(&self, image: Point) -> Point {
        (
            image.0 * self.scale + self.translate_x,
            image.1 * self.scale + self.translate_y,
        )
    }

    /// Affine matrix in CSS `matrix(a, b, c, d, e, f)` order.
    pub fn matrix(&self) -> [f64; 6] {
        [
            self.scale,
            0.0,
            0.0,
            self.scale,
            self.translate_x,
            self.translate_y,
        ]
    }

    /// CSS transform string for the image element.
    pub fn css(&self) -> String {
        format!(
            "translate({}px, {}px) scale({})",
            self.translate_x, self.translate_y, self.scale
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Direction of a single zoom notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Interpret a wheel delta. Negative deltas (scrolling up) zoom in.
    ///
    /// Returns `None` for a zero or non-finite delta.
    pub fn from_wheel_delta(delta: f64) -> Option<Self> {
        if !delta.is_finite() || delta == 0.0 {
            None
        } else if delta < 0.0 {
            Some(ZoomDirection::In)
        } else {
            Some(ZoomDirection::Out)
        }
    }

    fn apply(self, scale: f64) -> f64 {
        let next = match self {
            ZoomDirection::In => scale * ZOOM_STEP,
            ZoomDirection::Out => scale / ZOOM_STEP,
        };
        next.clamp(SCALE_MIN, SCALE_MAX)
    }
}

/// Interactive pan/zoom state for the result image.
#[derive(Debug, Clone, Default)]
pub struct ViewportTransform {
    transform: Transform,
    drag: PanDragState,
}

impl ViewportTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current transform.
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn scale(&self) -> f64 {
        self.transform.scale
    }

    pub fn translation(&self) -> Point {
        (self.transform.translate_x, self.transform.translate_y)
    }

    /// Whether a pan drag is in progress.
    pub fn is_panning(&self) -> bool {
        self.drag.is_dragging()
    }

    /// Zoom one notch at the pointer, keeping the image point under it fixed.
    ///
    /// `offset` is the image element's static layout offset inside the
    /// viewport (unaffected by the current transform). Returns `true` if the
    /// transform changed.
    pub fn zoom_at_pointer(&mut self, pointer: Point, offset: Point, wheel_delta: f64) -> bool {
        match ZoomDirection::from_wheel_delta(wheel_delta) {
            Some(direction) => self.zoom(pointer, offset, direction),
            None => false,
        }
    }

    /// Zoom one notch in `direction` anchored at `pointer`.
    pub fn zoom(&mut self, pointer: Point, offset: Point, direction: ZoomDirection) -> bool {
        let new_scale = direction.apply(self.transform.scale);
        if new_scale == self.transform.scale {
            return false;
        }

        let rel = (pointer.0 - offset.0, pointer.1 - offset.1);
        let (xs, ys) = self.transform.to_image(rel);

        self.transform = Transform {
            scale: new_scale,
            translate_x: rel.0 - xs * new_scale,
            translate_y: rel.1 - ys * new_scale,
        };
        log::trace!(
            "Viewport zoom {:?} -> scale {:.3} at ({:.1}, {:.1})",
            direction,
            new_scale,
            rel.0,
            rel.1
        );
        true
    }

    /// Zoom one notch anchored at the centre of a viewport of `size`.
    pub fn zoom_centered(&mut self, size: Point, direction: ZoomDirection) -> bool {
        self.zoom((size.0 / 2.0, size.1 / 2.0), (0.0, 0.0), direction)
    }

    /// Drag-to-pan.
    ///
    /// With `is_drag_start` the drag anchor is recorded; otherwise, while a
    /// drag is active, the translation follows the pointer. Translation is
    /// not clamped. Returns `true` if the transform changed.
    pub fn pan(&mut self, pointer: Point, is_drag_start: bool) -> bool {
        if is_drag_start {
            self.drag.start_drag((
                pointer.0 - self.transform.translate_x,
                pointer.1 - self.transform.translate_y,
            ));
            return false;
        }

        let Some(anchor) = self.drag.anchor() else {
            return false;
        };

        let translate_x = pointer.0 - anchor.0;
        let translate_y = pointer.1 - anchor.1;
        let changed =
            translate_x != self.transform.translate_x || translate_y != self.transform.translate_y;
        self.transform.translate_x = translate_x;
        self.transform.translate_y = translate_y;
        changed
    }

    /// End the current drag, wherever the pointer was released.
    pub fn end_pan(&mut self) {
        self.drag.stop_drag();
    }

    /// Back to scale 1 with no translation. Returns `true` if anything changed.
    pub fn reset(&mut self) -> bool {
        self.drag.stop_drag();
        let changed = self.transform != Transform::identity();
        self.transform = Transform::identity();
        changed
    }

    /// CSS transform string for the current state.
    pub fn css_transform(&self) -> String {
        self.transform.css()
    }
}
