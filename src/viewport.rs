//! Result-image viewport: pointer gestures in, transform changes out.
//!
//! [`Imgenie::with_viewport`](crate::Imgenie::with_viewport) applies a
//! gesture and notifies the presenter once the controller is released.

use imgenie_view::{Point, Transform, ViewportTransform, ZoomDirection};

/// Mouse button of a press, as reported by `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

impl PointerButton {
    pub fn from_dom(button: i16) -> Self {
        match button {
            0 => PointerButton::Primary,
            2 => PointerButton::Secondary,
            _ => PointerButton::Other,
        }
    }

    /// The secondary button resets the view instead of opening the
    /// browser's context menu.
    pub fn suppresses_default(&self) -> bool {
        *self == PointerButton::Secondary
    }
}

/// Routes pointer gestures into a [`ViewportTransform`]. Every gesture
/// returns whether the transform changed.
#[derive(Debug, Clone, Default)]
pub struct ViewportController {
    transform: ViewportTransform,
    /// Static layout offset of the image container
    offset: Point,
}

impl ViewportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offset(&mut self, offset: Point) {
        self.offset = offset;
    }

    pub fn transform(&self) -> Transform {
        self.transform.transform()
    }

    pub fn is_panning(&self) -> bool {
        self.transform.is_panning()
    }

    pub fn css_transform(&self) -> String {
        self.transform.css_transform()
    }

    /// Wheel event at `pointer` (page coordinates).
    pub fn wheel(&mut self, pointer: Point, delta_y: f64) -> bool {
        self.transform
            .zoom_at_pointer(pointer, self.offset, delta_y)
    }

    pub fn pointer_down(&mut self, pointer: Point) -> bool {
        self.transform.pan(pointer, true)
    }

    /// Press of `button`: primary starts a pan, secondary resets.
    pub fn button_down(&mut self, pointer: Point, button: PointerButton) -> bool {
        match button {
            PointerButton::Primary => self.pointer_down(pointer),
            PointerButton::Secondary => self.reset(),
            PointerButton::Other => false,
        }
    }

    pub fn pointer_move(&mut self, pointer: Point) -> bool {
        self.transform.pan(pointer, false)
    }

    pub fn pointer_up(&mut self) -> bool {
        self.transform.end_pan();
        false
    }

    /// Alternate-button gesture: back to identity.
    pub fn reset(&mut self) -> bool {
        self.transform.reset()
    }

    /// Zoom in around the centre of a viewport of `size`.
    pub fn zoom_in_centered(&mut self, size: Point) -> bool {
        self.transform.zoom_centered(size, ZoomDirection::In)
    }

    pub fn zoom_out_centered(&mut self, size: Point) -> bool {
        self.transform.zoom_centered(size, ZoomDirection::Out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_uses_layout_offset() {
        let mut viewport = ViewportController::new();
        viewport.set_offset((100.0, 50.0));

        assert!(viewport.wheel((100.0, 50.0), -1.0));
        let t = viewport.transform();
        // Pointer sits on the container origin, so the origin stays put.
        assert!((t.scale - 1.1).abs() < 1e-9);
        assert!(t.translate_x.abs() < 1e-9);
        assert!(t.translate_y.abs() < 1e-9);
    }

    #[test]
    fn test_drag_then_reset() {
        let mut viewport = ViewportController::new();
        assert!(!viewport.pointer_down((10.0, 10.0)));
        assert!(viewport.is_panning());
        assert!(viewport.pointer_move((30.0, 5.0)));
        viewport.pointer_up();
        assert!(!viewport.is_panning());
        assert_eq!(viewport.transform().translate_x, 20.0);
        assert_eq!(viewport.transform().translate_y, -5.0);

        assert!(viewport.reset());
        assert_eq!(viewport.transform(), Transform::identity());
        assert!(!viewport.reset());
    }

    #[test]
    fn test_secondary_button_resets_and_consumes() {
        let mut viewport = ViewportController::new();
        viewport.wheel((0.0, 0.0), -1.0);

        let secondary = PointerButton::from_dom(2);
        assert!(secondary.suppresses_default());
        assert!(viewport.button_down((5.0, 5.0), secondary));
        assert_eq!(viewport.transform(), Transform::identity());
        assert!(!viewport.is_panning());

        let primary = PointerButton::from_dom(0);
        assert!(!primary.suppresses_default());
        assert!(!viewport.button_down((5.0, 5.0), primary));
        assert!(viewport.is_panning());

        assert_eq!(PointerButton::from_dom(1), PointerButton::Other);
        assert!(!viewport.button_down((0.0, 0.0), PointerButton::Other));
    }

    #[test]
    fn test_centered_zoom_round_trip() {
        let mut viewport = ViewportController::new();
        assert!(viewport.zoom_in_centered((800.0, 600.0)));
        assert!(viewport.zoom_out_centered((800.0, 600.0)));
        let t = viewport.transform();
        assert!((t.scale - 1.0).abs() < 1e-9);
        assert!(t.translate_x.abs() < 1e-9);
    }
}
