//! Pan drag interaction state

use crate::transform::Point;

/// Pan drag interaction state for the result viewport.
///
/// While dragging, `anchor` holds `pointer - translation` captured at drag
/// start, so the translation during the drag is simply `pointer - anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PanDragState {
    /// Not dragging
    #[default]
    Idle,
    /// Dragging, anchored at the given offset
    Dragging { anchor: Point },
}

impl PanDragState {
    /// Check if currently dragging
    pub fn is_dragging(&self) -> bool {
        matches!(self, PanDragState::Dragging { .. })
    }

    /// Get the drag anchor if dragging
    pub fn anchor(&self) -> Option<Point> {
        match self {
            PanDragState::Dragging { anchor } => Some(*anchor),
            PanDragState::Idle => None,
        }
    }

    /// Start dragging with the given anchor
    pub fn start_drag(&mut self, anchor: Point) {
        *self = PanDragState::Dragging { anchor };
    }

    /// Stop dragging
    pub fn stop_drag(&mut self) {
        *self = PanDragState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let drag = PanDragState::default();
        assert!(!drag.is_dragging());
        assert_eq!(drag.anchor(), None);
    }

    #[test]
    fn test_start_and_stop() {
        let mut drag = PanDragState::default();
        drag.start_drag((12.0, -4.0));
        assert!(drag.is_dragging());
        assert_eq!(drag.anchor(), Some((12.0, -4.0)));

        drag.stop_drag();
        assert!(!drag.is_dragging());
    }
}
