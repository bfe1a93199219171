//! Zoom limits and tolerances for the result viewport

// =============================================================================
// Zoom
// =============================================================================

/// Multiplicative scale change per wheel notch (10%)
pub const ZOOM_STEP: f64 = 1.1;

/// Minimum scale (10%)
pub const SCALE_MIN: f64 = 0.1;

/// Maximum scale (1000%)
pub const SCALE_MAX: f64 = 10.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_limits_are_ordered() {
        assert!(SCALE_MIN > 0.0);
        assert!(SCALE_MAX > SCALE_MIN);
        assert!((SCALE_MIN..=SCALE_MAX).contains(&1.0));
    }

    #[test]
    fn test_zoom_step_grows() {
        assert!(ZOOM_STEP > 1.0);
    }
}
