//! imgenie_view - pan and zoom for the generated result image
//!
//! This crate turns pointer and wheel input into a 2-D affine transform
//! (uniform scale plus translation). It knows nothing about the network layer
//! or the application state; the host applies [`ViewportTransform::css_transform`]
//! (or [`Transform::matrix`]) to the image element.

mod constants;
mod drag;
mod transform;

pub use constants::{SCALE_MAX, SCALE_MIN, ZOOM_STEP};
pub use drag::PanDragState;
pub use transform::{Point, Transform, ViewportTransform, ZoomDirection};
