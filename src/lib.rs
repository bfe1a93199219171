//! imgenie - controller for a remote text-to-image / image-to-text server.
//!
//! Manages the lifecycle of the server-side model, builds and dispatches
//! generation requests, tracks their progress, and drives a zoomable result
//! viewport. Runs in the browser (wasm32) and as a native command-line client.

pub mod api;
mod app;
pub mod config;
pub mod constants;
mod context;
pub mod effect;
mod error;
pub mod generation;
pub mod lifecycle;
pub mod presenter;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod types;
mod viewport;

pub use app::Imgenie;
pub use context::Context;
pub use error::{ApiError, ApiResult};
pub use viewport::{PointerButton, ViewportController};

#[cfg(test)]
mod tests;

// WASM entry point
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::*;

// Native command-line client
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
