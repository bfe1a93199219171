//! Presentation contract.
//!
//! The controller never touches the page directly; it reports every state
//! change through a [`Presenter`]. The browser build forwards these calls to
//! JavaScript, the CLI logs them.

use std::collections::BTreeMap;

use crate::types::{
    GenerationResult, LoraCatalog, ModelDescriptor, ModelStatusDisplay, ProgressSnapshot,
    ResourceUsage, Severity, Task,
};

/// Receives state changes from the controller.
///
/// Callbacks are invoked with no state borrowed, so an implementation may
/// call back into the controller.
pub trait Presenter {
    /// Model loaded flag, loaded model id and accelerator usage changed.
    fn on_status_changed(&self, loaded: bool, model_id: Option<&str>, usage: ResourceUsage);

    fn on_progress(&self, snapshot: &ProgressSnapshot);

    fn on_result(&self, result: &GenerationResult);

    /// User-facing notification. Despite the name this also carries
    /// `Info`/`Success` messages.
    fn on_error(&self, message: &str, severity: Severity);

    fn on_viewport_transform_changed(&self, scale: f64, translate_x: f64, translate_y: f64);

    fn on_models_changed(&self, _task: Task, _models: &[ModelDescriptor], _selected: &str) {}

    fn on_resolutions_changed(&self, _resolutions: &[String], _selected: &str) {}

    fn on_model_status(&self, _status: &ModelStatusDisplay) {}

    fn on_presets_changed(&self, _catalog: &LoraCatalog, _prompts: &BTreeMap<String, String>) {}

    fn on_generating_changed(&self, _generating: bool) {}

    /// The result area should be hidden (image deleted).
    fn on_result_cleared(&self) {}
}

/// Presenter that writes everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn on_status_changed(&self, loaded: bool, model_id: Option<&str>, usage: ResourceUsage) {
        log::debug!(
            "Status: loaded={} model={} usage={:.1}/{:.1}",
            loaded,
            model_id.unwrap_or("-"),
            usage.used,
            usage.max
        );
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if snapshot.is_indeterminate() {
            log::info!("{}", snapshot.message.as_deref().unwrap_or("Starting..."));
        } else {
            log::info!(
                "{:>3}% {}",
                snapshot.percent,
                snapshot.message.as_deref().unwrap_or_default()
            );
        }
    }

    fn on_result(&self, result: &GenerationResult) {
        match result {
            GenerationResult::Image { image_id, .. } => {
                log::info!("Image ready ({})", image_id.as_deref().unwrap_or("unsaved"));
            }
            GenerationResult::Description { text } => log::info!("Description: {}", text),
        }
    }

    fn on_error(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => log::error!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Info | Severity::Success => log::info!("{}", message),
        }
    }

    fn on_viewport_transform_changed(&self, scale: f64, translate_x: f64, translate_y: f64) {
        log::trace!("Viewport: scale={scale:.3} translate=({translate_x:.1}, {translate_y:.1})");
    }

    fn on_model_status(&self, status: &ModelStatusDisplay) {
        log::debug!("Model status: {}", status.label());
    }
}
