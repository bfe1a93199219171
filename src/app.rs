//! Top-level application object wiring the coordinators together.

use std::cell::RefCell;

use crate::context::Context;
use crate::generation::GenerationController;
use crate::lifecycle::ModelLifecycleCoordinator;
use crate::scheduler::PollHandle;
use crate::types::Task;
use crate::viewport::ViewportController;

/// One controller session: state, coordinators and the result viewport.
pub struct Imgenie {
    ctx: Context,
    lifecycle: ModelLifecycleCoordinator,
    generation: GenerationController,
    viewport: RefCell<ViewportController>,
    status_poller: PollHandle,
}

impl Imgenie {
    pub fn new(ctx: Context) -> Self {
        Self {
            lifecycle: ModelLifecycleCoordinator::new(ctx.clone()),
            generation: GenerationController::new(ctx.clone()),
            viewport: RefCell::new(ViewportController::new()),
            status_poller: PollHandle::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn lifecycle(&self) -> &ModelLifecycleCoordinator {
        &self.lifecycle
    }

    pub fn generation(&self) -> &GenerationController {
        &self.generation
    }

    /// Current viewport transform as a CSS `transform` value.
    pub fn css_transform(&self) -> String {
        self.viewport.borrow().css_transform()
    }

    /// Apply a viewport gesture and report the new transform if it changed.
    pub fn with_viewport(&self, gesture: impl FnOnce(&mut ViewportController) -> bool) -> bool {
        let (changed, transform) = {
            let mut viewport = self.viewport.borrow_mut();
            let changed = gesture(&mut viewport);
            (changed, viewport.transform())
        };
        if changed {
            self.ctx.presenter.on_viewport_transform_changed(
                transform.scale,
                transform.translate_x,
                transform.translate_y,
            );
        }
        changed
    }

    /// Startup sequence: restore saved parameters, fetch the app config and
    /// model list for the current task, then poll status once.
    pub async fn start(&self) {
        let task = self.ctx.read(|state| state.current_task);
        self.start_with_task(task).await;
    }

    /// [`start`](Self::start), but for `task` instead of the default one.
    pub async fn start_with_task(&self, task: Task) {
        log::info!("imgenie starting (API at {})", self.ctx.settings.api_base);

        if let Some(config) = self.ctx.store.load() {
            self.ctx.transition(|state| {
                state.apply_persisted(config);
                Vec::new()
            });
        }

        self.lifecycle.load_app_config().await;
        if self.ctx.read(|state| state.current_task) == task {
            // A failed listing has been reported; keep going with an empty list.
            self.lifecycle.list_models(task).await.ok();
            self.lifecycle.poll_status().await;
        } else {
            // Nothing is generating yet, so this can't be rejected.
            self.lifecycle.switch_task(task).await.ok();
        }

        if self.ctx.read(|state| state.model_loaded) {
            self.lifecycle.refresh_presets().await;
        }
    }

    /// Poll server status until [`stop`](Self::stop) is called.
    pub async fn run_status_poller(&self) {
        self.lifecycle
            .run_status_poller(self.status_poller.clone())
            .await;
    }

    pub fn stop(&self) {
        log::debug!("Stopping status poller");
        self.status_poller.stop();
    }
}
