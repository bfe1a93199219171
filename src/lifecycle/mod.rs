//! Model lifecycle coordination: listing, load/unload, status polling.

pub mod reconcile;

use futures::join;
use thiserror::Error;

use crate::context::Context;
use crate::effect::Effect;
use crate::error::{ApiError, ApiResult};
use crate::scheduler::{LoopControl, PollHandle, PollLoop};
use crate::session::Rejection;
use crate::types::{Severity, Task};

/// Why an unload didn't happen. Both cases have already been reported to
/// the presenter.
#[derive(Debug, Error)]
pub enum UnloadError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl UnloadError {
    pub fn user_message(&self) -> String {
        match self {
            UnloadError::Rejected(rejection) => rejection.to_string(),
            UnloadError::Api(e) => e.user_message(),
        }
    }
}

/// Drives model listing, loading and status reconciliation.
#[derive(Clone)]
pub struct ModelLifecycleCoordinator {
    ctx: Context,
}

impl ModelLifecycleCoordinator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Replace the model list for `task`, then resolve resolutions for the
    /// resulting selection.
    ///
    /// On failure the existing list is kept and a warning is shown.
    pub async fn list_models(&self, task: Task) -> ApiResult<()> {
        match self.ctx.api.list_models(task).await {
            Ok(models) => {
                self.ctx
                    .transition(|state| reconcile::apply_model_list(state, task, models));
            }
            Err(e) => {
                log::warn!("Failed to list models for {}: {}", task, e);
                self.ctx.apply(vec![Effect::notify(
                    format!("Could not load model list: {}", e.user_message()),
                    Severity::Warning,
                )]);
                return Err(e);
            }
        }

        let selected = self.ctx.read(|state| {
            (state.current_task == task && state.has_selection())
                .then(|| state.selected_model_id.clone())
        });
        if let Some(model_id) = selected {
            self.resolve_resolutions(&model_id, task).await;
        }
        Ok(())
    }

    /// Fetch supported resolutions, falling back to the fixed pair.
    pub async fn resolve_resolutions(&self, model_id: &str, task: Task) {
        let outcome = self.ctx.api.resolutions(model_id, task).await;
        self.ctx
            .transition(|state| reconcile::apply_resolutions(state, model_id, task, outcome));
    }

    /// Load `model_id` for `task`, then refresh status and model-scoped
    /// preset lists.
    pub async fn load_model(&self, model_id: &str, task: Task) -> Result<(), Rejection> {
        self.ctx
            .try_transition(|state| reconcile::begin_load(state, model_id, task))?;

        log::info!("Loading model {} for {}", model_id, task);
        match self.ctx.api.load_model(model_id, task).await {
            Ok(()) => {
                self.ctx
                    .transition(|state| reconcile::model_loaded(state, model_id, task));
                self.poll_status().await;
                self.refresh_presets().await;
            }
            Err(e) => {
                self.ctx
                    .transition(|state| reconcile::model_load_failed(state, task, &e));
            }
        }
        Ok(())
    }

    /// Load the currently selected model.
    pub async fn load_selected(&self) -> Result<(), Rejection> {
        let (model_id, task) = self
            .ctx
            .read(|state| (state.selected_model_id.clone(), state.current_task));
        self.load_model(&model_id, task).await
    }

    /// Unload the model for `task`. Refused while a generation runs.
    pub async fn unload_model(&self, task: Task) -> Result<(), UnloadError> {
        self.ctx
            .try_transition(|state| reconcile::begin_unload(state, task))?;

        log::info!("Unloading model for {}", task);
        match self.ctx.api.unload_model(task).await {
            Ok(()) => {
                self.ctx
                    .transition(|state| reconcile::model_unloaded(state, task));
                Ok(())
            }
            Err(e) => {
                self.ctx
                    .transition(|state| reconcile::model_unload_failed(state, task, &e));
                Err(e.into())
            }
        }
    }

    /// One status poll. Errors are logged only.
    pub async fn poll_status(&self) {
        match self.ctx.api.status().await {
            // The generating flag is read after the await, inside the transition.
            Ok(status) => self
                .ctx
                .transition(|state| reconcile::reconcile_status(state, &status)),
            Err(e) => log::warn!("Status poll failed: {}", e),
        }
    }

    /// Poll status every interval until `handle` is stopped.
    pub async fn run_status_poller(&self, handle: PollHandle) {
        let mut poll = PollLoop::with_handle(
            "status",
            self.ctx.settings.status_poll_interval,
            handle,
        );
        poll.run(self.ctx.timer.as_ref(), || async {
            self.poll_status().await;
            LoopControl::Continue
        })
        .await;
    }

    /// Switch tasks: invalidate the old lists, list models for the new task
    /// and refresh status for it.
    pub async fn switch_task(&self, task: Task) -> Result<(), Rejection> {
        self.ctx
            .try_transition(|state| reconcile::switch_task(state, task))?;
        // Failure already reported; the list stays empty.
        self.list_models(task).await.ok();
        self.poll_status().await;
        Ok(())
    }

    pub async fn select_model(&self, model_id: &str) -> Result<(), Rejection> {
        self.ctx
            .try_transition(|state| reconcile::select_model(state, model_id))?;
        let task = self.ctx.read(|state| state.current_task);
        self.resolve_resolutions(model_id, task).await;
        Ok(())
    }

    /// Refetch LoRA and prompt preset lists.
    pub async fn refresh_presets(&self) {
        let (loras, prompts) = join!(self.ctx.api.loras(), self.ctx.api.prompt_presets());

        let catalog = loras
            .inspect_err(|e| log::warn!("Failed to fetch LoRAs: {}", e))
            .ok();
        let prompts = prompts
            .inspect_err(|e| log::warn!("Failed to fetch prompt presets: {}", e))
            .ok();
        self.ctx
            .transition(|state| reconcile::apply_presets(state, catalog, prompts));
    }

    /// Fetch the static app-config blob.
    pub async fn load_app_config(&self) {
        match self.ctx.api.app_config().await {
            Ok(config) => self.ctx.transition(|state| {
                state.app_config = Some(config);
                Vec::new()
            }),
            Err(e) => log::warn!("Failed to fetch app config: {}", e),
        }
    }
}
