//! Effects produced by state transitions.
//!
//! Transition functions mutate [`ApplicationState`](crate::state::ApplicationState)
//! and describe everything else that should happen as a list of [`Effect`]s.
//! [`apply_effects`] is the only place that reaches the presenter and the
//! config store.

use std::collections::BTreeMap;

use crate::config::{ConfigStore, PersistedConfig};
use crate::presenter::Presenter;
use crate::types::{
    GenerationResult, LoraCatalog, ModelDescriptor, ModelStatusDisplay, ProgressSnapshot,
    ResourceUsage, Severity, Task,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Status {
        loaded: bool,
        model_id: Option<String>,
        usage: ResourceUsage,
    },
    ModelStatus(ModelStatusDisplay),
    Models {
        task: Task,
        models: Vec<ModelDescriptor>,
        selected: String,
    },
    Resolutions {
        resolutions: Vec<String>,
        selected: String,
    },
    Presets {
        catalog: LoraCatalog,
        prompts: BTreeMap<String, String>,
    },
    Generating(bool),
    Progress(ProgressSnapshot),
    Result(GenerationResult),
    ResultCleared,
    Notify {
        message: String,
        severity: Severity,
    },
    PersistConfig(PersistedConfig),
}

impl Effect {
    pub fn notify(message: impl Into<String>, severity: Severity) -> Self {
        Effect::Notify {
            message: message.into(),
            severity,
        }
    }
}

/// Apply effects in order.
pub fn apply_effects(effects: Vec<Effect>, presenter: &dyn Presenter, store: &dyn ConfigStore) {
    for effect in effects {
        match effect {
            Effect::Status {
                loaded,
                model_id,
                usage,
            } => presenter.on_status_changed(loaded, model_id.as_deref(), usage),
            Effect::ModelStatus(status) => presenter.on_model_status(&status),
            Effect::Models {
                task,
                models,
                selected,
            } => presenter.on_models_changed(task, &models, &selected),
            Effect::Resolutions {
                resolutions,
                selected,
            } => presenter.on_resolutions_changed(&resolutions, &selected),
            Effect::Presets { catalog, prompts } => presenter.on_presets_changed(&catalog, &prompts),
            Effect::Generating(generating) => presenter.on_generating_changed(generating),
            Effect::Progress(snapshot) => presenter.on_progress(&snapshot),
            Effect::Result(result) => presenter.on_result(&result),
            Effect::ResultCleared => presenter.on_result_cleared(),
            Effect::Notify { message, severity } => presenter.on_error(&message, severity),
            Effect::PersistConfig(config) => {
                // Fire-and-forget: a failed write never blocks the session.
                if let Err(e) = store.save(&config) {
                    log::warn!("Failed to save configuration: {}", e);
                }
            }
        }
    }
}
