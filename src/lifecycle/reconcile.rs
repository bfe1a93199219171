//! Pure model-lifecycle transitions.
//!
//! Every function here is called with fresh state after an `.await`, so each
//! one re-checks that the world it was started for (task, selection,
//! generating flag) still holds before committing anything.

use std::collections::BTreeMap;

use crate::constants::FALLBACK_RESOLUTIONS;
use crate::effect::Effect;
use crate::error::ApiError;
use crate::session::Rejection;
use crate::state::ApplicationState;
use crate::types::{
    LoraCatalog, ModelDescriptor, ModelStatusDisplay, ResourceUsage, ServerStatus, Severity, Task,
    parse_resolution,
};

fn models_effect(state: &ApplicationState) -> Effect {
    Effect::Models {
        task: state.current_task,
        models: state.available_models.clone(),
        selected: state.selected_model_id.clone(),
    }
}

fn status_effect(state: &ApplicationState) -> Effect {
    Effect::Status {
        loaded: state.model_loaded,
        model_id: state
            .model_loaded
            .then(|| state.selected_model_id.clone()),
        usage: state.usage,
    }
}

fn set_display(state: &mut ApplicationState, display: ModelStatusDisplay, effects: &mut Vec<Effect>) {
    if state.status_display != display {
        state.status_display = display.clone();
        effects.push(Effect::ModelStatus(display));
    }
}

/// Replace the model list for `task`.
///
/// Keeps the current selection when still offered, else restores the saved
/// preference, else picks the first model.
pub fn apply_model_list(
    state: &mut ApplicationState,
    task: Task,
    models: Vec<ModelDescriptor>,
) -> Vec<Effect> {
    if state.current_task != task {
        log::debug!("Dropping stale {} model list", task);
        return Vec::new();
    }

    state.available_models = models;

    let selected = [&state.selected_model_id, &state.saved_model_id]
        .into_iter()
        .find(|id| !id.is_empty() && state.has_model(id))
        .cloned()
        .or_else(|| state.available_models.first().map(|m| m.id.clone()))
        .unwrap_or_default();

    let mut effects = Vec::new();
    if selected != state.selected_model_id {
        log::debug!("Model selection: '{}' -> '{}'", state.selected_model_id, selected);
        state.selected_model_id = selected;
        if state.model_loaded {
            state.model_loaded = false;
            effects.push(status_effect(state));
        }
    }

    log::info!(
        "{} models available for {}",
        state.available_models.len(),
        task
    );
    effects.insert(0, models_effect(state));
    effects
}

/// Apply the outcome of a resolution lookup for `model_id`.
///
/// Errors, empty lists and unparseable entries fall back to the fixed pair.
pub fn apply_resolutions(
    state: &mut ApplicationState,
    model_id: &str,
    task: Task,
    outcome: Result<Vec<String>, ApiError>,
) -> Vec<Effect> {
    if state.current_task != task || state.selected_model_id != model_id {
        log::debug!("Dropping stale resolutions for {}", model_id);
        return Vec::new();
    }

    let mut resolutions: Vec<String> = match outcome {
        Ok(list) => list
            .into_iter()
            .filter(|r| parse_resolution(r).is_some())
            .collect(),
        Err(e) => {
            log::warn!("Failed to fetch resolutions for {}: {}", model_id, e);
            Vec::new()
        }
    };
    if resolutions.is_empty() {
        resolutions = FALLBACK_RESOLUTIONS.iter().map(|r| r.to_string()).collect();
    }

    if !resolutions.contains(&state.form.resolution) {
        state.form.resolution = resolutions[0].clone();
    }
    state.available_resolutions = resolutions;

    vec![Effect::Resolutions {
        resolutions: state.available_resolutions.clone(),
        selected: state.form.resolution.clone(),
    }]
}

/// Fold a status poll into the state.
///
/// While a generation runs only the usage projection is updated; model
/// selection and loaded flag are left alone until the next poll.
pub fn reconcile_status(state: &mut ApplicationState, status: &ServerStatus) -> Vec<Effect> {
    if let Some(usage) = status.usage {
        state.usage = usage;
    }

    let mut effects = Vec::new();

    if state.is_generating {
        effects.push(status_effect(state));
        return effects;
    }

    let (loaded, server_id) = status.for_task(state.current_task);
    let mut selection_changed = false;

    match server_id.filter(|_| loaded) {
        Some(id) if id == state.selected_model_id => {
            state.model_loaded = true;
        }
        Some(id) if state.has_model(id) => {
            log::info!("Server has {} loaded; adopting it", id);
            state.selected_model_id = id.to_string();
            state.model_loaded = true;
            selection_changed = true;
        }
        Some(id) => {
            log::warn!(
                "Server reports unknown model '{}' loaded for {}",
                id,
                state.current_task
            );
            state.model_loaded = false;
        }
        None => state.model_loaded = false,
    }

    if selection_changed {
        effects.push(models_effect(state));
    }
    effects.push(status_effect(state));

    // Don't stomp on an operation in flight, and keep an error visible
    // until the model actually comes up.
    let display = match (&state.status_display, state.model_loaded) {
        (ModelStatusDisplay::Loading | ModelStatusDisplay::Unloading, _) => None,
        (_, true) => Some(ModelStatusDisplay::Loaded),
        (ModelStatusDisplay::Error(_), false) => None,
        (_, false) => Some(ModelStatusDisplay::Unloaded),
    };
    if let Some(display) = display {
        set_display(state, display, &mut effects);
    }

    effects
}

/// Check a load request and show the loading indicator.
pub fn begin_load(
    state: &mut ApplicationState,
    model_id: &str,
    task: Task,
) -> Result<Vec<Effect>, Rejection> {
    if state.is_generating {
        return Err(Rejection::Busy("load a model"));
    }
    if model_id.is_empty() {
        return Err(Rejection::NoModelSelected);
    }
    if task == state.current_task && !state.has_model(model_id) {
        return Err(Rejection::UnknownModel(model_id.to_string()));
    }

    let mut effects = Vec::new();
    if task == state.current_task {
        set_display(state, ModelStatusDisplay::Loading, &mut effects);
    }
    Ok(effects)
}

pub fn model_loaded(state: &mut ApplicationState, model_id: &str, task: Task) -> Vec<Effect> {
    let mut effects = vec![Effect::notify(
        format!("Model {} loaded", model_id),
        Severity::Success,
    )];
    if task != state.current_task {
        return effects;
    }

    let selection_changed = state.selected_model_id != model_id;
    state.selected_model_id = model_id.to_string();
    state.saved_model_id = model_id.to_string();
    state.model_loaded = true;

    if selection_changed {
        effects.push(models_effect(state));
    }
    set_display(state, ModelStatusDisplay::Loaded, &mut effects);
    effects.push(status_effect(state));
    effects.push(Effect::PersistConfig(state.persisted_config()));
    effects
}

pub fn model_load_failed(state: &mut ApplicationState, task: Task, error: &ApiError) -> Vec<Effect> {
    log::error!("Failed to load model: {}", error);
    let message = error.user_message();
    let mut effects = Vec::new();

    if task == state.current_task {
        state.model_loaded = false;
        set_display(state, ModelStatusDisplay::Error(message.clone()), &mut effects);
        effects.push(status_effect(state));
    }
    effects.push(Effect::notify(
        format!("Failed to load model: {}", message),
        Severity::Error,
    ));
    effects
}

pub fn begin_unload(state: &mut ApplicationState, task: Task) -> Result<Vec<Effect>, Rejection> {
    if state.is_generating {
        return Err(Rejection::Busy("unload the model"));
    }
    let mut effects = Vec::new();
    if task == state.current_task {
        set_display(state, ModelStatusDisplay::Unloading, &mut effects);
    }
    Ok(effects)
}

pub fn model_unloaded(state: &mut ApplicationState, task: Task) -> Vec<Effect> {
    let mut effects = Vec::new();
    if task == state.current_task {
        state.model_loaded = false;
        state.usage = ResourceUsage::zero();
        set_display(state, ModelStatusDisplay::Unloaded, &mut effects);
        effects.push(status_effect(state));
    }
    effects.push(Effect::notify("Model unloaded", Severity::Info));
    effects
}

pub fn model_unload_failed(state: &mut ApplicationState, task: Task, error: &ApiError) -> Vec<Effect> {
    log::error!("Failed to unload model: {}", error);
    let mut effects = Vec::new();
    if task == state.current_task {
        let display = if state.model_loaded {
            ModelStatusDisplay::Loaded
        } else {
            ModelStatusDisplay::Unloaded
        };
        set_display(state, display, &mut effects);
    }
    effects.push(Effect::notify(
        format!("Failed to unload model: {}", error.user_message()),
        Severity::Error,
    ));
    effects
}

/// Switch to `task`, invalidating everything scoped to the old one.
pub fn switch_task(state: &mut ApplicationState, task: Task) -> Result<Vec<Effect>, Rejection> {
    if state.is_generating {
        return Err(Rejection::Busy("switch task"));
    }
    if state.current_task == task {
        return Ok(Vec::new());
    }

    log::info!("Switching task: {} -> {}", state.current_task, task);
    state.current_task = task;
    state.available_models.clear();
    state.selected_model_id.clear();
    state.model_loaded = false;
    state.available_resolutions = FALLBACK_RESOLUTIONS.iter().map(|r| r.to_string()).collect();

    let mut effects = vec![
        models_effect(state),
        Effect::Resolutions {
            resolutions: state.available_resolutions.clone(),
            selected: state.form.resolution.clone(),
        },
        status_effect(state),
    ];
    set_display(state, ModelStatusDisplay::Unloaded, &mut effects);
    Ok(effects)
}

/// User picked a model from the list.
pub fn select_model(state: &mut ApplicationState, model_id: &str) -> Result<Vec<Effect>, Rejection> {
    if state.is_generating {
        return Err(Rejection::Busy("change model"));
    }
    if !state.has_model(model_id) {
        return Err(Rejection::UnknownModel(model_id.to_string()));
    }
    if state.selected_model_id == model_id {
        return Ok(Vec::new());
    }

    state.selected_model_id = model_id.to_string();
    state.saved_model_id = model_id.to_string();
    state.model_loaded = false;

    let (steps, guidance) = state.model_defaults(state.current_task, model_id);
    if let Some(steps) = steps {
        state.form.steps = steps;
    }
    if let Some(guidance) = guidance {
        state.form.guidance_scale = guidance;
    }

    let mut effects = vec![models_effect(state), status_effect(state)];
    set_display(state, ModelStatusDisplay::Unloaded, &mut effects);
    effects.push(Effect::PersistConfig(state.persisted_config()));
    Ok(effects)
}

/// Store freshly fetched preset lists. `None` keeps what we had.
///
/// Saved LoRA selections are restored into the slots the first time a
/// catalog arrives.
pub fn apply_presets(
    state: &mut ApplicationState,
    catalog: Option<LoraCatalog>,
    prompts: Option<BTreeMap<String, String>>,
) -> Vec<Effect> {
    if catalog.is_none() && prompts.is_none() {
        return Vec::new();
    }

    if let Some(catalog) = catalog {
        state.lora_catalog = catalog;
        if let Some(saved) = state.saved_lora_selections.take() {
            let restored = state.form.loras.restore(&saved, &state.lora_catalog);
            log::debug!("Restored {} of {} saved LoRA selections", restored, saved.len());
        }
    }
    if let Some(prompts) = prompts {
        state.prompt_presets = prompts;
    }

    vec![Effect::Presets {
        catalog: state.lora_catalog.clone(),
        prompts: state.prompt_presets.clone(),
    }]
}
