//! Session-wide application state.
//!
//! There is exactly one [`ApplicationState`] per session. It is created with
//! defaults at startup, mutated only by the coordinators, and shared between
//! them as a [`SharedState`] handle. Only the [`PersistedConfig`] projection
//! ever leaves the process.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::config::PersistedConfig;
use crate::constants::{
    DEFAULT_GUIDANCE_SCALE, DEFAULT_STEPS, DEFAULT_STRENGTH, FALLBACK_RESOLUTIONS, RANDOM_SEED,
};
use crate::types::{
    ImageAttachment, LoraCatalog, LoraSelection, LoraSlots, ModelDescriptor, ModelStatusDisplay,
    ProgressSnapshot, ResourceUsage, Task,
};

/// Shared handle to the session state.
///
/// Execution is single-threaded, so a `RefCell` is enough. Borrows must never
/// be held across an `.await`.
pub type SharedState = Rc<RefCell<ApplicationState>>;

/// User-editable generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationForm {
    pub prompt: String,
    pub steps: u32,
    pub guidance_scale: f32,
    /// Only sent when a reference image is attached
    pub strength: f32,
    pub resolution: String,
    /// `-1` means random
    pub seed: i64,
    /// Optional img2img reference for text-to-image
    pub reference_image: Option<ImageAttachment>,
    /// Image to describe for image-to-text
    pub source_image: Option<ImageAttachment>,
    pub loras: LoraSlots,
}

impl Default for GenerationForm {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            strength: DEFAULT_STRENGTH,
            resolution: FALLBACK_RESOLUTIONS[0].to_string(),
            seed: RANDOM_SEED,
            reference_image: None,
            source_image: None,
            loras: LoraSlots::default(),
        }
    }
}

/// The single mutable record of the session.
#[derive(Debug, Clone, Default)]
pub struct ApplicationState {
    pub current_task: Task,
    /// Empty when nothing is selected
    pub selected_model_id: String,
    pub model_loaded: bool,
    /// Mutual-exclusion flag for generation
    pub is_generating: bool,
    pub available_models: Vec<ModelDescriptor>,
    pub available_resolutions: Vec<String>,

    /// Model preference restored from config, applied when the list arrives
    pub saved_model_id: String,
    pub last_image_id: Option<String>,
    pub last_image_params: Map<String, Value>,
    /// LoRA selections from config, applied once the catalog is known
    pub saved_lora_selections: Option<Vec<LoraSelection>>,

    pub form: GenerationForm,

    // Display projections
    pub usage: ResourceUsage,
    pub status_display: ModelStatusDisplay,
    pub progress: Option<ProgressSnapshot>,

    // Auxiliary server data
    pub app_config: Option<Value>,
    pub lora_catalog: LoraCatalog,
    pub prompt_presets: BTreeMap<String, String>,
}

impl ApplicationState {
    pub fn new() -> Self {
        Self {
            available_resolutions: FALLBACK_RESOLUTIONS.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Wrap into a shared handle.
    pub fn shared(self) -> SharedState {
        Rc::new(RefCell::new(self))
    }

    pub fn has_model(&self, model_id: &str) -> bool {
        self.available_models.iter().any(|m| m.id == model_id)
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_model_id.is_empty()
    }

    /// The durable projection of this state.
    pub fn persisted_config(&self) -> PersistedConfig {
        let lora_selections = if self.lora_catalog == LoraCatalog::default() {
            // Catalog not fetched yet; keep what was saved rather than
            // overwriting it with empty slots.
            self.saved_lora_selections.clone().unwrap_or_default()
        } else {
            self.form.loras.selections()
        };

        let model_id = if self.selected_model_id.is_empty() {
            self.saved_model_id.clone()
        } else {
            self.selected_model_id.clone()
        };

        PersistedConfig {
            prompt: self.form.prompt.clone(),
            steps: self.form.steps,
            guidance: self.form.guidance_scale,
            strength: self.form.strength,
            resolution: self.form.resolution.clone(),
            seed: self.form.seed,
            model_id,
            lora_selections,
            ..PersistedConfig::default()
        }
    }

    /// Seed the form and preference caches from a loaded config.
    pub fn apply_persisted(&mut self, config: PersistedConfig) {
        self.form.prompt = config.prompt;
        self.form.steps = config.steps;
        self.form.guidance_scale = config.guidance;
        self.form.strength = config.strength;
        self.form.resolution = config.resolution;
        self.form.seed = config.seed;
        self.saved_model_id = config.model_id;
        self.saved_lora_selections =
            (!config.lora_selections.is_empty()).then_some(config.lora_selections);
    }

    /// Per-model defaults from the app-config blob, as
    /// `(steps, guidance_scale)`. Either may be missing.
    pub fn model_defaults(&self, task: Task, model_id: &str) -> (Option<u32>, Option<f32>) {
        let section = match task {
            Task::TextToImage => "txt2img",
            Task::ImageToText => "img2txt",
        };
        let Some(model) = self
            .app_config
            .as_ref()
            .and_then(|config| config.get(section))
            .and_then(|models| models.get(model_id))
        else {
            return (None, None);
        };

        let steps = model
            .get("num_inference_steps")
            .and_then(Value::as_u64)
            .and_then(|s| u32::try_from(s).ok());
        let guidance = model
            .get("guidance_scale")
            .and_then(Value::as_f64)
            .map(|g| g as f32);
        (steps, guidance)
    }
}
