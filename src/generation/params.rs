//! Generation form setters. Every parameter change is persisted.

use super::GenerationController;
use crate::constants::RANDOM_SEED;
use crate::effect::Effect;
use crate::session::Rejection;
use crate::state::ApplicationState;
use crate::types::{ImageAttachment, LoraSlotId, is_supported_image, parse_resolution};

fn persist(state: &ApplicationState) -> Vec<Effect> {
    vec![Effect::PersistConfig(state.persisted_config())]
}

fn check_image(image: &ImageAttachment) -> Result<(), Rejection> {
    if is_supported_image(&image.filename) {
        Ok(())
    } else {
        Err(Rejection::UnsupportedImage(image.filename.clone()))
    }
}

impl GenerationController {
    /// Apply a form change and persist the result.
    fn edit(&self, f: impl FnOnce(&mut ApplicationState)) {
        self.ctx.transition(|state| {
            f(state);
            persist(state)
        });
    }

    pub fn set_prompt(&self, prompt: &str) {
        self.edit(|state| state.form.prompt = prompt.to_string());
    }

    pub fn set_steps(&self, steps: u32) {
        self.edit(|state| state.form.steps = steps.max(1));
    }

    pub fn set_guidance_scale(&self, guidance_scale: f32) {
        self.edit(|state| state.form.guidance_scale = guidance_scale.max(0.0));
    }

    /// Reference-image strength, clamped to `[0, 1]`.
    pub fn set_strength(&self, strength: f32) {
        self.edit(|state| state.form.strength = strength.clamp(0.0, 1.0));
    }

    pub fn set_resolution(&self, resolution: &str) -> Result<(), Rejection> {
        if parse_resolution(resolution).is_none() {
            let rejection = Rejection::InvalidResolution(resolution.to_string());
            self.ctx.reject(&rejection);
            return Err(rejection);
        }
        self.edit(|state| state.form.resolution = resolution.trim().to_string());
        Ok(())
    }

    /// `-1` (or any negative value) means random.
    pub fn set_seed(&self, seed: i64) {
        self.edit(|state| state.form.seed = seed.max(RANDOM_SEED));
    }

    pub fn randomize_seed(&self) {
        self.set_seed(RANDOM_SEED);
    }

    /// Fill a LoRA slot. An empty name clears the slot.
    pub fn set_lora(&self, slot: LoraSlotId, name: &str, weight: f32) -> Result<(), Rejection> {
        self.ctx.try_transition(|state| {
            if !state.form.loras.set(slot, name.trim(), weight) {
                return Err(Rejection::NoSuchSlot(format!("{:?}", slot)));
            }
            Ok(persist(state))
        })
    }

    pub fn clear_loras(&self) {
        self.edit(|state| state.form.loras.clear());
    }

    /// Copy a prompt preset into the prompt.
    pub fn apply_prompt_preset(&self, label: &str) -> Result<(), Rejection> {
        self.ctx.try_transition(|state| {
            let prompt = state
                .prompt_presets
                .get(label)
                .cloned()
                .ok_or_else(|| Rejection::UnknownPreset(label.to_string()))?;
            state.form.prompt = prompt;
            Ok(persist(state))
        })
    }

    /// Attach an img2img reference image (text-to-image only).
    pub fn attach_reference_image(&self, image: ImageAttachment) -> Result<(), Rejection> {
        self.ctx.try_transition(|state| {
            check_image(&image)?;
            log::debug!("Reference image attached: {}", image.filename);
            state.form.reference_image = Some(image);
            Ok(Vec::new())
        })
    }

    pub fn clear_reference_image(&self) {
        self.ctx.transition(|state| {
            state.form.reference_image = None;
            Vec::new()
        });
    }

    /// Attach the image to describe (image-to-text).
    pub fn attach_source_image(&self, image: ImageAttachment) -> Result<(), Rejection> {
        self.ctx.try_transition(|state| {
            check_image(&image)?;
            log::debug!("Source image attached: {}", image.filename);
            state.form.source_image = Some(image);
            Ok(Vec::new())
        })
    }

    pub fn clear_source_image(&self) {
        self.ctx.transition(|state| {
            state.form.source_image = None;
            Vec::new()
        });
    }
}
