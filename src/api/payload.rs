//! Generation request construction and body encoding.
//!
//! Encoding rules:
//! - text-to-image with a reference image: multipart, including `strength`
//!   and the image bytes, LoRAs as a JSON-encoded text field
//! - text-to-image without one: a JSON body with the same fields minus the
//!   binary
//! - image-to-text: multipart with just `task`, `model` and `image`

use serde::Serialize;

use crate::state::ApplicationState;
use crate::types::{ImageAttachment, LoraSelection, Task};

/// Everything needed to dispatch one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub task: Task,
    pub model_id: String,
    pub resolution: String,
    /// `-1` means random
    pub seed: i64,
    pub steps: u32,
    pub guidance_scale: f32,
    pub prompt: Option<String>,
    /// Reference image (text-to-image) or the image to describe (image-to-text)
    pub reference_image: Option<ImageAttachment>,
    /// Set only when a reference image is attached
    pub strength: Option<f32>,
    pub lora_selections: Vec<LoraSelection>,
}

impl GenerationRequest {
    /// Snapshot the current form into a request.
    pub fn from_state(state: &ApplicationState) -> Self {
        let form = &state.form;
        let (prompt, reference_image, lora_selections) = match state.current_task {
            Task::TextToImage => (
                Some(form.prompt.trim().to_string()),
                form.reference_image.clone(),
                form.loras.selections(),
            ),
            Task::ImageToText => (None, form.source_image.clone(), Vec::new()),
        };
        let strength = match (state.current_task, &reference_image) {
            (Task::TextToImage, Some(_)) => Some(form.strength),
            _ => None,
        };

        Self {
            task: state.current_task,
            model_id: state.selected_model_id.clone(),
            resolution: form.resolution.clone(),
            seed: form.seed,
            steps: form.steps,
            guidance_scale: form.guidance_scale,
            prompt,
            reference_image,
            strength,
            lora_selections,
        }
    }

    /// Pick the body encoding for this request.
    pub fn into_payload(self) -> GenerationPayload {
        match (self.task, self.reference_image) {
            (Task::ImageToText, image) => {
                let mut form = MultipartForm::new()
                    .text("task", self.task.as_str())
                    .text("model", self.model_id);
                if let Some(image) = image {
                    form = form.file("image", image);
                }
                GenerationPayload::Multipart(form)
            }
            (Task::TextToImage, Some(image)) => {
                let mut form = MultipartForm::new()
                    .text("task", self.task.as_str())
                    .text("model", self.model_id)
                    .text("steps", self.steps.to_string())
                    .text("guidance_scale", self.guidance_scale.to_string())
                    .text(
                        "strength",
                        self.strength.unwrap_or(crate::constants::DEFAULT_STRENGTH).to_string(),
                    )
                    .text("resolution", self.resolution)
                    .text("seed", self.seed.to_string())
                    .text("prompt", self.prompt.unwrap_or_default())
                    .file("image", image);
                if !self.lora_selections.is_empty() {
                    // Vec<LoraSelection> always serializes
                    let loras = serde_json::to_string(&self.lora_selections).unwrap_or_default();
                    form = form.text("loras", loras);
                }
                GenerationPayload::Multipart(form)
            }
            (Task::TextToImage, None) => GenerationPayload::Json(GenerateBody {
                task: self.task,
                model: self.model_id,
                steps: self.steps,
                guidance_scale: self.guidance_scale,
                strength: self.strength,
                resolution: self.resolution,
                seed: self.seed,
                prompt: self.prompt.unwrap_or_default(),
                loras: self.lora_selections,
            }),
        }
    }
}

/// JSON body for text-to-image without a reference image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateBody {
    pub task: Task,
    pub model: String,
    pub steps: u32,
    pub guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    pub resolution: String,
    pub seed: i64,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loras: Vec<LoraSelection>,
}

/// One multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(ImageAttachment),
}

/// Transport-neutral multipart body; the HTTP client turns it into a
/// `reqwest::multipart::Form`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, FormValue)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields
            .push((name.to_string(), FormValue::Text(value.into())));
        self
    }

    pub fn file(mut self, name: &str, attachment: ImageAttachment) -> Self {
        self.fields
            .push((name.to_string(), FormValue::File(attachment)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn text_value(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FormValue::Text(text) => Some(text),
            FormValue::File(_) => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// Encoded body of a generate call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationPayload {
    Json(GenerateBody),
    Multipart(MultipartForm),
}

impl GenerationPayload {
    pub fn is_multipart(&self) -> bool {
        matches!(self, GenerationPayload::Multipart(_))
    }
}
