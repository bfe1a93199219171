//! Domain types shared by the coordinators, the service client and the
//! presentation layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{CHARACTER_LORA_SLOTS, DEFAULT_LORA_WEIGHT, IMAGE_EXTENSIONS};

// ============================================================================
// Task
// ============================================================================

/// The two operation modes the server supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Task {
    #[default]
    #[serde(rename = "text-to-image")]
    TextToImage,
    #[serde(rename = "image-to-text")]
    ImageToText,
}

impl Task {
    /// Wire name of the task.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::TextToImage => "text-to-image",
            Task::ImageToText => "image-to-text",
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Task::TextToImage => "Text to Image",
            Task::ImageToText => "Image to Text",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task '{0}' (expected text-to-image or image-to-text)")]
pub struct UnknownTask(pub String);

impl FromStr for Task {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text-to-image" | "t2i" | "txt2img" => Ok(Task::TextToImage),
            "image-to-text" | "i2t" | "img2txt" => Ok(Task::ImageToText),
            other => Err(UnknownTask(other.to_string())),
        }
    }
}

// ============================================================================
// Models & server status
// ============================================================================

/// A model the server offers for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// Name to show, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// Server-reported accelerator memory usage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub used: f64,
    #[serde(default)]
    pub max: f64,
}

impl ResourceUsage {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Result of a status poll.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerStatus {
    pub text_to_image_loaded: bool,
    pub image_to_text_loaded: bool,
    pub text_to_image_model: Option<String>,
    pub image_to_text_model: Option<String>,
    pub usage: Option<ResourceUsage>,
}

impl ServerStatus {
    /// Loaded flag and loaded model id for `task`.
    pub fn for_task(&self, task: Task) -> (bool, Option<&str>) {
        match task {
            Task::TextToImage => (
                self.text_to_image_loaded,
                self.text_to_image_model.as_deref(),
            ),
            Task::ImageToText => (
                self.image_to_text_loaded,
                self.image_to_text_model.as_deref(),
            ),
        }
    }
}

/// Model status as displayed next to the model picker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelStatusDisplay {
    #[default]
    Unloaded,
    Loading,
    Unloading,
    Loaded,
    Error(String),
}

impl ModelStatusDisplay {
    pub fn label(&self) -> &str {
        match self {
            ModelStatusDisplay::Unloaded => "not loaded",
            ModelStatusDisplay::Loading => "loading",
            ModelStatusDisplay::Unloading => "unloading",
            ModelStatusDisplay::Loaded => "loaded",
            ModelStatusDisplay::Error(_) => "error",
        }
    }
}

/// Health endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub server: bool,
}

// ============================================================================
// Progress & results
// ============================================================================

/// Server-side phase of the running generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Starting,
    Completed,
    Failed,
    /// Also covers statuses this client doesn't know.
    #[serde(other)]
    Generating,
}

impl ProgressStatus {
    /// Completed and Failed end the progress loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }
}

/// Last known server-reported completion state, for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub status: ProgressStatus,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(status: ProgressStatus, percent: f64, message: Option<String>) -> Self {
        let percent = if percent.is_finite() {
            percent.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            status,
            percent,
            message,
        }
    }

    /// Snapshot shown the moment a generation is dispatched.
    pub fn starting() -> Self {
        Self::new(ProgressStatus::Starting, 0.0, Some("Starting...".to_string()))
    }

    /// Starting has no meaningful percentage.
    pub fn is_indeterminate(&self) -> bool {
        self.status == ProgressStatus::Starting
    }
}

/// Outcome of a successful generate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationResult {
    Image {
        /// Displayable image reference (usually a `data:` URL)
        image_ref: String,
        image_id: Option<String>,
        params: Map<String, Value>,
    },
    Description {
        text: String,
    },
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

// ============================================================================
// LoRA selections
// ============================================================================

/// Kind of auxiliary modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoraKind {
    Character,
    Concept,
}

/// A LoRA passed through to the generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSelection {
    pub name: String,
    pub weight: f32,
    pub kind: LoraKind,
}

/// LoRA names offered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoraCatalog {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl LoraCatalog {
    pub fn contains(&self, kind: LoraKind, name: &str) -> bool {
        let list = match kind {
            LoraKind::Character => &self.characters,
            LoraKind::Concept => &self.concepts,
        };
        list.iter().any(|n| n == name)
    }
}

/// Identifies one of the three LoRA slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoraSlotId {
    Character(usize),
    Concept,
}

impl LoraSlotId {
    pub fn kind(&self) -> LoraKind {
        match self {
            LoraSlotId::Character(_) => LoraKind::Character,
            LoraSlotId::Concept => LoraKind::Concept,
        }
    }
}

/// A single slot; an empty name means "none".
#[derive(Debug, Clone, PartialEq)]
pub struct LoraSlot {
    pub name: String,
    pub weight: f32,
}

impl Default for LoraSlot {
    fn default() -> Self {
        Self {
            name: String::new(),
            weight: DEFAULT_LORA_WEIGHT,
        }
    }
}

impl LoraSlot {
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

/// Two character slots and one concept slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoraSlots {
    pub characters: [LoraSlot; CHARACTER_LORA_SLOTS],
    pub concept: LoraSlot,
}

impl LoraSlots {
    fn slot_mut(&mut self, id: LoraSlotId) -> Option<&mut LoraSlot> {
        match id {
            LoraSlotId::Character(i) => self.characters.get_mut(i),
            LoraSlotId::Concept => Some(&mut self.concept),
        }
    }

    /// Set a slot. Returns `false` for an out-of-range character slot.
    pub fn set(&mut self, id: LoraSlotId, name: impl Into<String>, weight: f32) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                *slot = LoraSlot {
                    name: name.into(),
                    weight,
                };
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Non-empty selections in slot order.
    pub fn selections(&self) -> Vec<LoraSelection> {
        let characters = self
            .characters
            .iter()
            .map(|slot| (slot, LoraKind::Character));
        let concept = std::iter::once((&self.concept, LoraKind::Concept));

        characters
            .chain(concept)
            .filter(|(slot, _)| !slot.is_empty())
            .map(|(slot, kind)| LoraSelection {
                name: slot.name.trim().to_string(),
                weight: slot.weight,
                kind,
            })
            .collect()
    }

    /// Fill empty slots from saved selections, keeping only names present
    /// in `catalog`. Slots the user already set are left alone. Returns the
    /// number of slots restored.
    pub fn restore(&mut self, saved: &[LoraSelection], catalog: &LoraCatalog) -> usize {
        let mut restored = 0;

        for selection in saved {
            if !catalog.contains(selection.kind, &selection.name) {
                log::debug!("Saved LoRA '{}' no longer offered", selection.name);
                continue;
            }
            let slot = match selection.kind {
                LoraKind::Character => self.characters.iter_mut().find(|slot| slot.is_empty()),
                LoraKind::Concept => Some(&mut self.concept).filter(|slot| slot.is_empty()),
            };
            if let Some(slot) = slot {
                *slot = LoraSlot {
                    name: selection.name.clone(),
                    weight: selection.weight,
                };
                restored += 1;
            }
        }
        restored
    }
}

// ============================================================================
// Attachments
// ============================================================================

/// An image file attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Build an attachment, guessing the MIME type from the file extension.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime = mime_for_filename(&filename).to_string();
        Self {
            filename,
            mime,
            bytes,
        }
    }
}

fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Check if a filename has an extension the server accepts.
pub fn is_supported_image(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn mime_for_filename(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Parse a `"WIDTHxHEIGHT"` resolution string.
pub fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
