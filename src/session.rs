//! Generation session state machine.
//!
//! ```text
//! Idle -> Validating -> Dispatching -> Polling -> Finalizing -> Idle
//!            |                                        ^
//!            +--- rejected (no state change) ---------+--> Idle
//! ```
//!
//! Everything here is synchronous and free of I/O. The async driver in
//! [`crate::generation`] performs the network calls and feeds their outcomes
//! back in.

use serde_json::{Map, Value};

use crate::api::GenerationRequest;
use crate::effect::Effect;
use crate::error::ApiError;
use crate::scheduler::LoopControl;
use crate::state::ApplicationState;
use crate::types::{GenerationResult, ProgressSnapshot, Severity, Task};

/// Phase of the generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Validating,
    Dispatching,
    Polling,
    Finalizing,
}

/// A precondition that failed. Nothing was sent and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Please load a model first")]
    NoModelLoaded,

    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("Please select an image to describe")]
    NoSourceImage,

    #[error("A generation is already running")]
    AlreadyGenerating,

    #[error("Cannot {0} while a generation is running")]
    Busy(&'static str),

    #[error("Please select a model")]
    NoModelSelected,

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("No image to save")]
    NoImageToSave,

    #[error("No image to delete")]
    NoImageToDelete,

    #[error("Unsupported image type '{0}'")]
    UnsupportedImage(String),

    #[error("Invalid resolution '{0}' (expected WIDTHxHEIGHT)")]
    InvalidResolution(String),

    #[error("Unknown prompt preset '{0}'")]
    UnknownPreset(String),

    #[error("No LoRA slot {0}")]
    NoSuchSlot(String),
}

impl Rejection {
    pub fn severity(&self) -> Severity {
        Severity::Warning
    }

    /// Whether the user gets a notification. A second generate while one is
    /// running is only logged.
    pub fn is_reported(&self) -> bool {
        !matches!(self, Rejection::AlreadyGenerating)
    }
}

/// An accepted generation, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTicket {
    pub request: GenerationRequest,
}

#[derive(Debug, Default)]
pub struct GenerationSession {
    phase: SessionPhase,
}

impl GenerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn enter(&mut self, phase: SessionPhase) {
        log::debug!("Generation session: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Validate and accept a generation.
    ///
    /// On success `is_generating` is set before returning, so a second call
    /// made before the first one is dispatched is rejected.
    pub fn begin(
        &mut self,
        state: &mut ApplicationState,
    ) -> Result<(GenerationTicket, Vec<Effect>), Rejection> {
        if state.is_generating {
            return Err(Rejection::AlreadyGenerating);
        }

        self.enter(SessionPhase::Validating);
        if let Err(rejection) = validate(state) {
            self.enter(SessionPhase::Idle);
            return Err(rejection);
        }

        let request = GenerationRequest::from_state(state);
        let starting = ProgressSnapshot::starting();
        state.is_generating = true;
        state.progress = Some(starting.clone());
        self.enter(SessionPhase::Dispatching);

        log::info!(
            "Generating with {} ({}, {} steps, seed {})",
            request.model_id,
            request.task,
            request.steps,
            request.seed
        );

        Ok((
            GenerationTicket { request },
            vec![Effect::Generating(true), Effect::Progress(starting)],
        ))
    }

    pub fn polling_started(&mut self) {
        if self.phase == SessionPhase::Dispatching {
            self.enter(SessionPhase::Polling);
        }
    }

    /// Fold a progress snapshot into the state.
    ///
    /// Once the generation has ended the snapshot is dropped and the loop is
    /// told to stop, silently.
    pub fn on_progress(
        &mut self,
        state: &mut ApplicationState,
        snapshot: ProgressSnapshot,
    ) -> (Vec<Effect>, LoopControl) {
        if !state.is_generating {
            return (Vec::new(), LoopControl::Stop);
        }

        let control = if snapshot.status.is_terminal() {
            LoopControl::Stop
        } else {
            LoopControl::Continue
        };
        state.progress = Some(snapshot.clone());
        (vec![Effect::Progress(snapshot)], control)
    }

    /// Finalize after the generate call resolved, whatever the outcome.
    ///
    /// Always clears `is_generating` and persists the parameters exactly once.
    pub fn finish(
        &mut self,
        state: &mut ApplicationState,
        outcome: &Result<GenerationResult, ApiError>,
    ) -> Vec<Effect> {
        self.enter(SessionPhase::Finalizing);
        let mut effects = Vec::new();

        match outcome {
            Ok(result) => {
                if let GenerationResult::Image {
                    image_id, params, ..
                } = result
                {
                    state.last_image_id = image_id.clone();
                    state.last_image_params = params.clone();
                }
                effects.push(Effect::Result(result.clone()));
            }
            Err(e) => {
                log::error!("Generation failed: {}", e);
                effects.push(Effect::notify(e.user_message(), Severity::Error));
            }
        }

        state.is_generating = false;
        state.progress = None;
        effects.push(Effect::Generating(false));
        effects.push(Effect::PersistConfig(state.persisted_config()));

        self.enter(SessionPhase::Idle);
        effects
    }
}

fn validate(state: &ApplicationState) -> Result<(), Rejection> {
    if !state.model_loaded || !state.has_selection() {
        return Err(Rejection::NoModelLoaded);
    }
    match state.current_task {
        Task::TextToImage if state.form.prompt.trim().is_empty() => Err(Rejection::EmptyPrompt),
        Task::ImageToText if state.form.source_image.is_none() => Err(Rejection::NoSourceImage),
        _ => Ok(()),
    }
}

/// Image id and metadata to save. Caller-supplied metadata overrides the
/// echoed generation parameters.
pub fn save_target(
    state: &ApplicationState,
    metadata: Map<String, Value>,
) -> Result<(String, Map<String, Value>), Rejection> {
    let image_id = state
        .last_image_id
        .clone()
        .ok_or(Rejection::NoImageToSave)?;

    let mut merged = state.last_image_params.clone();
    merged.extend(metadata);
    Ok((image_id, merged))
}

pub fn delete_target(state: &ApplicationState) -> Result<String, Rejection> {
    state.last_image_id.clone().ok_or(Rejection::NoImageToDelete)
}

/// The server confirmed deletion of `image_id`.
pub fn image_deleted(state: &mut ApplicationState, image_id: &str) -> Vec<Effect> {
    if state.last_image_id.as_deref() != Some(image_id) {
        // A newer image replaced it while the call was in flight.
        return vec![Effect::notify("Image deleted", Severity::Success)];
    }
    state.last_image_id = None;
    state.last_image_params.clear();
    vec![
        Effect::ResultCleared,
        Effect::notify("Image deleted", Severity::Success),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageAttachment, ProgressStatus};

    fn ready_state() -> ApplicationState {
        let mut state = ApplicationState::new();
        state.selected_model_id = "sdxl".to_string();
        state.model_loaded = true;
        state.form.prompt = "a castle".to_string();
        state
    }

    fn image_result(id: &str) -> GenerationResult {
        GenerationResult::Image {
            image_ref: "data:image/png;base64,AA==".to_string(),
            image_id: Some(id.to_string()),
            params: Map::new(),
        }
    }

    fn persist_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::PersistConfig(_)))
            .count()
    }

    #[test]
    fn test_begin_sets_generating_and_second_begin_is_rejected() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();

        let (ticket, effects) = session.begin(&mut state).unwrap();
        assert_eq!(ticket.request.model_id, "sdxl");
        assert!(state.is_generating);
        assert_eq!(session.phase(), SessionPhase::Dispatching);
        assert_eq!(effects[0], Effect::Generating(true));

        assert_eq!(session.begin(&mut state), Err(Rejection::AlreadyGenerating));
        assert!(!Rejection::AlreadyGenerating.is_reported());
    }

    #[test]
    fn test_validation_failures_change_nothing() {
        let mut session = GenerationSession::new();

        let mut state = ready_state();
        state.form.prompt = "   ".to_string();
        let before = state.persisted_config();
        assert_eq!(session.begin(&mut state).unwrap_err(), Rejection::EmptyPrompt);
        assert!(!state.is_generating);
        assert_eq!(state.persisted_config(), before);
        assert_eq!(session.phase(), SessionPhase::Idle);

        let mut state = ready_state();
        state.model_loaded = false;
        assert_eq!(session.begin(&mut state).unwrap_err(), Rejection::NoModelLoaded);

        let mut state = ready_state();
        state.current_task = Task::ImageToText;
        assert_eq!(session.begin(&mut state).unwrap_err(), Rejection::NoSourceImage);

        state.form.source_image = Some(ImageAttachment::new("cat.png", vec![1]));
        assert!(session.begin(&mut state).is_ok());
    }

    #[test]
    fn test_progress_stops_on_terminal_status() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();
        session.begin(&mut state).unwrap();
        session.polling_started();
        assert_eq!(session.phase(), SessionPhase::Polling);

        let (effects, control) = session.on_progress(
            &mut state,
            ProgressSnapshot::new(ProgressStatus::Generating, 50.0, None),
        );
        assert_eq!(control, LoopControl::Continue);
        assert_eq!(effects.len(), 1);
        assert_eq!(state.progress.as_ref().map(|p| p.percent), Some(50));

        let (_, control) = session.on_progress(
            &mut state,
            ProgressSnapshot::new(ProgressStatus::Completed, 100.0, None),
        );
        assert_eq!(control, LoopControl::Stop);
    }

    #[test]
    fn test_progress_after_finish_is_silent() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();
        session.begin(&mut state).unwrap();
        session.finish(&mut state, &Ok(image_result("a")));

        let (effects, control) = session.on_progress(
            &mut state,
            ProgressSnapshot::new(ProgressStatus::Generating, 80.0, None),
        );
        assert!(effects.is_empty());
        assert_eq!(control, LoopControl::Stop);
        assert_eq!(state.progress, None);
    }

    #[test]
    fn test_finish_success_records_image() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();
        session.begin(&mut state).unwrap();

        let effects = session.finish(&mut state, &Ok(image_result("img_1")));
        assert!(!state.is_generating);
        assert_eq!(state.last_image_id.as_deref(), Some("img_1"));
        assert_eq!(persist_count(&effects), 1);
        assert!(effects.contains(&Effect::Generating(false)));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_finish_failure_keeps_last_image() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();
        state.last_image_id = Some("previous".to_string());
        session.begin(&mut state).unwrap();

        let effects = session.finish(
            &mut state,
            &Err(ApiError::Server("CUDA out of memory".to_string())),
        );
        assert!(!state.is_generating);
        assert_eq!(state.last_image_id.as_deref(), Some("previous"));
        assert_eq!(persist_count(&effects), 1);
        assert!(effects.contains(&Effect::notify("CUDA out of memory", Severity::Error)));
    }

    #[test]
    fn test_description_result_leaves_image_id() {
        let mut session = GenerationSession::new();
        let mut state = ready_state();
        state.last_image_id = Some("img_1".to_string());
        state.current_task = Task::ImageToText;
        state.form.source_image = Some(ImageAttachment::new("cat.png", vec![1]));
        session.begin(&mut state).unwrap();

        session.finish(
            &mut state,
            &Ok(GenerationResult::Description {
                text: "A cat".to_string(),
            }),
        );
        assert_eq!(state.last_image_id.as_deref(), Some("img_1"));
    }

    #[test]
    fn test_save_and_delete_preconditions() {
        let mut state = ready_state();
        assert_eq!(
            save_target(&state, Map::new()).unwrap_err(),
            Rejection::NoImageToSave
        );
        assert_eq!(delete_target(&state).unwrap_err(), Rejection::NoImageToDelete);

        state.last_image_id = Some("img_2".to_string());
        state
            .last_image_params
            .insert("steps".to_string(), Value::from(30));
        let mut extra = Map::new();
        extra.insert("rating".to_string(), Value::from(5));
        let (id, metadata) = save_target(&state, extra).unwrap();
        assert_eq!(id, "img_2");
        assert_eq!(metadata.len(), 2);

        let effects = image_deleted(&mut state, "img_2");
        assert!(state.last_image_id.is_none());
        assert!(effects.contains(&Effect::ResultCleared));
    }
}
