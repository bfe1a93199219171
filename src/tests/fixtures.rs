//! In-memory server, presenter and timer shared by the scenario tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::{Map, Value, json};

use crate::api::{GenerationPayload, ImgenieApi};
use crate::config::{ClientSettings, ConfigError, ConfigStore, MemoryStore, PersistedConfig};
use crate::context::Context;
use crate::error::{ApiError, ApiResult};
use crate::presenter::Presenter;
use crate::scheduler::Timer;
use crate::types::{
    GenerationResult, HealthReport, LoraCatalog, ModelDescriptor, ProgressSnapshot,
    ProgressStatus, ResourceUsage, ServerStatus, Severity, Task,
};

// ============================================================================
// Server
// ============================================================================

/// Scriptable stand-in for the server. Failures are configured as messages
/// and surface as [`ApiError::Server`].
pub struct FakeServer {
    pub text_to_image_models: RefCell<Vec<ModelDescriptor>>,
    pub image_to_text_models: RefCell<Vec<ModelDescriptor>>,
    pub models_error: RefCell<Option<String>>,
    pub resolutions: RefCell<Result<Vec<String>, String>>,
    pub status: RefCell<ServerStatus>,
    /// Status polls that fail before the server answers again
    pub status_errors: Cell<usize>,
    pub load_error: RefCell<Option<String>>,
    pub unload_error: RefCell<Option<String>>,
    pub generate_outcome: RefCell<Result<GenerationResult, String>>,
    /// Progress polls answered before the generate call resolves
    pub progress_before_result: Cell<usize>,
    /// Progress polls that fail, counted from the first one
    pub progress_errors: Cell<usize>,
    pub app_config: RefCell<Value>,

    pub calls: RefCell<Vec<String>>,
    pub last_payload: RefCell<Option<GenerationPayload>>,
    pub saved: RefCell<Vec<(String, Map<String, Value>)>>,
    progress_polls: Cell<usize>,
    release: RefCell<Option<oneshot::Sender<()>>>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self {
            text_to_image_models: RefCell::new(vec![
                ModelDescriptor::new("sd-turbo", "SD Turbo"),
                ModelDescriptor::new("sdxl", "SDXL"),
            ]),
            image_to_text_models: RefCell::new(vec![ModelDescriptor::new("blip", "BLIP")]),
            models_error: RefCell::new(None),
            resolutions: RefCell::new(Ok(vec!["512x512".to_string(), "768x768".to_string()])),
            status: RefCell::new(ServerStatus::default()),
            status_errors: Cell::new(0),
            load_error: RefCell::new(None),
            unload_error: RefCell::new(None),
            generate_outcome: RefCell::new(Ok(sample_image("img-1"))),
            progress_before_result: Cell::new(0),
            progress_errors: Cell::new(0),
            app_config: RefCell::new(json!({})),
            calls: RefCell::new(Vec::new()),
            last_payload: RefCell::new(None),
            saved: RefCell::new(Vec::new()),
            progress_polls: Cell::new(0),
            release: RefCell::new(None),
        }
    }
}

impl FakeServer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    /// Number of calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn set_loaded(&self, task: Task, model_id: &str) {
        let mut status = self.status.borrow_mut();
        match task {
            Task::TextToImage => {
                status.text_to_image_loaded = true;
                status.text_to_image_model = Some(model_id.to_string());
            }
            Task::ImageToText => {
                status.image_to_text_loaded = true;
                status.image_to_text_model = Some(model_id.to_string());
            }
        }
    }

    pub fn progress_polls(&self) -> usize {
        self.progress_polls.get()
    }
}

/// Count down a failure budget. Returns `true` while it lasts.
fn take_failure(budget: &Cell<usize>) -> bool {
    let left = budget.get();
    if left > 0 {
        budget.set(left - 1);
    }
    left > 0
}

fn server_error(message: &Option<String>) -> ApiResult<()> {
    match message {
        Some(message) => Err(ApiError::Server(message.clone())),
        None => Ok(()),
    }
}

#[async_trait(?Send)]
impl ImgenieApi for FakeServer {
    async fn app_config(&self) -> ApiResult<Value> {
        self.record("app_config");
        Ok(self.app_config.borrow().clone())
    }

    async fn list_models(&self, task: Task) -> ApiResult<Vec<ModelDescriptor>> {
        self.record(format!("list_models {}", task.as_str()));
        if let Some(message) = self.models_error.borrow().clone() {
            return Err(ApiError::Server(message));
        }
        Ok(match task {
            Task::TextToImage => self.text_to_image_models.borrow().clone(),
            Task::ImageToText => self.image_to_text_models.borrow().clone(),
        })
    }

    async fn resolutions(&self, model_id: &str, _task: Task) -> ApiResult<Vec<String>> {
        self.record(format!("resolutions {}", model_id));
        self.resolutions.borrow().clone().map_err(ApiError::Server)
    }

    async fn status(&self) -> ApiResult<ServerStatus> {
        self.record("status");
        if take_failure(&self.status_errors) {
            return Err(ApiError::Server("status unavailable".to_string()));
        }
        Ok(self.status.borrow().clone())
    }

    async fn load_model(&self, model_id: &str, task: Task) -> ApiResult<()> {
        self.record(format!("load {}", model_id));
        server_error(&self.load_error.borrow())?;
        self.set_loaded(task, model_id);
        Ok(())
    }

    async fn unload_model(&self, task: Task) -> ApiResult<()> {
        self.record(format!("unload {}", task.as_str()));
        server_error(&self.unload_error.borrow())?;
        let mut status = self.status.borrow_mut();
        match task {
            Task::TextToImage => {
                status.text_to_image_loaded = false;
                status.text_to_image_model = None;
            }
            Task::ImageToText => {
                status.image_to_text_loaded = false;
                status.image_to_text_model = None;
            }
        }
        Ok(())
    }

    async fn generate(&self, payload: GenerationPayload) -> ApiResult<GenerationResult> {
        self.record("generate");
        *self.last_payload.borrow_mut() = Some(payload);

        if self.progress_before_result.get() > 0 {
            let (tx, rx) = oneshot::channel();
            *self.release.borrow_mut() = Some(tx);
            rx.await.ok();
        }
        self.generate_outcome.borrow().clone().map_err(ApiError::Server)
    }

    async fn progress(&self) -> ApiResult<ProgressSnapshot> {
        self.record("progress");
        let polls = self.progress_polls.get() + 1;
        self.progress_polls.set(polls);

        if polls >= self.progress_before_result.get() {
            if let Some(tx) = self.release.borrow_mut().take() {
                tx.send(()).ok();
            }
        }
        if take_failure(&self.progress_errors) {
            return Err(ApiError::Server("progress unavailable".to_string()));
        }
        Ok(ProgressSnapshot::new(
            ProgressStatus::Generating,
            (polls * 25) as f64,
            Some(format!("Step {}", polls)),
        ))
    }

    async fn save_image(&self, image_id: &str, metadata: &Map<String, Value>) -> ApiResult<()> {
        self.record(format!("save {}", image_id));
        self.saved
            .borrow_mut()
            .push((image_id.to_string(), metadata.clone()));
        Ok(())
    }

    async fn delete_image(&self, image_id: &str) -> ApiResult<()> {
        self.record(format!("delete {}", image_id));
        Ok(())
    }

    async fn loras(&self) -> ApiResult<LoraCatalog> {
        self.record("loras");
        Ok(LoraCatalog {
            characters: vec!["alice".to_string()],
            concepts: vec!["watercolor".to_string()],
        })
    }

    async fn prompt_presets(&self) -> ApiResult<BTreeMap<String, String>> {
        self.record("prompts");
        Ok(BTreeMap::from([(
            "Portrait".to_string(),
            "a studio portrait".to_string(),
        )]))
    }

    async fn health(&self) -> ApiResult<HealthReport> {
        self.record("health");
        Ok(HealthReport {
            status: "ok".to_string(),
            server: true,
        })
    }
}

pub fn sample_image(image_id: &str) -> GenerationResult {
    let mut params = Map::new();
    params.insert("seed".to_string(), json!(42));
    GenerationResult::Image {
        image_ref: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        image_id: Some(image_id.to_string()),
        params,
    }
}

// ============================================================================
// Presenter
// ============================================================================

/// Presenter calls, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status {
        loaded: bool,
        model_id: Option<String>,
        usage: ResourceUsage,
    },
    Progress(u8),
    Result(GenerationResult),
    Error(String, Severity),
    Viewport(f64, f64, f64),
    Models(Task, Vec<String>, String),
    Resolutions(Vec<String>, String),
    ModelStatus(String),
    Presets,
    Generating(bool),
    ResultCleared,
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub events: RefCell<Vec<Event>>,
}

impl RecordingPresenter {
    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn errors(&self) -> Vec<(String, Severity)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Error(message, severity) => Some((message.clone(), *severity)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(e)).count()
    }

    pub fn last_status(&self) -> Option<Event> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find(|e| matches!(e, Event::Status { .. }))
            .cloned()
    }
}

impl Presenter for RecordingPresenter {
    fn on_status_changed(&self, loaded: bool, model_id: Option<&str>, usage: ResourceUsage) {
        self.push(Event::Status {
            loaded,
            model_id: model_id.map(str::to_string),
            usage,
        });
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.push(Event::Progress(snapshot.percent));
    }

    fn on_result(&self, result: &GenerationResult) {
        self.push(Event::Result(result.clone()));
    }

    fn on_error(&self, message: &str, severity: Severity) {
        self.push(Event::Error(message.to_string(), severity));
    }

    fn on_viewport_transform_changed(&self, scale: f64, translate_x: f64, translate_y: f64) {
        self.push(Event::Viewport(scale, translate_x, translate_y));
    }

    fn on_models_changed(&self, task: Task, models: &[ModelDescriptor], selected: &str) {
        self.push(Event::Models(
            task,
            models.iter().map(|m| m.id.clone()).collect(),
            selected.to_string(),
        ));
    }

    fn on_resolutions_changed(&self, resolutions: &[String], selected: &str) {
        self.push(Event::Resolutions(
            resolutions.to_vec(),
            selected.to_string(),
        ));
    }

    fn on_model_status(&self, status: &crate::types::ModelStatusDisplay) {
        self.push(Event::ModelStatus(status.label().to_string()));
    }

    fn on_presets_changed(&self, _catalog: &LoraCatalog, _prompts: &BTreeMap<String, String>) {
        self.push(Event::Presets);
    }

    fn on_generating_changed(&self, generating: bool) {
        self.push(Event::Generating(generating));
    }

    fn on_result_cleared(&self) {
        self.push(Event::ResultCleared);
    }
}

// ============================================================================
// Timer & store
// ============================================================================

/// Future that is pending exactly once.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Timer that yields to the executor once instead of sleeping.
#[derive(Default)]
pub struct YieldTimer {
    pub sleeps: RefCell<Vec<Duration>>,
}

#[async_trait(?Send)]
impl Timer for YieldTimer {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        YieldOnce(false).await;
    }
}

/// Memory store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub saves: Cell<usize>,
}

impl CountingStore {
    pub fn with_config(config: &PersistedConfig) -> Self {
        Self {
            inner: MemoryStore::with_blob(config.to_json().unwrap()),
            saves: Cell::new(0),
        }
    }

    pub fn saved(&self) -> Option<PersistedConfig> {
        self.inner.load()
    }
}

impl ConfigStore for CountingStore {
    fn load(&self) -> Option<PersistedConfig> {
        self.inner.load()
    }

    fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError> {
        self.saves.set(self.saves.get() + 1);
        self.inner.save(config)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub server: Rc<FakeServer>,
    pub presenter: Rc<RecordingPresenter>,
    pub timer: Rc<YieldTimer>,
    pub store: Rc<CountingStore>,
    pub ctx: Context,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(CountingStore::default())
    }

    pub fn with_store(store: CountingStore) -> Self {
        let server = FakeServer::new();
        let presenter = Rc::new(RecordingPresenter::default());
        let timer = Rc::new(YieldTimer::default());
        let store = Rc::new(store);
        let ctx = Context::new(
            server.clone(),
            presenter.clone(),
            timer.clone(),
            store.clone(),
            ClientSettings::default(),
        );
        Self {
            server,
            presenter,
            timer,
            store,
            ctx,
        }
    }

    /// Model list fetched and `model_id` loaded for text-to-image.
    pub fn with_loaded_model(model_id: &str) -> Self {
        let harness = Self::new();
        harness.server.set_loaded(Task::TextToImage, model_id);
        let models = harness.server.text_to_image_models.borrow().clone();
        {
            let mut state = harness.ctx.state.borrow_mut();
            state.available_models = models;
            state.selected_model_id = model_id.to_string();
            state.model_loaded = true;
        }
        harness
    }

    pub fn set_prompt(&self, prompt: &str) {
        self.ctx.state.borrow_mut().form.prompt = prompt.to_string();
    }
}
