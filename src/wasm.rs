//! Browser entry point.
//!
//! JavaScript creates an [`ImgenieApp`] with an object of callbacks
//! (`onStatusChanged`, `onProgress`, `onResult`, `onError`,
//! `onViewportTransformChanged`, ...). Missing callbacks are skipped.
//! Long-running operations are spawned on the browser's executor and report
//! back through those callbacks.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use imgenie_view::Transform;
use js_sys::{Array, Function, JSON, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Map;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

use crate::Imgenie;
use crate::api::HttpApi;
use crate::config::{ClientSettings, LocalStorageStore};
use crate::constants::BROWSER_API_PATH;
use crate::context::Context;
use crate::presenter::Presenter;
use crate::scheduler::Timer;
use crate::types::{
    GenerationResult, ImageAttachment, LoraCatalog, LoraSlotId, ModelDescriptor,
    ModelStatusDisplay, ProgressSnapshot, ResourceUsage, Severity, Task,
};
use crate::viewport::PointerButton;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::log_1(&format!("Logger already initialized: {}", e).into());
    }
}

/// Convert through JSON; anything unserializable becomes `null`.
fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| JSON::parse(&json).ok())
        .unwrap_or(JsValue::NULL)
}

fn browser_api_base() -> Result<String, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window object available"))?;
    let origin = window.location().origin()?;
    Ok(format!("{}{}", origin, BROWSER_API_PATH))
}

/// `setTimeout`-backed timer.
struct BrowserTimer;

#[async_trait(?Send)]
impl Timer for BrowserTimer {
    async fn sleep(&self, duration: Duration) {
        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let promise = Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window().is_some_and(|window| {
                window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
                    .is_ok()
            });
            if !scheduled {
                // Resolve right away rather than hang the loop.
                resolve.call0(&JsValue::NULL).ok();
            }
        });
        if let Err(e) = JsFuture::from(promise).await {
            log::warn!("Timer failed: {:?}", e);
        }
    }
}

/// Forwards presenter calls to JavaScript callbacks.
struct JsPresenter {
    callbacks: Object,
}

impl JsPresenter {
    fn call(&self, name: &str, args: &[JsValue]) {
        let Ok(value) = Reflect::get(&self.callbacks, &JsValue::from_str(name)) else {
            return;
        };
        let Some(function) = value.dyn_ref::<Function>() else {
            return;
        };
        let args: Array = args.iter().collect();
        if let Err(e) = function.apply(&self.callbacks, &args) {
            log::warn!("{} callback threw: {:?}", name, e);
        }
    }
}

impl Presenter for JsPresenter {
    fn on_status_changed(&self, loaded: bool, model_id: Option<&str>, usage: ResourceUsage) {
        self.call(
            "onStatusChanged",
            &[
                JsValue::from_bool(loaded),
                model_id.map_or(JsValue::NULL, JsValue::from_str),
                to_js(&usage),
            ],
        );
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.call(
            "onProgress",
            &[to_js(snapshot), JsValue::from_bool(snapshot.is_indeterminate())],
        );
    }

    fn on_result(&self, result: &GenerationResult) {
        self.call("onResult", &[to_js(result)]);
    }

    fn on_error(&self, message: &str, severity: Severity) {
        self.call("onError", &[JsValue::from_str(message), to_js(&severity)]);
    }

    fn on_viewport_transform_changed(&self, scale: f64, translate_x: f64, translate_y: f64) {
        let css = Transform::new(scale, translate_x, translate_y).css();
        self.call(
            "onViewportTransformChanged",
            &[
                JsValue::from_f64(scale),
                JsValue::from_f64(translate_x),
                JsValue::from_f64(translate_y),
                JsValue::from_str(&css),
            ],
        );
    }

    fn on_models_changed(&self, task: Task, models: &[ModelDescriptor], selected: &str) {
        self.call(
            "onModelsChanged",
            &[
                JsValue::from_str(task.as_str()),
                to_js(models),
                JsValue::from_str(selected),
            ],
        );
    }

    fn on_resolutions_changed(&self, resolutions: &[String], selected: &str) {
        self.call(
            "onResolutionsChanged",
            &[to_js(resolutions), JsValue::from_str(selected)],
        );
    }

    fn on_model_status(&self, status: &ModelStatusDisplay) {
        let detail = match status {
            ModelStatusDisplay::Error(message) => JsValue::from_str(message),
            _ => JsValue::NULL,
        };
        self.call("onModelStatus", &[JsValue::from_str(status.label()), detail]);
    }

    fn on_presets_changed(&self, catalog: &LoraCatalog, prompts: &BTreeMap<String, String>) {
        self.call("onPresetsChanged", &[to_js(catalog), to_js(prompts)]);
    }

    fn on_generating_changed(&self, generating: bool) {
        self.call("onGeneratingChanged", &[JsValue::from_bool(generating)]);
    }

    fn on_result_cleared(&self) {
        self.call("onResultCleared", &[]);
    }
}

/// The controller as seen from JavaScript.
#[wasm_bindgen]
pub struct ImgenieApp {
    app: Rc<Imgenie>,
}

#[wasm_bindgen]
impl ImgenieApp {
    /// `api_base` defaults to `<page origin>/api`.
    #[wasm_bindgen(constructor)]
    pub fn new(callbacks: Object, api_base: Option<String>) -> Result<ImgenieApp, JsValue> {
        let api_base = match api_base {
            Some(api_base) => api_base,
            None => browser_api_base()?,
        };
        let settings = ClientSettings::default().with_api_base(api_base);
        let api = HttpApi::new(&settings).map_err(|e| JsValue::from_str(&e.to_string()))?;

        let ctx = Context::new(
            Rc::new(api),
            Rc::new(JsPresenter { callbacks }),
            Rc::new(BrowserTimer),
            Rc::new(LocalStorageStore),
            settings,
        );
        Ok(Self {
            app: Rc::new(Imgenie::new(ctx)),
        })
    }

    /// Run the startup sequence, then keep polling server status.
    pub fn start(&self) {
        let app = self.app.clone();
        spawn_local(async move {
            app.start().await;
            app.run_status_poller().await;
        });
    }

    pub fn stop(&self) {
        self.app.stop();
    }

    // ---- model lifecycle ----

    #[wasm_bindgen(js_name = switchTask)]
    pub fn switch_task(&self, task: &str) -> Result<(), JsValue> {
        let task: Task = task.parse().map_err(|e: crate::types::UnknownTask| {
            JsValue::from_str(&e.to_string())
        })?;
        let app = self.app.clone();
        spawn_local(async move {
            app.lifecycle().switch_task(task).await.ok();
        });
        Ok(())
    }

    #[wasm_bindgen(js_name = selectModel)]
    pub fn select_model(&self, model_id: String) {
        let app = self.app.clone();
        spawn_local(async move {
            app.lifecycle().select_model(&model_id).await.ok();
        });
    }

    #[wasm_bindgen(js_name = loadModel)]
    pub fn load_model(&self) {
        let app = self.app.clone();
        spawn_local(async move {
            app.lifecycle().load_selected().await.ok();
        });
    }

    #[wasm_bindgen(js_name = unloadModel)]
    pub fn unload_model(&self) {
        let app = self.app.clone();
        let task = app.context().read(|state| state.current_task);
        spawn_local(async move {
            app.lifecycle().unload_model(task).await.ok();
        });
    }

    // ---- generation ----

    /// Start a generation. Returns `false` if it was rejected.
    pub fn generate(&self) -> bool {
        let Ok(ticket) = self.app.generation().begin() else {
            return false;
        };
        let app = self.app.clone();
        spawn_local(async move {
            app.generation().run(ticket).await.ok();
        });
        true
    }

    #[wasm_bindgen(js_name = isGenerating)]
    pub fn is_generating(&self) -> bool {
        self.app.generation().is_generating()
    }

    #[wasm_bindgen(js_name = saveResult)]
    pub fn save_result(&self) {
        let app = self.app.clone();
        spawn_local(async move {
            app.generation().save_result(Map::new()).await.ok();
        });
    }

    #[wasm_bindgen(js_name = deleteResult)]
    pub fn delete_result(&self) {
        let app = self.app.clone();
        spawn_local(async move {
            app.generation().delete_result().await.ok();
        });
    }

    // ---- parameters ----

    #[wasm_bindgen(js_name = setPrompt)]
    pub fn set_prompt(&self, prompt: &str) {
        self.app.generation().set_prompt(prompt);
    }

    #[wasm_bindgen(js_name = setSteps)]
    pub fn set_steps(&self, steps: u32) {
        self.app.generation().set_steps(steps);
    }

    #[wasm_bindgen(js_name = setGuidanceScale)]
    pub fn set_guidance_scale(&self, guidance_scale: f32) {
        self.app.generation().set_guidance_scale(guidance_scale);
    }

    #[wasm_bindgen(js_name = setStrength)]
    pub fn set_strength(&self, strength: f32) {
        self.app.generation().set_strength(strength);
    }

    #[wasm_bindgen(js_name = setResolution)]
    pub fn set_resolution(&self, resolution: &str) -> bool {
        self.app.generation().set_resolution(resolution).is_ok()
    }

    /// JavaScript numbers are doubles; non-finite values mean random.
    #[wasm_bindgen(js_name = setSeed)]
    pub fn set_seed(&self, seed: f64) {
        if seed.is_finite() {
            self.app.generation().set_seed(seed.trunc() as i64);
        } else {
            self.app.generation().randomize_seed();
        }
    }

    #[wasm_bindgen(js_name = randomizeSeed)]
    pub fn randomize_seed(&self) {
        self.app.generation().randomize_seed();
    }

    #[wasm_bindgen(js_name = setCharacterLora)]
    pub fn set_character_lora(&self, slot: usize, name: &str, weight: f32) -> bool {
        self.app
            .generation()
            .set_lora(LoraSlotId::Character(slot), name, weight)
            .is_ok()
    }

    #[wasm_bindgen(js_name = setConceptLora)]
    pub fn set_concept_lora(&self, name: &str, weight: f32) -> bool {
        self.app
            .generation()
            .set_lora(LoraSlotId::Concept, name, weight)
            .is_ok()
    }

    #[wasm_bindgen(js_name = applyPromptPreset)]
    pub fn apply_prompt_preset(&self, label: &str) -> bool {
        self.app.generation().apply_prompt_preset(label).is_ok()
    }

    #[wasm_bindgen(js_name = attachReferenceImage)]
    pub fn attach_reference_image(&self, filename: String, bytes: Vec<u8>) -> bool {
        self.app
            .generation()
            .attach_reference_image(ImageAttachment::new(filename, bytes))
            .is_ok()
    }

    #[wasm_bindgen(js_name = clearReferenceImage)]
    pub fn clear_reference_image(&self) {
        self.app.generation().clear_reference_image();
    }

    #[wasm_bindgen(js_name = attachSourceImage)]
    pub fn attach_source_image(&self, filename: String, bytes: Vec<u8>) -> bool {
        self.app
            .generation()
            .attach_source_image(ImageAttachment::new(filename, bytes))
            .is_ok()
    }

    // ---- viewport ----

    #[wasm_bindgen(js_name = setViewportOffset)]
    pub fn set_viewport_offset(&self, x: f64, y: f64) {
        self.app.with_viewport(|viewport| {
            viewport.set_offset((x, y));
            false
        });
    }

    /// Returns `true` when the event was consumed and its default action
    /// should be prevented.
    pub fn wheel(&self, x: f64, y: f64, delta_y: f64) -> bool {
        self.app
            .with_viewport(|viewport| viewport.wheel((x, y), delta_y));
        delta_y != 0.0
    }

    /// `button` follows `MouseEvent.button`; the secondary button resets.
    /// Returns `true` when the caller should prevent the default action
    /// (the context menu).
    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&self, x: f64, y: f64, button: i16) -> bool {
        let button = PointerButton::from_dom(button);
        self.app
            .with_viewport(|viewport| viewport.button_down((x, y), button));
        button.suppresses_default()
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&self, x: f64, y: f64) {
        self.app
            .with_viewport(|viewport| viewport.pointer_move((x, y)));
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&self) {
        self.app.with_viewport(|viewport| viewport.pointer_up());
    }

    #[wasm_bindgen(js_name = resetView)]
    pub fn reset_view(&self) {
        self.app.with_viewport(|viewport| viewport.reset());
    }

    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self, width: f64, height: f64) {
        self.app
            .with_viewport(|viewport| viewport.zoom_in_centered((width, height)));
    }

    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self, width: f64, height: f64) {
        self.app
            .with_viewport(|viewport| viewport.zoom_out_centered((width, height)));
    }

    #[wasm_bindgen(js_name = cssTransform)]
    pub fn css_transform(&self) -> String {
        self.app.css_transform()
    }
}
