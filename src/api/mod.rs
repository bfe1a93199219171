//! Typed client surface of the imgenie server.
//!
//! [`ImgenieApi`] is the seam the coordinators depend on. [`HttpApi`] talks
//! to a real server; tests substitute an in-memory fake.

mod http;
mod payload;
mod wire;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ApiResult;
use crate::types::{
    GenerationResult, HealthReport, LoraCatalog, ModelDescriptor, ProgressSnapshot, ServerStatus,
    Task,
};

pub use http::HttpApi;
pub use payload::{FormValue, GenerateBody, GenerationPayload, GenerationRequest, MultipartForm};

/// Every server round-trip the controller performs.
///
/// Futures are not `Send`: the browser executor is single-threaded and the
/// native binary runs a current-thread runtime.
#[async_trait(?Send)]
pub trait ImgenieApi {
    /// Static per-model configuration, fetched once.
    async fn app_config(&self) -> ApiResult<Value>;

    async fn list_models(&self, task: Task) -> ApiResult<Vec<ModelDescriptor>>;

    /// Resolutions supported by a model, as `"WxH"` strings.
    async fn resolutions(&self, model_id: &str, task: Task) -> ApiResult<Vec<String>>;

    async fn status(&self) -> ApiResult<ServerStatus>;

    async fn load_model(&self, model_id: &str, task: Task) -> ApiResult<()>;

    async fn unload_model(&self, task: Task) -> ApiResult<()>;

    /// Run a generation. Resolves only once the server has finished.
    async fn generate(&self, payload: GenerationPayload) -> ApiResult<GenerationResult>;

    /// Progress of the running generation.
    async fn progress(&self) -> ApiResult<ProgressSnapshot>;

    async fn save_image(&self, image_id: &str, metadata: &Map<String, Value>) -> ApiResult<()>;

    async fn delete_image(&self, image_id: &str) -> ApiResult<()>;

    async fn loras(&self) -> ApiResult<LoraCatalog>;

    /// Prompt presets as `label -> prompt text`.
    async fn prompt_presets(&self) -> ApiResult<BTreeMap<String, String>>;

    async fn health(&self) -> ApiResult<HealthReport>;
}
