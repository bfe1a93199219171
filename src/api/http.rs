//! reqwest-backed implementation of [`ImgenieApi`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use super::ImgenieApi;
use super::payload::{FormValue, GenerationPayload, MultipartForm};
use super::wire::{GenerateResponse, OperationResponse, ResolutionsWire, StatusWire};
use crate::config::ClientSettings;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    GenerationResult, HealthReport, LoraCatalog, ModelDescriptor, ProgressSnapshot, ServerStatus,
    Task,
};

/// HTTP client for an imgenie server.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for the API rooted at `settings.api_base`.
    pub fn new(settings: &ClientSettings) -> ApiResult<Self> {
        let base = settings.api_base.trim_end_matches('/');
        let base_url =
            Url::parse(base).map_err(|e| ApiError::Url(format!("{}: {}", settings.api_base, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Url(format!(
                "{} cannot be used as a base URL",
                settings.api_base
            )));
        }

        #[cfg(not(target_arch = "wasm32"))]
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        // The browser owns timeouts for fetch.
        #[cfg(target_arch = "wasm32")]
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, escaping each one.
    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> ApiResult<RequestBuilder> {
        Ok(self.client.get(self.url(segments)?))
    }

    fn post(&self, segments: &[&str]) -> ApiResult<RequestBuilder> {
        Ok(self.client.post(self.url(segments)?))
    }

    /// Send a request and decode the JSON body.
    ///
    /// Non-success statuses become [`ApiError::Status`] carrying the server's
    /// `error`/`message` when the body has one.
    async fn read_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        debug!("{} -> {}", url.path(), status);

        if !status.is_success() {
            let message = serde_json::from_str::<OperationResponse>(&body)
                .ok()
                .and_then(OperationResponse::reason)
                .unwrap_or_else(|| body.trim().to_string());
            error!("{} failed: {} - {}", url.path(), status, message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse response from {}: {}", url.path(), e);
            ApiError::Decode(e)
        })
    }

    async fn operation(&self, request: RequestBuilder, fallback: &str) -> ApiResult<()> {
        self.read_json::<OperationResponse>(request)
            .await?
            .into_result(fallback)
    }
}

fn multipart(form: MultipartForm) -> ApiResult<Form> {
    let mut multipart = Form::new();
    for (name, value) in form.fields {
        multipart = match value {
            FormValue::Text(text) => multipart.text(name, text),
            FormValue::File(attachment) => {
                let part = Part::bytes(attachment.bytes)
                    .file_name(attachment.filename)
                    .mime_str(&attachment.mime)?;
                multipart.part(name, part)
            }
        };
    }
    Ok(multipart)
}

#[async_trait(?Send)]
impl ImgenieApi for HttpApi {
    async fn app_config(&self) -> ApiResult<Value> {
        self.read_json(self.get(&["app-config"])?).await
    }

    async fn list_models(&self, task: Task) -> ApiResult<Vec<ModelDescriptor>> {
        let request = self.get(&["models"])?.query(&[("task", task.as_str())]);
        self.read_json(request).await
    }

    async fn resolutions(&self, model_id: &str, task: Task) -> ApiResult<Vec<String>> {
        let request = self
            .get(&["models", model_id, "resolutions"])?
            .query(&[("task", task.as_str())]);
        let wire: ResolutionsWire = self.read_json(request).await?;
        Ok(wire.resolutions)
    }

    async fn status(&self) -> ApiResult<ServerStatus> {
        let wire: StatusWire = self.read_json(self.get(&["model", "status"])?).await?;
        Ok(wire.into())
    }

    async fn load_model(&self, model_id: &str, task: Task) -> ApiResult<()> {
        let request = self
            .post(&["model", "load"])?
            .json(&json!({ "model_id": model_id, "task": task }));
        self.operation(request, "Failed to load model").await
    }

    async fn unload_model(&self, task: Task) -> ApiResult<()> {
        let request = self
            .post(&["model", "unload"])?
            .json(&json!({ "task": task }));
        self.operation(request, "Failed to unload model").await
    }

    async fn generate(&self, payload: GenerationPayload) -> ApiResult<GenerationResult> {
        let request = self.post(&["generate"])?;
        let request = match payload {
            GenerationPayload::Json(body) => request.json(&body),
            GenerationPayload::Multipart(form) => request.multipart(multipart(form)?),
        };
        let response: GenerateResponse = self.read_json(request).await?;
        response.into_result()
    }

    async fn progress(&self) -> ApiResult<ProgressSnapshot> {
        let wire: super::wire::ProgressWire = self.read_json(self.get(&["progress"])?).await?;
        Ok(wire.into())
    }

    async fn save_image(&self, image_id: &str, metadata: &Map<String, Value>) -> ApiResult<()> {
        let request = self
            .post(&["save"])?
            .json(&json!({ "image_id": image_id, "metadata": metadata }));
        self.operation(request, "Failed to save image").await
    }

    async fn delete_image(&self, image_id: &str) -> ApiResult<()> {
        let request = self
            .post(&["delete_image"])?
            .json(&json!({ "image_id": image_id }));
        self.operation(request, "Failed to delete image").await
    }

    async fn loras(&self) -> ApiResult<LoraCatalog> {
        self.read_json(self.get(&["loras"])?).await
    }

    async fn prompt_presets(&self) -> ApiResult<BTreeMap<String, String>> {
        self.read_json(self.get(&["prompts"])?).await
    }

    async fn health(&self) -> ApiResult<HealthReport> {
        self.read_json(self.get(&["health"])?).await
    }
}
