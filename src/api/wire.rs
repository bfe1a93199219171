//! Response bodies as the server sends them.
//!
//! These stay private to the api module; everything above it sees the typed
//! domain values from [`crate::types`].

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::types::{GenerationResult, ProgressSnapshot, ProgressStatus, ResourceUsage, ServerStatus};

/// `GET /model/status`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusWire {
    #[serde(default)]
    t2i: bool,
    #[serde(default)]
    i2t: bool,
    #[serde(default)]
    t2i_model: Option<String>,
    #[serde(default)]
    i2t_model: Option<String>,
    #[serde(default, alias = "vram")]
    usage: Option<ResourceUsage>,
}

impl From<StatusWire> for ServerStatus {
    fn from(wire: StatusWire) -> Self {
        // An id without the loaded flag (or vice versa) is treated as not loaded.
        let normalize = |loaded: bool, id: Option<String>| {
            let id = id.filter(|id| !id.is_empty());
            (loaded && id.is_some(), if loaded { id } else { None })
        };
        let (t2i, t2i_model) = normalize(wire.t2i, wire.t2i_model);
        let (i2t, i2t_model) = normalize(wire.i2t, wire.i2t_model);

        ServerStatus {
            text_to_image_loaded: t2i,
            image_to_text_loaded: i2t,
            text_to_image_model: t2i_model,
            image_to_text_model: i2t_model,
            usage: wire.usage,
        }
    }
}

/// `{success, error?, message?}` returned by load/unload/save/delete and by
/// most failing requests.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OperationResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl OperationResponse {
    /// The server's own explanation, if it gave one.
    pub(crate) fn reason(self) -> Option<String> {
        self.error
            .or(self.message)
            .filter(|reason| !reason.trim().is_empty())
    }

    pub(crate) fn into_result(self, fallback: &str) -> ApiResult<()> {
        if self.success && self.error.is_none() {
            return Ok(());
        }
        Err(ApiError::Server(
            self.reason().unwrap_or_else(|| fallback.to_string()),
        ))
    }
}

/// `GET /models/{id}/resolutions`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResolutionsWire {
    #[serde(default)]
    pub(crate) resolutions: Vec<String>,
}

/// `GET /progress`
#[derive(Debug, Deserialize)]
pub(crate) struct ProgressWire {
    #[serde(default = "default_progress_status")]
    status: ProgressStatus,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    message: Option<String>,
}

fn default_progress_status() -> ProgressStatus {
    ProgressStatus::Generating
}

impl From<ProgressWire> for ProgressSnapshot {
    fn from(wire: ProgressWire) -> Self {
        ProgressSnapshot::new(wire.status, wire.progress, wire.message)
    }
}

/// `POST /generate`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_id: Option<String>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GenerateResponse {
    pub(crate) fn into_result(self) -> ApiResult<GenerationResult> {
        if self.success == Some(false) || self.error.is_some() {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Generation failed".to_string());
            return Err(ApiError::Server(reason));
        }

        if let Some(image_ref) = self.image {
            return Ok(GenerationResult::Image {
                image_ref,
                image_id: self.image_id.filter(|id| !id.is_empty()),
                params: self.params.unwrap_or_default(),
            });
        }

        if let Some(text) = self.description {
            return Ok(GenerationResult::Description { text });
        }

        Err(ApiError::Server(
            self.message
                .unwrap_or_else(|| "Server returned no result".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_from_server_shape() {
        let wire: StatusWire = serde_json::from_str(
            r#"{"t2i": true, "i2t": false, "t2i_model": "sdxl", "i2t_model": null}"#,
        )
        .unwrap();
        let status = ServerStatus::from(wire);
        assert!(status.text_to_image_loaded);
        assert_eq!(status.text_to_image_model.as_deref(), Some("sdxl"));
        assert!(!status.image_to_text_loaded);
        assert_eq!(status.usage, None);
    }

    #[test]
    fn test_status_wire_usage_alias() {
        let wire: StatusWire =
            serde_json::from_str(r#"{"t2i": false, "vram": {"used": 3.5, "max": 24}}"#).unwrap();
        let status = ServerStatus::from(wire);
        assert_eq!(status.usage, Some(ResourceUsage { used: 3.5, max: 24.0 }));
    }

    #[test]
    fn test_status_loaded_without_id_is_not_loaded() {
        let wire: StatusWire = serde_json::from_str(r#"{"t2i": true, "t2i_model": ""}"#).unwrap();
        assert_eq!(ServerStatus::from(wire).for_task(crate::types::Task::TextToImage), (false, None));
    }

    #[test]
    fn test_operation_response() {
        let ok: OperationResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(ok.into_result("x").is_ok());

        let failed: OperationResponse =
            serde_json::from_str(r#"{"success": false, "error": "Model not found"}"#).unwrap();
        assert_eq!(
            failed.into_result("Load failed").unwrap_err().user_message(),
            "Model not found"
        );

        let bare: OperationResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert_eq!(bare.into_result("Load failed").unwrap_err().user_message(), "Load failed");
    }

    #[test]
    fn test_progress_wire() {
        let wire: ProgressWire =
            serde_json::from_str(r#"{"status": "generating", "progress": 37.4, "message": "Step 11/30"}"#)
                .unwrap();
        let snapshot = ProgressSnapshot::from(wire);
        assert_eq!(snapshot.percent, 37);
        assert_eq!(snapshot.message.as_deref(), Some("Step 11/30"));

        let idle: ProgressWire = serde_json::from_str("{}").unwrap();
        assert_eq!(ProgressSnapshot::from(idle).status, ProgressStatus::Generating);
    }

    #[test]
    fn test_generate_response_image() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"success": true, "image": "data:image/png;base64,AAAA", "image_id": "img_7",
                "params": {"prompt": "fox", "steps": 30}}"#,
        )
        .unwrap();
        match response.into_result().unwrap() {
            GenerationResult::Image {
                image_ref,
                image_id,
                params,
            } => {
                assert!(image_ref.starts_with("data:image/png"));
                assert_eq!(image_id.as_deref(), Some("img_7"));
                assert_eq!(params["steps"], 30);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_generate_response_description() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"success": true, "description": "A red barn", "filename": "barn.jpg"}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_result().unwrap(),
            GenerationResult::Description {
                text: "A red barn".to_string()
            }
        );
    }

    #[test]
    fn test_generate_response_errors() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"success": false, "error": "T2I model not loaded"}"#).unwrap();
        assert_eq!(
            response.into_result().unwrap_err().user_message(),
            "T2I model not loaded"
        );

        let empty: GenerateResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(empty.into_result().is_err());
    }
}
