//! Model format conversion (delegates to the Ultralytics exporter).

use crate::error::ConvertError;
use crate::runtime::PythonRuntime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the exporter is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: String,
    pub opset: u32,
}

/// Model-loading and export collaborator.
///
/// Returns the path the exporter reports for the produced artifact. The path is not
/// guaranteed to exist; the caller checks before placing it.
#[async_trait]
pub trait ModelExporter: Send + Sync {
    async fn export(&self, checkpoint: &Path, request: &ExportRequest)
    -> Result<PathBuf, ConvertError>;
}

/// Loads the checkpoint with `ultralytics.YOLO` and calls `export`.
pub struct UltralyticsExporter {
    runtime: PythonRuntime,
}

const EXPORT_SCRIPT: &str = r#"
import json, sys
from ultralytics import YOLO
req = json.load(sys.stdin)
path = YOLO(req["checkpoint"]).export(format=req["format"], opset=req["opset"])
print(json.dumps({"exported_path": str(path)}))
"#;

#[derive(Serialize)]
struct ExportScriptRequest<'a> {
    checkpoint: &'a Path,
    format: &'a str,
    opset: u32,
}

#[derive(Deserialize)]
struct ExportScriptReply {
    exported_path: PathBuf,
}

impl UltralyticsExporter {
    pub fn new(runtime: PythonRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ModelExporter for UltralyticsExporter {
    async fn export(
        &self,
        checkpoint: &Path,
        request: &ExportRequest,
    ) -> Result<PathBuf, ConvertError> {
        let script_request = ExportScriptRequest {
            checkpoint,
            format: &request.format,
            opset: request.opset,
        };
        let reply: ExportScriptReply = self
            .runtime
            .run_json(EXPORT_SCRIPT, &script_request)
            .await
            .map_err(|e| ConvertError::export(e.to_string()))?;

        Ok(resolve_reported(self.runtime.workspace(), reply.exported_path))
    }
}

/// Reported paths are relative to the exporter's working directory.
fn resolve_reported(workdir: &Path, reported: PathBuf) -> PathBuf {
    if reported.is_absolute() {
        reported
    } else {
        workdir.join(reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reported() {
        assert_eq!(
            resolve_reported(Path::new("/work"), PathBuf::from("temp_weights/qrdet-n.onnx")),
            PathBuf::from("/work/temp_weights/qrdet-n.onnx")
        );
        assert_eq!(
            resolve_reported(Path::new("/work"), PathBuf::from("/tmp/qrdet-n.onnx")),
            PathBuf::from("/tmp/qrdet-n.onnx")
        );
    }

    #[test]
    fn test_script_request_shape() {
        let request = ExportScriptRequest {
            checkpoint: Path::new("temp_weights/qrdet-n.pt"),
            format: "onnx",
            opset: 12,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "checkpoint": "temp_weights/qrdet-n.pt",
                "format": "onnx",
                "opset": 12
            })
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::PythonConfig {
            python_path: Some(dir.path().join("missing-python")),
            venv_path: Some(dir.path().join("missing-venv")),
            timeout_secs: None,
        };
        let exporter =
            UltralyticsExporter::new(PythonRuntime::from_config(&config, dir.path().to_path_buf()));
        let request = ExportRequest {
            format: "onnx".to_string(),
            opset: 12,
        };
        let err = exporter
            .export(&dir.path().join("qrdet-n.pt"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Export(_)));
    }
}
