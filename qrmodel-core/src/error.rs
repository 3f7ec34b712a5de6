//! Error types for the qrmodel-core crate.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the export utility.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Weight download failed: {0}")]
    Download(String),

    #[error("Could not find .{extension} file in weights directory {}", .dir.display())]
    CheckpointNotFound { dir: PathBuf, extension: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Exported file not found at {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Python runtime error: {0}")]
    Python(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ConvertError {
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn python(msg: impl Into<String>) -> Self {
        Self::Python(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<figment::Error> for ConvertError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// The step of the conversion procedure an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Workspace,
    Acquisition,
    Discovery,
    Conversion,
    Placement,
}

impl Stage {
    /// Whether a failure in this stage is logged and swallowed rather than surfaced
    /// to the process exit code.
    pub fn is_handled(self) -> bool {
        !matches!(self, Stage::Workspace)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Workspace => "workspace setup",
            Stage::Acquisition => "weight acquisition",
            Stage::Discovery => "checkpoint discovery",
            Stage::Conversion => "format conversion",
            Stage::Placement => "artifact placement",
        };
        f.write_str(name)
    }
}

/// A [`ConvertError`] tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: ConvertError,
}

impl StageError {
    pub fn new(stage: Stage, error: impl Into<ConvertError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_not_found_message() {
        let err = ConvertError::CheckpointNotFound {
            dir: PathBuf::from("temp_weights"),
            extension: "pt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not find .pt file in weights directory temp_weights"
        );
    }

    #[test]
    fn test_stage_error_display() {
        let err = StageError::new(Stage::Conversion, ConvertError::export("opset 12 rejected"));
        assert_eq!(
            err.to_string(),
            "format conversion failed: Export failed: opset 12 rejected"
        );
    }

    #[test]
    fn test_only_workspace_stage_is_unhandled() {
        assert!(!Stage::Workspace.is_handled());
        for stage in [
            Stage::Acquisition,
            Stage::Discovery,
            Stage::Conversion,
            Stage::Placement,
        ] {
            assert!(stage.is_handled(), "{stage} should be handled");
        }
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StageError::new(Stage::Workspace, io);
        assert!(matches!(err.error, ConvertError::Io(_)));
    }
}
