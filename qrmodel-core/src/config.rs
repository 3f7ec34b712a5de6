//! Configuration for the export utility.
//!
//! Uses `figment` for layered configuration: defaults -> user config file -> workspace
//! `qrmodel.toml` -> environment -> CLI overrides. With no file and no environment the
//! defaults reproduce the fixed layout the web scanner expects.

use crate::error::ConvertError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the workspace-level config file.
pub const WORKSPACE_CONFIG_FILE: &str = "qrmodel.toml";

/// Prefix for environment overrides (`QRMODEL_OPSET`, `QRMODEL_FETCH__BACKEND`, ...).
pub const ENV_PREFIX: &str = "QRMODEL_";

/// Release folder hosting the pretrained qrdet checkpoints.
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://github.com/Eric-Canas/qrdet/releases/download/v2.0_release";

/// Detector model size selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    #[default]
    N,
    S,
    M,
    L,
}

impl ModelSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelSize::N => "n",
            ModelSize::S => "s",
            ModelSize::M => "m",
            ModelSize::L => "l",
        }
    }

    /// File name of the pretrained checkpoint for this size.
    pub fn checkpoint_name(self, extension: &str) -> String {
        format!("qrdet-{}.{extension}", self.as_str())
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "nano" => Ok(ModelSize::N),
            "s" | "small" => Ok(ModelSize::S),
            "m" | "medium" => Ok(ModelSize::M),
            "l" | "large" => Ok(ModelSize::L),
            other => Err(ConvertError::config(format!(
                "unknown model size '{other}' (expected n, s, m or l)"
            ))),
        }
    }
}

/// Where checkpoints come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchBackend {
    /// Direct HTTP download of the release asset.
    #[default]
    Http,
    /// The Python `qrdet` package, which downloads on detector construction.
    Qrdet,
}

/// Weight acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub backend: FetchBackend,
    /// Base URL the checkpoint file name is appended to (HTTP backend only).
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: FetchBackend::default(),
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_WEIGHTS_URL.to_string()
}

/// Python runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Path to Python executable (`python3` if not set).
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    /// Path to virtual environment (auto-detected if not set).
    #[serde(default)]
    pub venv_path: Option<PathBuf>,
    /// Timeout for Python subprocesses in seconds. Unset means wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory the checkpoint is downloaded into. Kept after the run.
    #[serde(default = "default_weights_dir")]
    pub weights_dir: PathBuf,
    /// Final location of the exported model.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default)]
    pub model_size: ModelSize,
    /// Interchange format handed to the exporter.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_opset")]
    pub opset: u32,
    /// Extension (without dot) that identifies a checkpoint during discovery.
    #[serde(default = "default_checkpoint_extension")]
    pub checkpoint_extension: String,
    /// Remove the weights directory after a successful placement.
    #[serde(default)]
    pub cleanup_weights: bool,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub python: PythonConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            weights_dir: default_weights_dir(),
            output_path: default_output_path(),
            model_size: ModelSize::default(),
            format: default_format(),
            opset: default_opset(),
            checkpoint_extension: default_checkpoint_extension(),
            cleanup_weights: false,
            fetch: FetchConfig::default(),
            python: PythonConfig::default(),
        }
    }
}

fn default_weights_dir() -> PathBuf {
    PathBuf::from("temp_weights")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("public/model.onnx")
}

fn default_format() -> String {
    "onnx".to_string()
}

fn default_opset() -> u32 {
    12
}

fn default_checkpoint_extension() -> String {
    "pt".to_string()
}

impl ExportConfig {
    /// Weights directory resolved against `root` when relative.
    pub fn weights_dir_in(&self, root: &Path) -> PathBuf {
        resolve(root, &self.weights_dir)
    }

    /// Output path resolved against `root` when relative.
    pub fn output_path_in(&self, root: &Path) -> PathBuf {
        resolve(root, &self.output_path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Values supplied on the command line. Unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size: Option<ModelSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_weights: Option<bool>,
}

/// Load configuration with layered merging.
///
/// Priority (highest first):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `QRMODEL_`)
/// 3. Workspace-local config (`qrmodel.toml`)
/// 4. User config (`~/.config/qrmodel/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<ExportConfig, ConvertError> {
    let mut figment = Figment::from(Serialized::defaults(ExportConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "qrmodel", "qrmodel") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    Ok(figment.extract()?)
}
