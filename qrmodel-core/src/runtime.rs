//! Python runtime manager for the collaborators that only exist as Python packages.
//!
//! Scripts receive a JSON request on stdin and answer with a JSON object on the last
//! non-empty line of stdout. Anything printed before that line (library progress output)
//! is forwarded to the debug log.

use crate::config::PythonConfig;
use crate::error::ConvertError;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Managed Python subprocess runner.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    python_path: PathBuf,
    venv_path: Option<PathBuf>,
    workspace: PathBuf,
    timeout: Option<Duration>,
}

impl PythonRuntime {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            python_path: PathBuf::from("python3"),
            venv_path: None,
            workspace,
            timeout: None,
        }
    }

    /// Build a runtime from configuration, falling back to a detected virtualenv.
    pub fn from_config(config: &PythonConfig, workspace: PathBuf) -> Self {
        let venv_path = config
            .venv_path
            .clone()
            .or_else(|| detect_venv(&workspace));
        Self {
            python_path: config
                .python_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("python3")),
            venv_path,
            workspace,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Get the effective Python command (accounting for venv).
    pub fn python_cmd(&self) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
            venv.join(bin_dir).join("python")
        } else {
            self.python_path.clone()
        }
    }

    /// Run an inline script with a JSON request on stdin and decode its JSON reply.
    pub async fn run_json<Req, Resp>(&self, script: &str, request: &Req) -> Result<Resp, ConvertError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let input = serde_json::to_vec(request)?;
        debug!(script_len = script.len(), python = %self.python_cmd().display(), "Running Python script");

        let run = async {
            let mut child = Command::new(self.python_cmd())
                .args(["-c", script])
                .current_dir(&self.workspace)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ConvertError::python(format!("Failed to spawn Python: {e}")))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }

            let output = child.wait_with_output().await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ConvertError::python(format!(
                    "Python script failed ({}): {}",
                    output.status,
                    last_lines(&stderr, 5)
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_reply(&stdout)
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                ConvertError::Timeout(format!(
                    "Python script timed out after {}s",
                    limit.as_secs()
                ))
            })?,
            None => run.await,
        }
    }
}

/// Decode the JSON object on the last non-empty line of `stdout`.
pub(crate) fn parse_reply<Resp: DeserializeOwned>(stdout: &str) -> Result<Resp, ConvertError> {
    let mut lines = stdout.lines().filter(|l| !l.trim().is_empty());
    let Some(reply) = lines.next_back() else {
        return Err(ConvertError::python("Python script produced no output"));
    };
    for line in lines {
        debug!(target: "qrmodel::python", "{line}");
    }
    serde_json::from_str(reply.trim())
        .map_err(|e| ConvertError::python(format!("Invalid JSON reply '{}': {e}", reply.trim())))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Detect a virtual environment in common locations.
fn detect_venv(workspace: &Path) -> Option<PathBuf> {
    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        let path = PathBuf::from(venv);
        if path.exists() {
            return Some(path);
        }
    }

    [".venv", "venv"]
        .iter()
        .map(|name| workspace.join(name))
        .find(|path| path.join("pyvenv.cfg").exists())
}
