//! The conversion procedure: workspace setup, weight acquisition, checkpoint discovery,
//! format conversion and artifact placement, strictly in that order.
//!
//! There are no retries. A failed run leaves the weights directory as it was; the next
//! run reuses it.

use crate::config::ExportConfig;
use crate::discover::locate_checkpoint;
use crate::error::{ConvertError, Stage, StageError};
use crate::export::{ExportRequest, ModelExporter, UltralyticsExporter};
use crate::fetch::{WeightFetcher, fetcher_for};
use crate::placement::place_artifact;
use crate::provenance::{ConversionReport, digest_artifact};
use crate::runtime::PythonRuntime;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Result of a best-effort run.
#[derive(Debug)]
pub enum Outcome {
    Completed(ConversionReport),
    /// A handled failure: logged, and the run stopped at `stage`.
    Aborted { stage: Stage, reason: String },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// One-shot conversion pipeline over a pair of collaborators.
pub struct ConversionPipeline {
    config: ExportConfig,
    root: PathBuf,
    fetcher: Box<dyn WeightFetcher>,
    exporter: Box<dyn ModelExporter>,
}

impl ConversionPipeline {
    /// Relative paths in `config` are resolved against `root`.
    pub fn new(
        config: ExportConfig,
        root: PathBuf,
        fetcher: Box<dyn WeightFetcher>,
        exporter: Box<dyn ModelExporter>,
    ) -> Self {
        Self {
            config,
            root,
            fetcher,
            exporter,
        }
    }

    /// Pipeline with the collaborators selected by `config`.
    pub fn from_config(config: ExportConfig, root: PathBuf) -> Self {
        let runtime = PythonRuntime::from_config(&config.python, root.clone());
        let fetcher = fetcher_for(&config.fetch, &config.checkpoint_extension, runtime.clone());
        let exporter = Box::new(UltralyticsExporter::new(runtime));
        Self::new(config, root, fetcher, exporter)
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.config.weights_dir_in(&self.root)
    }

    pub fn output_path(&self) -> PathBuf {
        self.config.output_path_in(&self.root)
    }

    /// Run every step, stopping at the first failure.
    pub async fn run(&self) -> Result<ConversionReport, StageError> {
        let weights_dir = self.weights_dir();
        let output_path = self.output_path();

        info!("Starting model download and conversion...");
        info!(
            "Weights directory: {}, output: {}",
            weights_dir.display(),
            output_path.display()
        );
        tokio::fs::create_dir_all(&weights_dir)
            .await
            .map_err(|e| StageError::new(Stage::Workspace, e))?;

        info!(
            fetcher = self.fetcher.name(),
            model_size = %self.config.model_size,
            "Downloading weights to: {}",
            weights_dir.display()
        );
        self.fetcher
            .fetch(self.config.model_size, &weights_dir)
            .await
            .map_err(|e| StageError::new(Stage::Acquisition, e))?;
        info!("Detector weights ready");

        let checkpoint = self.discover(&weights_dir).await?;
        info!("Found checkpoint: {}", checkpoint.display());

        let request = ExportRequest {
            format: self.config.format.clone(),
            opset: self.config.opset,
        };
        info!(opset = request.opset, "Exporting to {}...", request.format.to_uppercase());
        let exported = self
            .exporter
            .export(&checkpoint, &request)
            .await
            .map_err(|e| StageError::new(Stage::Conversion, e))?;
        info!("Export successful: {}", exported.display());

        place_artifact(&exported, &output_path)
            .await
            .map_err(|e| StageError::new(Stage::Placement, e))?;
        info!("Moved model to: {}", output_path.display());
        let (size_bytes, sha256) = match digest_artifact(&output_path).await {
            Some((size, hash)) => {
                info!(size_bytes = size, sha256 = %hash, "Model digest");
                (Some(size), Some(hash))
            }
            None => (None, None),
        };

        if self.config.cleanup_weights {
            match tokio::fs::remove_dir_all(&weights_dir).await {
                Ok(()) => info!("Removed weights directory {}", weights_dir.display()),
                Err(e) => warn!(error = %e, "Could not remove weights directory"),
            }
        }

        Ok(ConversionReport {
            checkpoint,
            exported_path: exported,
            output_path,
            size_bytes,
            sha256,
            completed_at: Utc::now(),
        })
    }

    /// Run and log failures instead of returning them.
    ///
    /// Only a workspace setup failure is returned as an error; every other failure is
    /// logged and reported as [`Outcome::Aborted`].
    pub async fn run_best_effort(&self) -> Result<Outcome, StageError> {
        match self.run().await {
            Ok(report) => Ok(Outcome::Completed(report)),
            Err(err) if err.stage.is_handled() => {
                error!(stage = %err.stage, "{}", err.error);
                Ok(Outcome::Aborted {
                    stage: err.stage,
                    reason: err.error.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn discover(&self, weights_dir: &Path) -> Result<PathBuf, StageError> {
        let extension = &self.config.checkpoint_extension;
        locate_checkpoint(weights_dir.to_path_buf(), extension.clone())
            .await
            .map_err(|e| StageError::new(Stage::Discovery, e))?
            .ok_or_else(|| {
                StageError::new(
                    Stage::Discovery,
                    ConvertError::CheckpointNotFound {
                        dir: weights_dir.to_path_buf(),
                        extension: extension.clone(),
                    },
                )
            })
    }
}
