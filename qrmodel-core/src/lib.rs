//! # qrmodel-core — QR detector model export
//!
//! Fetches the pretrained qrdet checkpoint, exports it to ONNX through Ultralytics and
//! places the result where the web scanner loads it (`public/model.onnx`).
//!
//! The two collaborators that do the real work sit behind traits:
//! - [`WeightFetcher`]: leaves a checkpoint in the weights directory
//! - [`ModelExporter`]: turns a checkpoint into an interchange-format file
//!
//! [`ConversionPipeline`] sequences them with discovery and placement.

pub mod config;
pub mod discover;
pub mod error;
pub mod export;
pub mod fetch;
pub mod pipeline;
pub mod placement;
pub mod provenance;
pub mod runtime;

pub use config::{ConfigOverrides, ExportConfig, FetchBackend, ModelSize, load_config};
pub use error::{ConvertError, Stage, StageError};
pub use export::{ExportRequest, ModelExporter, UltralyticsExporter};
pub use fetch::{HttpWeightFetcher, QrdetFetcher, WeightFetcher};
pub use pipeline::{ConversionPipeline, Outcome};
pub use provenance::ConversionReport;
pub use runtime::PythonRuntime;
