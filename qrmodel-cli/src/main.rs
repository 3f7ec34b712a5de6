//! qrmodel CLI — fetches the QR detector weights, exports them to ONNX and places the
//! model at `public/model.onnx`.
//!
//! Handled failures (download, discovery, export, placement) are logged and the process
//! still exits with status 0.

use clap::Parser;
use qrmodel_core::{ConfigOverrides, ConversionPipeline, ModelSize, Outcome, load_config};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Download the qrdet checkpoint and export it for the web scanner
#[derive(Parser, Debug)]
#[command(name = "qrmodel", version, about, long_about = None)]
struct Cli {
    /// Working directory the weights and output paths are relative to
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Detector size (n, s, m, l)
    #[arg(long)]
    model_size: Option<ModelSize>,

    /// Opset passed to the exporter
    #[arg(long)]
    opset: Option<u32>,

    /// Directory the checkpoint is downloaded into
    #[arg(long)]
    weights_dir: Option<PathBuf>,

    /// Final location of the exported model
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Remove the weights directory after a successful run
    #[arg(long)]
    cleanup: bool,

    /// Print the conversion report as JSON on success
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            weights_dir: self.weights_dir.clone(),
            output_path: self.output.clone(),
            model_size: self.model_size,
            opset: self.opset,
            cleanup_weights: self.cleanup.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let config = load_config(Some(&workspace), Some(&cli.overrides()))?;

    if let Some(Commands::Config {
        action: ConfigAction::Show,
    }) = cli.command
    {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let pipeline = ConversionPipeline::from_config(config, workspace);
    match pipeline.run_best_effort().await? {
        Outcome::Completed(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Outcome::Aborted { stage, .. } => {
            tracing::debug!(%stage, "Conversion stopped early");
        }
    }

    Ok(())
}

/// Human-readable progress on stdout plus a JSON log file in the data directory.
fn init_tracing(verbose: u8, quiet: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "qrmodel", "qrmodel")
        .map(|d| d.data_dir().join("logs"));
    let (json_layer, guard) = match log_dir.as_deref().map(ensure_dir) {
        Some(Some(dir)) => {
            let appender = tracing_appender::rolling::daily(dir, "qrmodel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(json_layer)
        .init();

    guard
}

fn ensure_dir(dir: &Path) -> Option<&Path> {
    std::fs::create_dir_all(dir).ok().map(|_| dir)
}
