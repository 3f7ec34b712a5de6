//! Weight acquisition: puts a pretrained detector checkpoint into the weights directory.

use crate::config::{FetchBackend, FetchConfig, ModelSize};
use crate::error::ConvertError;
use crate::runtime::PythonRuntime;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Detector initialization collaborator.
///
/// Implementations leave a checkpoint file in `weights_dir` as a side effect. The caller
/// locates it by scanning the directory, not through a return value.
#[async_trait]
pub trait WeightFetcher: Send + Sync {
    async fn fetch(&self, size: ModelSize, weights_dir: &Path) -> Result<(), ConvertError>;

    fn name(&self) -> &str;
}

/// Build the fetcher selected in configuration.
pub fn fetcher_for(
    config: &FetchConfig,
    extension: &str,
    runtime: PythonRuntime,
) -> Box<dyn WeightFetcher> {
    match config.backend {
        FetchBackend::Http => Box::new(HttpWeightFetcher::new(config.base_url.clone(), extension)),
        FetchBackend::Qrdet => Box::new(QrdetFetcher::new(runtime)),
    }
}

/// Downloads the release asset over HTTP.
pub struct HttpWeightFetcher {
    base_url: String,
    extension: String,
    client: reqwest::Client,
}

impl HttpWeightFetcher {
    pub fn new(base_url: impl Into<String>, extension: &str) -> Self {
        Self {
            base_url: base_url.into(),
            extension: extension.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url_for(&self, size: ModelSize) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            size.checkpoint_name(&self.extension)
        )
    }
}

#[async_trait]
impl WeightFetcher for HttpWeightFetcher {
    async fn fetch(&self, size: ModelSize, weights_dir: &Path) -> Result<(), ConvertError> {
        let target = weights_dir.join(size.checkpoint_name(&self.extension));
        if is_present(&target).await {
            info!(path = %target.display(), "Checkpoint already present, skipping download");
            return Ok(());
        }

        let url = self.url_for(size);
        info!(%url, "Downloading checkpoint");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConvertError::download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConvertError::download(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }

        let total = response.content_length();
        let partial = partial_path(&target);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut done: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConvertError::download(e.to_string()))?;
            file.write_all(&chunk).await?;
            done += chunk.len() as u64;
            debug!(bytes_done = done, bytes_total = ?total, "Download progress");
        }
        file.flush().await?;
        drop(file);

        if done == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ConvertError::download(format!("empty response body from {url}")));
        }

        tokio::fs::rename(&partial, &target).await?;
        info!(path = %target.display(), bytes = done, "Checkpoint downloaded");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Runs the Python `qrdet` package, whose detector constructor downloads the weights.
pub struct QrdetFetcher {
    runtime: PythonRuntime,
}

const QRDET_SCRIPT: &str = r#"
import json, sys
from qrdet import QRDetector
req = json.load(sys.stdin)
QRDetector(model_size=req["model_size"], weights_folder=req["weights_folder"])
print(json.dumps({"ok": True}))
"#;

#[derive(Serialize)]
struct QrdetRequest<'a> {
    model_size: &'a str,
    weights_folder: PathBuf,
}

#[derive(Deserialize)]
struct QrdetReply {
    ok: bool,
}

impl QrdetFetcher {
    pub fn new(runtime: PythonRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl WeightFetcher for QrdetFetcher {
    async fn fetch(&self, size: ModelSize, weights_dir: &Path) -> Result<(), ConvertError> {
        let request = QrdetRequest {
            model_size: size.as_str(),
            weights_folder: std::path::absolute(weights_dir)?,
        };
        let reply: QrdetReply = self
            .runtime
            .run_json(QRDET_SCRIPT, &request)
            .await
            .map_err(|e| ConvertError::download(format!("qrdet initialization: {e}")))?;
        if !reply.ok {
            return Err(ConvertError::download("qrdet reported failure"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "qrdet"
    }
}

async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let fetcher = HttpWeightFetcher::new("https://example.com/releases/", "pt");
        assert_eq!(
            fetcher.url_for(ModelSize::N),
            "https://example.com/releases/qrdet-n.pt"
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("w/qrdet-n.pt")),
            PathBuf::from("w/qrdet-n.pt.part")
        );
    }

    #[tokio::test]
    async fn test_existing_checkpoint_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("qrdet-n.pt"), b"weights").unwrap();

        // Unroutable base URL: a request would fail.
        let fetcher = HttpWeightFetcher::new("http://127.0.0.1:9", "pt");
        fetcher.fetch(ModelSize::N, dir.path()).await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("qrdet-n.pt")).unwrap(),
            b"weights"
        );
    }

    #[tokio::test]
    async fn test_empty_checkpoint_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("qrdet-n.pt"), b"").unwrap();

        let fetcher = HttpWeightFetcher::new("http://127.0.0.1:9", "pt");
        let err = fetcher.fetch(ModelSize::N, dir.path()).await.unwrap_err();
        assert!(matches!(err, ConvertError::Download(_)));
    }

    /// Serve one canned HTTP response on a local port and return its base URL.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_download_writes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_once("200 OK", b"pretrained-weights").await;

        let fetcher = HttpWeightFetcher::new(base, "pt");
        fetcher.fetch(ModelSize::N, dir.path()).await.unwrap();

        assert_eq!(dir_names(dir.path()), vec!["qrdet-n.pt".to_string()]);
        assert_eq!(
            std::fs::read(dir.path().join("qrdet-n.pt")).unwrap(),
            b"pretrained-weights"
        );
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_once("404 Not Found", b"missing").await;

        let fetcher = HttpWeightFetcher::new(base, "pt");
        let err = fetcher.fetch(ModelSize::N, dir.path()).await.unwrap_err();

        assert!(matches!(err, ConvertError::Download(_)));
        assert!(err.to_string().contains("HTTP 404"));
        assert!(dir_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_once("200 OK", b"").await;

        let fetcher = HttpWeightFetcher::new(base, "pt");
        let err = fetcher.fetch(ModelSize::N, dir.path()).await.unwrap_err();

        assert!(matches!(err, ConvertError::Download(_)));
        assert!(err.to_string().contains("empty response body"));
        assert!(dir_names(dir.path()).is_empty());
    }

    #[test]
    fn test_fetcher_for_backend() {
        let runtime = PythonRuntime::new(PathBuf::from("."));
        let config = FetchConfig::default();
        assert_eq!(fetcher_for(&config, "pt", runtime.clone()).name(), "http");

        let config = FetchConfig {
            backend: FetchBackend::Qrdet,
            ..FetchConfig::default()
        };
        assert_eq!(fetcher_for(&config, "pt", runtime).name(), "qrdet");
    }
}
