//! Record of a completed conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub checkpoint: PathBuf,
    pub exported_path: PathBuf,
    pub output_path: PathBuf,
    /// Unset when the placed file could not be read back.
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Size and SHA-256 of a file.
pub fn digest_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((size, format!("{:x}", hasher.finalize())))
}

/// [`digest_file`] on the blocking pool. A failure is logged and yields `None`; the
/// artifact is already in place by the time it is hashed.
pub async fn digest_artifact(path: &Path) -> Option<(u64, String)> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || digest_file(&owned))
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));
    match result {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not hash placed model");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"hello").unwrap();

        let (size, hash) = digest_file(&path).unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_report_serde() {
        let report = ConversionReport {
            checkpoint: PathBuf::from("temp_weights/qrdet-n.pt"),
            exported_path: PathBuf::from("temp_weights/qrdet-n.onnx"),
            output_path: PathBuf::from("public/model.onnx"),
            size_bytes: Some(12),
            sha256: None,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: ConversionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.output_path, report.output_path);
        assert_eq!(parsed.size_bytes, Some(12));
        assert!(parsed.sha256.is_none());
    }

    #[tokio::test]
    async fn test_digest_artifact_unreadable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(digest_artifact(&dir.path().join("gone.onnx")).await.is_none());

        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"hello").unwrap();
        let (size, _) = digest_artifact(&path).await.unwrap();
        assert_eq!(size, 5);
    }
}
