//! Artifact placement: moves the exported model to its final location.

use crate::error::ConvertError;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Move `exported` to `destination`, replacing any file already there.
///
/// Fails with [`ConvertError::ArtifactMissing`] without touching `destination` when the
/// exported file does not exist. The destination's parent directory is created if needed.
pub async fn place_artifact(exported: &Path, destination: &Path) -> Result<(), ConvertError> {
    if !tokio::fs::try_exists(exported).await.unwrap_or(false) {
        return Err(ConvertError::ArtifactMissing(exported.to_path_buf()));
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(exported, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("Rename crosses filesystems, copying instead");
            tokio::fs::copy(exported, destination).await?;
            tokio::fs::remove_file(exported).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_moves_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let exported = dir.path().join("qrdet-n.onnx");
        let destination = dir.path().join("public").join("model.onnx");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, b"old").unwrap();
        std::fs::write(&exported, b"new").unwrap();

        place_artifact(&exported, &destination).await.unwrap();

        assert!(!exported.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exported = dir.path().join("qrdet-n.onnx");
        let destination = dir.path().join("public").join("model.onnx");
        std::fs::write(&exported, b"onnx").unwrap();

        place_artifact(&exported, &destination).await.unwrap();
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_missing_export_leaves_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("model.onnx");
        std::fs::write(&destination, b"previous").unwrap();

        let err = place_artifact(&dir.path().join("absent.onnx"), &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ArtifactMissing(_)));
        assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
    }
}
