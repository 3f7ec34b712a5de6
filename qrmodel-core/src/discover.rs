//! Checkpoint discovery in the weights directory.

use std::path::{Path, PathBuf};

/// Find the checkpoint file in `dir`: the first regular file whose name ends in
/// `.{extension}`, taking names in lexicographic order so the choice does not depend
/// on the filesystem's listing order.
///
/// Returns `Ok(None)` when nothing matches; a missing directory is an error.
pub fn find_checkpoint(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let suffix = format!(".{extension}");
    let mut matches = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry
            .file_name()
            .as_encoded_bytes()
            .ends_with(suffix.as_bytes())
        {
            continue;
        }
        if entry.path().is_file() {
            matches.push(entry.path());
        }
    }

    if matches.len() > 1 {
        tracing::warn!(
            count = matches.len(),
            dir = %dir.display(),
            "Multiple checkpoints found, taking the first by name"
        );
    }

    matches.sort();
    Ok(matches.into_iter().next())
}

/// [`find_checkpoint`] on the blocking pool.
pub async fn locate_checkpoint(
    dir: PathBuf,
    extension: String,
) -> std::io::Result<Option<PathBuf>> {
    tokio::task::spawn_blocking(move || find_checkpoint(&dir, &extension))
        .await
        .map_err(std::io::Error::other)?
}
