//! Startup/session-reset cleanup of cache files no longer referenced by the
//! queue or the currently-playing item.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Removes every file directly under `cache_dir` whose path is not in
/// `protected`. Errors removing an individual file are logged and skipped;
/// a single locked or already-gone file must not abort the sweep.
pub async fn sweep(cache_dir: &Path, protected: &HashSet<PathBuf>) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(cache_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() || protected.contains(&path) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to sweep cache file");
            continue;
        }
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_unprotected_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.bin");
        let drop = dir.path().join("drop.bin");
        tokio::fs::write(&keep, b"a").await.unwrap();
        tokio::fs::write(&drop, b"b").await.unwrap();

        let protected = HashSet::from([keep.clone()]);
        let removed = sweep(dir.path(), &protected).await.unwrap();

        assert_eq!(removed, 1);
        assert!(keep.exists());
        assert!(!drop.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_not_an_error() {
        let removed = sweep(Path::new("/nonexistent/cueline/cache"), &HashSet::new())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
