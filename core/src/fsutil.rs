//! Small filesystem helpers shared by task bodies.

use std::path::Path;

/// Remove a file or directory tree. Already-absent paths are fine; the
/// common caller is a `clean` task that may run against a fresh checkout.
pub async fn remove_recursive(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
