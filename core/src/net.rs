//! Streamed HTTP downloads with progress reporting.

use std::path::Path;

use anyhow::Context;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::exec::EventScope;

/// Download `url` to `dest`.
///
/// If `dest` already exists the download is skipped, since callers cache
/// toolchain archives under versioned names. The body streams into
/// `dest.tmp` and renames on completion, so an interrupted download never
/// leaves a truncated file at the final path. Progress fractions are
/// reported when the server sends a content length.
pub async fn download(
    url: &str,
    dest: &Path,
    scope: &EventScope,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    scope.status(format!("Downloading {url} ..."));

    let response = reqwest::get(url)
        .await
        .with_context(|| format!("failed to download {url}"))?
        .error_for_status()
        .with_context(|| format!("failed to download {url}"))?;

    let total = response.content_length();
    let tmp = dest.with_extension(partial_extension(dest));
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("failed to create {}", tmp.display()))?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                anyhow::bail!("download of {url} was cancelled");
            }
            chunk = stream.next() => match chunk {
                Some(chunk) => chunk.with_context(|| format!("error while downloading {url}"))?,
                None => break,
            },
        };

        file.write_all(&chunk)
            .await
            .with_context(|| format!("error while writing {}", tmp.display()))?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total {
            if total > 0 {
                scope.progress(Some(downloaded as f32 / total as f32));
            }
        }
    }

    file.flush()
        .await
        .with_context(|| format!("failed to flush {}", tmp.display()))?;
    drop(file);

    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("failed to move download into place at {}", dest.display()))?;

    scope.progress(None);
    Ok(())
}

fn partial_extension(dest: &Path) -> String {
    match dest.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::NullSink;

    #[tokio::test]
    async fn existing_destination_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cmake.tar.gz");
        tokio::fs::write(&dest, b"cached").await.unwrap();

        let scope = EventScope::detached(Arc::new(NullSink));
        let cancel = CancellationToken::new();
        // An invalid URL proves no request is made for a cached file.
        download("http://invalid.invalid/x", &dest, &scope, &cancel)
            .await
            .unwrap();

        let content = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(content, b"cached");
    }

    #[test]
    fn partial_extension_appends_tmp() {
        assert_eq!(
            partial_extension(Path::new("a/ninja.zip")),
            "zip.tmp".to_string()
        );
        assert_eq!(partial_extension(Path::new("a/ninja")), "tmp".to_string());
    }
}
