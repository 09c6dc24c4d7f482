//! Archive expansion for downloaded toolchains.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::exec::EventScope;

/// Expand a zip archive into `dest`, reporting one progress event per
/// entry.
///
/// `strip_components` drops that many leading path components from every
/// entry; toolchain archives usually wrap their content in a single
/// versioned directory. Entries left with no path after stripping are
/// skipped.
pub async fn expand(
    archive: &Path,
    dest: &Path,
    strip_components: usize,
    scope: &EventScope,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(archive)
        .await
        .with_context(|| format!("failed to read {}", archive.display()))?;

    let archive_name = archive.display().to_string();
    let dest = dest.to_path_buf();
    let scope = scope.clone();

    // The zip reader is synchronous; keep it off the runtime's core
    // threads so concurrent tasks stay responsive.
    tokio::task::spawn_blocking(move || {
        expand_blocking(&bytes, &archive_name, &dest, strip_components, &scope)
    })
    .await
    .context("archive expansion task failed")?
}

fn expand_blocking(
    bytes: &[u8],
    archive_name: &str,
    dest: &Path,
    strip_components: usize,
    scope: &EventScope,
) -> anyhow::Result<()> {
    let cursor = Cursor::new(bytes);
    let mut zip = zip::ZipArchive::new(cursor)
        .with_context(|| format!("{archive_name} is not a valid zip archive"))?;

    let total = zip.len();
    for i in 0..total {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("failed to read entry {i} of {archive_name}"))?;

        let Some(stripped) = strip_path(&entry.mangled_name(), strip_components) else {
            continue;
        };
        let outpath = dest.join(&stripped);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .with_context(|| format!("failed to create {}", outpath.display()))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut outfile = std::fs::File::create(&outpath)
                .with_context(|| format!("failed to create {}", outpath.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("failed to extract {}", outpath.display()))?;
            restore_mode(&entry, &outpath)?;
        }

        scope.status(format!("Extracted: {}", stripped.display()));
        scope.progress(Some((i + 1) as f32 / total as f32));
    }

    scope.progress(None);
    Ok(())
}

/// Drop `strip` leading normal components; `None` when nothing remains.
fn strip_path(path: &Path, strip: usize) -> Option<PathBuf> {
    let components: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if components.len() <= strip {
        return None;
    }
    Some(components[strip..].iter().collect())
}

#[cfg(unix)]
fn restore_mode(entry: &zip::read::ZipFile<'_>, outpath: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = entry.unix_mode() {
        std::fs::set_permissions(outpath, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to set permissions on {}", outpath.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restore_mode(_entry: &zip::read::ZipFile<'_>, _outpath: &Path) -> anyhow::Result<()> {
    Ok(())
}
