//! `actions/checkout`: copy the local source tree into a job workspace

use crate::actions::ActionError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum number of files copied by one checkout
pub const MAX_CHECKOUT_FILES: usize = 100_000;

/// Maximum total size copied by one checkout (2 GiB)
pub const MAX_CHECKOUT_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Directory names never copied
const SKIPPED_DIRS: &[&str] = &[".git", "target"];

/// Totals for a finished checkout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutStats {
    pub files: usize,
    pub bytes: u64,
}

/// Copy `source` into `dest`, skipping VCS metadata and build output
///
/// `dest` is created when missing. When `dest` lies inside `source`, the
/// entry holding it is excluded from the walk. Symlinks are recreated
/// rather than followed.
pub async fn checkout_source(source: &Path, dest: &Path) -> Result<CheckoutStats, ActionError> {
    let source = tokio::fs::canonicalize(source)
        .await
        .map_err(|e| ActionError::io(source, e))?;
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| ActionError::io(dest, e))?;
    let dest = tokio::fs::canonicalize(dest)
        .await
        .map_err(|e| ActionError::io(dest, e))?;

    if source == dest {
        return Err(ActionError::InvalidInput {
            input: "source".to_string(),
            reason: "source and workspace are the same directory".to_string(),
        });
    }

    let mut stats = CheckoutStats::default();
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(source.clone(), dest.clone())];

    while let Some((from_dir, to_dir)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&from_dir)
            .await
            .map_err(|e| ActionError::io(&from_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ActionError::io(&from_dir, e))?
        {
            let from = entry.path();
            let name = entry.file_name();
            let to = to_dir.join(&name);

            if dest.starts_with(&from) {
                debug!("Skipping {} (contains the workspace)", from.display());
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ActionError::io(&from, e))?;

            if file_type.is_dir() {
                if SKIPPED_DIRS.iter().any(|skip| name == *skip) {
                    debug!("Skipping {}", from.display());
                    continue;
                }
                tokio::fs::create_dir_all(&to)
                    .await
                    .map_err(|e| ActionError::io(&to, e))?;
                pending.push((from, to));
            } else if file_type.is_symlink() {
                copy_symlink(&from, &to).await?;
                stats.files += 1;
            } else {
                let size = tokio::fs::copy(&from, &to)
                    .await
                    .map_err(|e| ActionError::io(&from, e))?;
                stats.files += 1;
                stats.bytes += size;
            }

            if stats.files > MAX_CHECKOUT_FILES {
                return Err(ActionError::LimitExceeded(format!(
                    "more than {} files",
                    MAX_CHECKOUT_FILES
                )));
            }
            if stats.bytes > MAX_CHECKOUT_BYTES {
                return Err(ActionError::LimitExceeded(format!(
                    "more than {} bytes",
                    MAX_CHECKOUT_BYTES
                )));
            }
        }
    }

    debug!(
        "Checked out {} files ({} bytes) into {}",
        stats.files,
        stats.bytes,
        dest.display()
    );
    Ok(stats)
}

#[cfg(unix)]
async fn copy_symlink(from: &Path, to: &Path) -> Result<(), ActionError> {
    let target = tokio::fs::read_link(from)
        .await
        .map_err(|e| ActionError::io(from, e))?;
    if tokio::fs::symlink_metadata(to).await.is_ok() {
        tokio::fs::remove_file(to)
            .await
            .map_err(|e| ActionError::io(to, e))?;
    }
    tokio::fs::symlink(&target, to)
        .await
        .map_err(|e| ActionError::io(to, e))
}

#[cfg(not(unix))]
async fn copy_symlink(from: &Path, to: &Path) -> Result<(), ActionError> {
    tokio::fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|e| ActionError::io(from, e))
}
