//! `ci/archive`: gzip-compressed tarballs of a directory

use crate::actions::ActionError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Totals for a written archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: usize,
    pub size_bytes: u64,
}

/// Write `dir` into a `.tar.gz` at `output`
///
/// Entries are rooted at the directory's own name, the way
/// `tar czvf out.tar.gz dir` lays them out. Symlinks are stored as links.
pub async fn create_tar_gz(dir: &Path, output: &Path) -> Result<ArchiveStats, ActionError> {
    let dir = dir.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || write_tar_gz(&dir, &output))
        .await
        .map_err(|e| ActionError::Internal(format!("archive task failed: {}", e)))?
}

fn write_tar_gz(dir: &Path, output: &Path) -> Result<ArchiveStats, ActionError> {
    if !dir.is_dir() {
        return Err(ActionError::InvalidInput {
            input: "path".to_string(),
            reason: format!("{} is not a directory", dir.display()),
        });
    }

    let root_name: PathBuf = match dir.file_name() {
        Some(name) => PathBuf::from(name),
        None => std::fs::canonicalize(dir)
            .map_err(|e| ActionError::io(dir, e))?
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("archive")),
    };

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
    }

    let file = File::create(output).map_err(|e| ActionError::io(output, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(&root_name, dir)
        .map_err(|e| ActionError::io(dir, e))?;

    let encoder = builder.into_inner().map_err(|e| ActionError::io(output, e))?;
    encoder.finish().map_err(|e| ActionError::io(output, e))?;

    let entries = list_tar_gz(output)?.len();
    let size_bytes = std::fs::metadata(output)
        .map_err(|e| ActionError::io(output, e))?
        .len();

    Ok(ArchiveStats {
        entries,
        size_bytes,
    })
}

/// Paths of every entry in a `.tar.gz`
pub fn list_tar_gz(path: &Path) -> Result<Vec<String>, ActionError> {
    let file = File::open(path).map_err(|e| ActionError::io(path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut names = Vec::new();
    for entry in archive.entries().map_err(|e| ActionError::io(path, e))? {
        let entry = entry.map_err(|e| ActionError::io(path, e))?;
        let name = entry.path().map_err(|e| ActionError::io(path, e))?;
        names.push(name.to_string_lossy().trim_end_matches('/').to_string());
    }
    Ok(names)
}
