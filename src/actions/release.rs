//! Release publishing behind a common trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

/// Error types for release publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("release '{0}' already exists")]
    AlreadyExists(String),

    #[error("release asset '{0}' already exists")]
    AssetExists(String),

    #[error("invalid {kind} '{name}': must be a single file name")]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid upload URL '{0}'")]
    InvalidUploadUrl(String),

    #[error("missing API token (set GITHUB_TOKEN)")]
    MissingToken,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PublishError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Inputs of `actions/create-release`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub tag_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
}

/// A file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub download_url: String,
}

/// A created release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub tag_name: String,
    pub name: String,
    #[serde(default)]
    pub body: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
    pub html_url: String,
    /// Where `actions/upload-release-asset` sends files
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// Trait for release backends
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        token: Option<&str>,
    ) -> Result<Release, PublishError>;

    async fn upload_asset(
        &self,
        upload_url: &str,
        asset_path: &Path,
        name: &str,
        content_type: &str,
        token: Option<&str>,
    ) -> Result<ReleaseAsset, PublishError>;
}

const UPLOAD_SCHEME: &str = "file://";
const MANIFEST_FILE: &str = "release.json";

/// Tag names become directory names; `/` is not allowed in those
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

/// Reject names that would not stay a single entry inside the release directory
fn check_file_name(kind: &'static str, name: &str) -> Result<(), PublishError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if invalid {
        return Err(PublishError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Publishes releases into a local directory, one subdirectory per tag
///
/// ```text
/// <root>/<tag>/release.json
/// <root>/<tag>/<asset>
/// ```
#[derive(Debug, Clone)]
pub struct LocalReleasePublisher {
    root: PathBuf,
}

impl LocalReleasePublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn release_dir(&self, tag: &str) -> Result<PathBuf, PublishError> {
        let dir_name = sanitize_tag(tag);
        check_file_name("tag", &dir_name)?;
        Ok(self.root.join(dir_name))
    }

    /// Read back a published release
    pub fn load_release(&self, tag: &str) -> Result<Release, PublishError> {
        let manifest = self.release_dir(tag)?.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest).map_err(|e| PublishError::io(&manifest, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_manifest(&self, dir: &Path, release: &Release) -> Result<(), PublishError> {
        let manifest = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(release)?;
        tokio::fs::write(&manifest, json)
            .await
            .map_err(|e| PublishError::io(&manifest, e))
    }
}

#[async_trait]
impl ReleasePublisher for LocalReleasePublisher {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        _token: Option<&str>,
    ) -> Result<Release, PublishError> {
        let dir = self.release_dir(&request.tag_name)?;
        if dir.join(MANIFEST_FILE).exists() {
            return Err(PublishError::AlreadyExists(request.tag_name.clone()));
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PublishError::io(&dir, e))?;
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| PublishError::io(&dir, e))?;

        let release = Release {
            id: sanitize_tag(&request.tag_name),
            tag_name: request.tag_name.clone(),
            name: request.name.clone(),
            body: request.body.clone(),
            draft: request.draft,
            prerelease: request.prerelease,
            html_url: format!("{}{}", UPLOAD_SCHEME, dir.display()),
            upload_url: format!("{}{}", UPLOAD_SCHEME, dir.display()),
            assets: Vec::new(),
        };
        self.write_manifest(&dir, &release).await?;

        info!("Created release {} in {}", release.tag_name, dir.display());
        Ok(release)
    }

    async fn upload_asset(
        &self,
        upload_url: &str,
        asset_path: &Path,
        name: &str,
        content_type: &str,
        _token: Option<&str>,
    ) -> Result<ReleaseAsset, PublishError> {
        check_file_name("asset name", name)?;
        let dir = upload_url
            .strip_prefix(UPLOAD_SCHEME)
            .map(PathBuf::from)
            .filter(|dir| dir.join(MANIFEST_FILE).exists())
            .ok_or_else(|| PublishError::InvalidUploadUrl(upload_url.to_string()))?;

        let manifest = dir.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&manifest)
            .await
            .map_err(|e| PublishError::io(&manifest, e))?;
        let mut release: Release = serde_json::from_str(&raw)?;

        if release.assets.iter().any(|a| a.name == name) {
            return Err(PublishError::AssetExists(name.to_string()));
        }

        let target = dir.join(name);
        let size = tokio::fs::copy(asset_path, &target)
            .await
            .map_err(|e| PublishError::io(asset_path, e))?;

        let asset = ReleaseAsset {
            name: name.to_string(),
            content_type: content_type.to_string(),
            size,
            download_url: format!("{}{}", UPLOAD_SCHEME, target.display()),
        };
        release.assets.push(asset.clone());
        self.write_manifest(&dir, &release).await?;

        info!("Uploaded {} to release {}", name, release.tag_name);
        Ok(asset)
    }
}

/// Publisher that logs what would be published
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    releases: Mutex<Vec<ReleaseRequest>>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases requested so far
    pub fn releases(&self) -> Vec<ReleaseRequest> {
        self.releases
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReleasePublisher for DryRunPublisher {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        _token: Option<&str>,
    ) -> Result<Release, PublishError> {
        info!("[dry-run] would create release {}", request.tag_name);
        if let Ok(mut releases) = self.releases.lock() {
            releases.push(request.clone());
        }

        let tag = sanitize_tag(&request.tag_name);
        Ok(Release {
            id: tag.clone(),
            tag_name: request.tag_name.clone(),
            name: request.name.clone(),
            body: request.body.clone(),
            draft: request.draft,
            prerelease: request.prerelease,
            html_url: format!("dry-run://{}", tag),
            upload_url: format!("dry-run://{}", tag),
            assets: Vec::new(),
        })
    }

    async fn upload_asset(
        &self,
        upload_url: &str,
        asset_path: &Path,
        name: &str,
        content_type: &str,
        _token: Option<&str>,
    ) -> Result<ReleaseAsset, PublishError> {
        info!(
            "[dry-run] would upload {} as {} to {}",
            asset_path.display(),
            name,
            upload_url
        );
        let size = tokio::fs::metadata(asset_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(ReleaseAsset {
            name: name.to_string(),
            content_type: content_type.to_string(),
            size,
            download_url: format!("{}/{}", upload_url, name),
        })
    }
}
