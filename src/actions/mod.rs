//! Built-in actions for `uses:` steps
//!
//! | reference                          | effect                                   |
//! |------------------------------------|------------------------------------------|
//! | `actions/checkout@*`               | copy the source tree into the workspace  |
//! | `actions/create-release@*`         | create a tagged release                  |
//! | `actions/upload-release-asset@*`   | attach a file to a release               |
//! | `ci/archive@*`                     | tar.gz a directory without a shell       |

pub mod archive;
pub mod checkout;
pub mod github;
pub mod release;

pub use github::GitHubReleasePublisher;
pub use release::{
    DryRunPublisher, LocalReleasePublisher, PublishError, Release, ReleaseAsset,
    ReleasePublisher, ReleaseRequest,
};

use crate::core::expression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Error types for built-in actions
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' requires input '{input}'")]
    MissingInput { action: String, input: String },

    #[error("invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("checkout limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ActionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Kinds of built-in action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Checkout,
    CreateRelease,
    UploadReleaseAsset,
    Archive,
}

impl ActionKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "actions/checkout" => Some(ActionKind::Checkout),
            "actions/create-release" => Some(ActionKind::CreateRelease),
            "actions/upload-release-asset" => Some(ActionKind::UploadReleaseAsset),
            "ci/archive" => Some(ActionKind::Archive),
            _ => None,
        }
    }

    fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Checkout => &[],
            ActionKind::CreateRelease => &["tag_name"],
            ActionKind::UploadReleaseAsset => {
                &["upload_url", "asset_path", "asset_name", "asset_content_type"]
            }
            ActionKind::Archive => &["path", "output"],
        }
    }
}

/// A parsed `uses:` reference with its (unrendered) inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinAction {
    /// Reference as written, e.g. `actions/checkout@v2`
    pub reference: String,
    pub kind: ActionKind,
    pub with: BTreeMap<String, String>,
}

impl BuiltinAction {
    /// Parse a `uses:` reference and check its required inputs are present
    pub fn parse(uses: &str, with: &BTreeMap<String, String>) -> Result<Self, ActionError> {
        let name = uses.split('@').next().unwrap_or(uses).trim();
        let kind =
            ActionKind::from_name(name).ok_or_else(|| ActionError::UnknownAction(uses.to_string()))?;

        for input in kind.required_inputs() {
            if !with.contains_key(*input) {
                return Err(ActionError::MissingInput {
                    action: uses.to_string(),
                    input: input.to_string(),
                });
            }
        }

        Ok(Self {
            reference: uses.to_string(),
            kind,
            with: with.clone(),
        })
    }

    /// Render every input against the job's variables
    pub fn render_inputs(&self, variables: &HashMap<String, String>) -> BTreeMap<String, String> {
        self.with
            .iter()
            .map(|(k, v)| (k.clone(), expression::render(v, variables)))
            .collect()
    }
}

/// What an action needs from the job running it
pub struct ActionContext<'a> {
    /// Job workspace; relative paths resolve against it
    pub workspace: &'a Path,

    /// Tree copied by checkout
    pub source_dir: &'a Path,

    pub publisher: &'a dyn ReleasePublisher,

    /// API token for release actions
    pub token: Option<&'a str>,
}

impl ActionContext<'_> {
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }
}

/// Result of a finished action
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Human-readable log
    pub log: String,

    /// Values exposed as `steps.<id>.outputs.*`
    pub outputs: HashMap<String, String>,
}

fn required<'a>(inputs: &'a BTreeMap<String, String>, input: &str) -> Result<&'a str, ActionError> {
    inputs
        .get(input)
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ActionError::InvalidInput {
            input: input.to_string(),
            reason: "must not be empty".to_string(),
        })
}

fn parse_bool(inputs: &BTreeMap<String, String>, input: &str) -> Result<bool, ActionError> {
    match inputs.get(input).map(|s| s.trim()) {
        None | Some("") | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(ActionError::InvalidInput {
            input: input.to_string(),
            reason: format!("expected true or false, got '{}'", other),
        }),
    }
}

/// Run a built-in action with already-rendered inputs
pub async fn run_action(
    action: &BuiltinAction,
    inputs: &BTreeMap<String, String>,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    info!("Running action {}", action.reference);

    match action.kind {
        ActionKind::Checkout => {
            let stats = checkout::checkout_source(ctx.source_dir, ctx.workspace).await?;
            Ok(ActionOutcome {
                log: format!(
                    "Checked out {} files ({} bytes) from {} into {}",
                    stats.files,
                    stats.bytes,
                    ctx.source_dir.display(),
                    ctx.workspace.display()
                ),
                outputs: HashMap::new(),
            })
        }
        ActionKind::Archive => {
            let source = ctx.resolve(required(inputs, "path")?);
            let output = ctx.resolve(required(inputs, "output")?);
            let stats = archive::create_tar_gz(&source, &output).await?;
            Ok(ActionOutcome {
                log: format!(
                    "Archived {} entries from {} into {} ({} bytes)",
                    stats.entries,
                    source.display(),
                    output.display(),
                    stats.size_bytes
                ),
                outputs: HashMap::from([("archive_path".to_string(), output.display().to_string())]),
            })
        }
        ActionKind::CreateRelease => {
            let tag_name = required(inputs, "tag_name")?.to_string();
            let request = ReleaseRequest {
                name: inputs
                    .get("release_name")
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_else(|| tag_name.clone()),
                tag_name,
                body: inputs.get("body").cloned(),
                draft: parse_bool(inputs, "draft")?,
                prerelease: parse_bool(inputs, "prerelease")?,
            };

            let release = ctx.publisher.create_release(&request, ctx.token).await?;
            Ok(ActionOutcome {
                log: format!("Created release '{}' (tag {})", release.name, release.tag_name),
                outputs: HashMap::from([
                    ("id".to_string(), release.id.clone()),
                    ("html_url".to_string(), release.html_url.clone()),
                    ("upload_url".to_string(), release.upload_url.clone()),
                ]),
            })
        }
        ActionKind::UploadReleaseAsset => {
            let upload_url = required(inputs, "upload_url")?;
            let asset_path = ctx.resolve(required(inputs, "asset_path")?);
            let asset_name = required(inputs, "asset_name")?;
            let content_type = required(inputs, "asset_content_type")?;

            let asset = ctx
                .publisher
                .upload_asset(upload_url, &asset_path, asset_name, content_type, ctx.token)
                .await?;
            Ok(ActionOutcome {
                log: format!(
                    "Uploaded {} ({} bytes, {})",
                    asset.name, asset.size, asset.content_type
                ),
                outputs: HashMap::from([(
                    "browser_download_url".to_string(),
                    asset.download_url.clone(),
                )]),
            })
        }
    }
}
