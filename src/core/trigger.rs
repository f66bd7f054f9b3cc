//! Trigger events and `on:` filters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Repository event kinds a workflow can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl EventKind {
    /// The `github.event_name` value
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event that may trigger a workflow run
///
/// For pull requests `git_ref` is the base branch the request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub kind: EventKind,
    pub git_ref: String,
    #[serde(default)]
    pub sha: Option<String>,
}

impl TriggerEvent {
    pub fn push(git_ref: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Push,
            git_ref: normalize_ref(&git_ref.into()),
            sha: None,
        }
    }

    pub fn pull_request(base_ref: impl Into<String>) -> Self {
        Self {
            kind: EventKind::PullRequest,
            git_ref: normalize_ref(&base_ref.into()),
            sha: None,
        }
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Branch name with the `refs/heads/` prefix removed
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

/// Expand short branch names to full refs; tags and full refs pass through
fn normalize_ref(git_ref: &str) -> String {
    if git_ref.starts_with("refs/") {
        git_ref.to_string()
    } else {
        format!("refs/heads/{}", git_ref)
    }
}

/// Branch filter for one event kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilter {
    /// Branch patterns; empty means every branch
    #[serde(default)]
    pub branches: Vec<String>,
}

impl BranchFilter {
    pub fn matches(&self, branch: &str) -> bool {
        if self.branches.is_empty() {
            return true;
        }

        self.branches.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix('*') {
                branch.starts_with(prefix)
            } else {
                branch == pattern
            }
        })
    }
}

/// The workflow's `on:` section
///
/// Accepts `on: push`, `on: [push, pull_request]` or the mapping form with
/// per-event branch filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerConfig {
    pub push: Option<BranchFilter>,

    pub pull_request: Option<BranchFilter>,
}

#[derive(Deserialize)]
struct TriggerMap {
    #[serde(default, deserialize_with = "deserialize_filter")]
    push: Option<BranchFilter>,

    #[serde(default, deserialize_with = "deserialize_filter")]
    pull_request: Option<BranchFilter>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTrigger {
    One(String),
    Many(Vec<String>),
    Map(TriggerMap),
}

/// `push:` with no body (YAML null) means "every branch"
fn deserialize_filter<'de, D>(deserializer: D) -> Result<Option<BranchFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let filter: Option<BranchFilter> = Option::deserialize(deserializer)?;
    Ok(Some(filter.unwrap_or_default()))
}

impl<'de> Deserialize<'de> for TriggerConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let names = match RawTrigger::deserialize(deserializer)? {
            RawTrigger::Map(map) => {
                return Ok(TriggerConfig {
                    push: map.push,
                    pull_request: map.pull_request,
                })
            }
            RawTrigger::One(name) => vec![name],
            RawTrigger::Many(names) => names,
        };

        let mut config = TriggerConfig::default();
        for name in names {
            match name.as_str() {
                "push" => config.push = Some(BranchFilter::default()),
                "pull_request" => config.pull_request = Some(BranchFilter::default()),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "unsupported event '{}' (expected push or pull_request)",
                        other
                    )))
                }
            }
        }
        Ok(config)
    }
}

impl TriggerConfig {
    /// Check whether `event` triggers the workflow
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let filter = match event.kind {
            EventKind::Push => self.push.as_ref(),
            EventKind::PullRequest => self.pull_request.as_ref(),
        };

        filter.is_some_and(|f| f.matches(event.branch()))
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_none() && self.pull_request.is_none()
    }
}
