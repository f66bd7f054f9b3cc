//! Runner configuration

use crate::runner::Shell;
use std::path::PathBuf;

/// Default step timeout (the hosted runner's six hours)
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Configuration for a workflow run on the local host
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory that receives one workspace per run and job
    ///
    /// Defaults to `<data dir>/biscuit-ci/runs`.
    pub workspace_root: PathBuf,

    /// Source tree copied by `actions/checkout`
    pub source_dir: PathBuf,

    /// Shell used for `run:` steps without `shell:`
    pub default_shell: Shell,

    /// Timeout for steps without `timeout-minutes`
    pub default_timeout_secs: u64,

    /// Value of `github.repository` (owner/name)
    pub repository: Option<String>,

    /// Remove job workspaces after the run
    pub cleanup: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            workspace_root: data_dir.join("biscuit-ci").join("runs"),
            source_dir: PathBuf::from("."),
            default_shell: Shell::Bash,
            default_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            repository: None,
            cleanup: false,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_source_dir(mut self, source: impl Into<PathBuf>) -> Self {
        self.source_dir = source.into();
        self
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.default_shell = shell;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Workspace of one job in one run
    pub fn job_workspace(&self, execution_id: &str, job_id: &str) -> PathBuf {
        self.workspace_root.join(execution_id).join(job_id)
    }

    /// Scratch directory for `$GITHUB_OUTPUT` / `$GITHUB_ENV` files of one job
    pub fn job_temp_dir(&self, execution_id: &str, job_id: &str) -> PathBuf {
        self.workspace_root
            .join(execution_id)
            .join("_temp")
            .join(job_id)
    }
}
