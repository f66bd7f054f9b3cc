//! Command request, output and error types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Shells a `run:` step can use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shell {
    /// `bash --noprofile --norc -eo pipefail -c`
    Bash,
    /// `sh -e -c`
    Sh,
    /// Any other program, invoked as `<program> -c`
    Other(String),
}

impl Shell {
    /// Parse a `shell:` value
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "bash" => Shell::Bash,
            "sh" => Shell::Sh,
            other => Shell::Other(other.to_string()),
        }
    }

    pub fn program(&self) -> &str {
        match self {
            Shell::Bash => "bash",
            Shell::Sh => "sh",
            Shell::Other(program) => program,
        }
    }

    /// Arguments placed before the script
    pub fn args(&self) -> Vec<&str> {
        match self {
            Shell::Bash => vec!["--noprofile", "--norc", "-eo", "pipefail", "-c"],
            Shell::Sh => vec!["-e", "-c"],
            Shell::Other(_) => vec!["-c"],
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::Bash
    }
}

/// A rendered command ready to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Script text
    pub command: String,

    pub shell: Shell,

    pub working_dir: PathBuf,

    /// Full process environment additions
    pub env: HashMap<String, String>,

    pub timeout: Duration,
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    /// Both streams interleaved in arrival order
    pub combined: String,
}

impl CommandOutput {
    /// Create a successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self {
            exit_code: 0,
            combined: stdout.clone(),
            stdout,
            stderr: String::new(),
        }
    }

    /// Create a failed output with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self {
            exit_code,
            combined: stderr.clone(),
            stdout: String::new(),
            stderr,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
