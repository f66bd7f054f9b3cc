//! Command execution for `run:` steps

pub mod config;
pub mod response;
pub mod shell;
pub mod streaming;

use async_trait::async_trait;
pub use config::RunnerConfig;
pub use response::{CommandOutput, CommandRequest, RunnerError, Shell};
pub use shell::ShellExecutor;
pub use streaming::{NoopCallback, OutputCallback, OutputLine, OutputStream};
use std::sync::Mutex;

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command, streaming its output lines to `callback`
    async fn execute(
        &self,
        request: &CommandRequest,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Executor that records commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    requests: Mutex<Vec<CommandRequest>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandExecutor for DryRunExecutor {
    async fn execute(
        &self,
        request: &CommandRequest,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, RunnerError> {
        let message = format!("[dry-run] {}", request.command.trim());
        if let Some(cb) = callback {
            cb.on_line(&OutputLine::stdout(message.clone()));
        }

        self.requests
            .lock()
            .map_err(|_| RunnerError::Internal("dry-run request log poisoned".to_string()))?
            .push(request.clone());

        Ok(CommandOutput::success(message))
    }
}
