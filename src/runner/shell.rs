//! Shell executor - runs `run:` steps as subprocesses

use crate::runner::{
    CommandExecutor, CommandOutput, CommandRequest, OutputCallback, OutputLine, RunnerError,
};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound on captured output per stream; streaming still sees every line
const MAX_CAPTURED_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Executes commands through a local shell
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

fn append_capped(buffer: &mut String, line: &str) {
    if buffer.len() + line.len() + 1 > MAX_CAPTURED_OUTPUT_BYTES {
        return;
    }
    buffer.push_str(line);
    buffer.push('\n');
}

/// Read one line, replacing invalid UTF-8 instead of failing
///
/// Partial reads stay in `buf`, so a call dropped by `select!` resumes where
/// it stopped.
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.ends_with(b"\n") {
        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    Ok(Some(line))
}

/// The process group a command runs in, killed on drop unless disarmed
struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        if e != Errno::ESRCH {
            warn!("SIGKILL to process group {} failed: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    /// Run the request's script with `<shell> <args> <script>`
    ///
    /// Stdout and stderr are read line by line and forwarded to `callback`.
    /// A non-zero exit is reported through [`CommandOutput::exit_code`]; only
    /// failures to run the process at all are errors. The command runs in its
    /// own process group, which is killed when the timeout elapses or the
    /// returned future is dropped.
    async fn execute(
        &self,
        request: &CommandRequest,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, RunnerError> {
        let program = request.shell.program().to_string();
        debug!(
            "Spawning {} in {} (script length: {})",
            program,
            request.working_dir.display(),
            request.command.len()
        );

        let mut command = Command::new(&program);
        command
            .args(request.shell.args())
            .arg(&request.command)
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            shell: program.clone(),
            source,
        })?;
        let mut group = ProcessGroup { pid: child.id() };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Internal("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Internal("child stderr was not captured".to_string()))?;

        let mut output = CommandOutput::default();

        let run = async {
            let mut out_reader = BufReader::new(stdout);
            let mut err_reader = BufReader::new(stderr);
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            let mut out_done = false;
            let mut err_done = false;

            while !(out_done && err_done) {
                tokio::select! {
                    line = next_line_lossy(&mut out_reader, &mut out_buf), if !out_done => match line? {
                        Some(text) => {
                            append_capped(&mut output.stdout, &text);
                            append_capped(&mut output.combined, &text);
                            if let Some(cb) = callback {
                                cb.on_line(&OutputLine::stdout(text));
                            }
                        }
                        None => out_done = true,
                    },
                    line = next_line_lossy(&mut err_reader, &mut err_buf), if !err_done => match line? {
                        Some(text) => {
                            append_capped(&mut output.stderr, &text);
                            append_capped(&mut output.combined, &text);
                            if let Some(cb) = callback {
                                cb.on_line(&OutputLine::stderr(text));
                            }
                        }
                        None => err_done = true,
                    },
                }
            }

            child.wait().await
        };

        let result = timeout(request.timeout, run).await;
        let status = match result {
            Ok(Ok(status)) => {
                group.disarm();
                status
            }
            // dropping `group` kills whatever is left of the command
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Command timed out after {}s, killing {}",
                    request.timeout.as_secs(),
                    program
                );
                group.kill();
                let _ = child.kill().await;
                return Err(RunnerError::Timeout(request.timeout.as_secs()));
            }
        };

        output.exit_code = status.code().unwrap_or(-1);
        debug!(
            "{} exited with code {} ({} bytes of output)",
            program,
            output.exit_code,
            output.combined.len()
        );

        Ok(output)
    }
}
