//! Streaming support for command execution
//!
//! Commands write to stdout and stderr while they run. Each complete line is
//! delivered to an [`OutputCallback`] as soon as it is read, so long builds show
//! progress instead of a single dump at the end.
//!
//! # Example
//!
//! ```
//! use biscuit_ci::runner::{OutputCallback, OutputLine, OutputStream};
//!
//! struct LivePrinter;
//!
//! impl OutputCallback for LivePrinter {
//!     fn on_line(&self, line: &OutputLine) {
//!         match line.stream {
//!             OutputStream::Stdout => println!("{}", line.text),
//!             OutputStream::Stderr => eprintln!("{}", line.text),
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of command output, without the trailing newline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// Callback for output lines as they arrive
///
/// This trait is object-safe and can be used as `&dyn OutputCallback`.
pub trait OutputCallback: Send + Sync {
    /// Called once per line, in the order lines were read
    fn on_line(&self, line: &OutputLine);
}

/// Callback that discards every line
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl OutputCallback for NoopCallback {
    fn on_line(&self, _line: &OutputLine) {}
}

impl<F> OutputCallback for F
where
    F: Fn(&OutputLine) + Send + Sync,
{
    fn on_line(&self, line: &OutputLine) {
        self(line)
    }
}
