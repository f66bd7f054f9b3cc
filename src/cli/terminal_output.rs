//! Live terminal output for `--stream`
//!
//! Prints each step's output lines as the engine emits them, prefixed with
//! the job id so interleaved output from concurrent jobs stays readable.
//! A header and separator are printed whenever a different step starts
//! producing output.

use crate::execution::ExecutionEvent;
use crate::runner::OutputStream;
use console::style;
use std::io::{self, Write};
use std::sync::Mutex;

/// Prints `StepOutput` events to the terminal
#[derive(Debug, Default)]
pub struct TerminalOutput {
    /// (job id, step) whose output was printed last
    current: Mutex<Option<(String, String)>>,
}

impl TerminalOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an engine event, printing anything it produces
    pub fn on_event(&self, event: &ExecutionEvent) {
        let lines = self.lines_for(event);
        if lines.is_empty() {
            return;
        }

        let is_stderr = matches!(
            event,
            ExecutionEvent::StepOutput {
                stream: OutputStream::Stderr,
                ..
            }
        );
        for line in lines {
            match line {
                Printed::Separator => self.print_separator(),
                Printed::Text(text) if is_stderr => eprintln!("{}", text),
                Printed::Text(text) => println!("{}", text),
            }
        }
        flush_stdout();
    }

    /// What `event` prints, in order
    fn lines_for(&self, event: &ExecutionEvent) -> Vec<Printed> {
        let ExecutionEvent::StepOutput {
            job_id, step, line, ..
        } = event
        else {
            return Vec::new();
        };

        let mut printed = Vec::new();
        let Ok(mut current) = self.current.lock() else {
            return printed;
        };

        let key = (job_id.clone(), step.clone());
        if current.as_ref() != Some(&key) {
            printed.push(Printed::Separator);
            printed.push(Printed::Text(format!(
                "{} {}",
                style(format!("[{}]", job_id)).cyan(),
                style(step).bold()
            )));
            *current = Some(key);
        }

        printed.push(Printed::Text(format!(
            "{} {}",
            style(format!("[{}]", job_id)).dim(),
            line
        )));
        printed
    }

    /// A horizontal rule spanning the terminal width (80 when unknown)
    fn print_separator(&self) {
        let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Printed {
    Separator,
    Text(String),
}

fn flush_stdout() {
    let _ = io::stdout().flush();
}
