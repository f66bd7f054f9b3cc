//! biscuit-ci - run GitHub-style CI workflows locally

pub mod actions;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use actions::{BuiltinAction, LocalReleasePublisher, ReleasePublisher};
pub use core::{ExecutionStatus, Job, JobContext, JobState, Step, StepState, TriggerEvent, Workflow};
pub use execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use runner::{CommandExecutor, DryRunExecutor, RunnerConfig, ShellExecutor};
