//! Core domain models

pub mod config;
pub mod context;
pub mod expression;
pub mod job;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::JobContext;
pub use job::Job;
pub use state::{ExecutionStatus, JobState, StepState, WorkflowState};
pub use step::{Step, StepAction};
pub use trigger::{EventKind, TriggerEvent};
pub use workflow::Workflow;
