//! Scenario-based tests for biscuit-ci

mod biscuit_workflow;
mod cancellation;
mod job_dependencies;
mod step_outputs;
