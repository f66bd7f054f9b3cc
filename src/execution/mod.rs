//! Workflow execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EngineError, EventEmitter, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, JobExecutor, RunContext};
pub use scheduler::{JobScheduler, SchedulingStrategy};
