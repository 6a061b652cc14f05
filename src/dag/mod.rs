// src/dag/mod.rs

//! Task registry, dependency graph and scheduling.
//!
//! - [`graph`] holds the cycle-checked dependency graph.
//! - [`registry`] owns registered tasks and the due timeline.
//! - [`selector`] computes the priority-ordered ready set.
//! - [`scheduler`] contains the single-writer state machine that claims
//!   tasks for dispatch and applies completion outcomes.
//! - [`task_info`] provides task definitions, status and dispatch types.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod graph;
pub mod registry;
pub mod scheduler;
pub mod scheduler_step;
pub mod selector;
pub mod task_info;

pub use graph::DependencyGraph;
pub use registry::TaskRegistry;
pub use scheduler::Scheduler;
pub use scheduler_step::{SchedulerStep, StopTask};
pub use selector::{dispatch_order, select_ready};
pub use task_info::{
    ActiveDispatch, RunState, ScheduledTask, StateChange, TaskDefinition, TaskInfo, TaskStatus,
};
