// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running the handlers of
//! dispatched tasks and reporting back to the scheduler loop via
//! `RuntimeEvent`s.
//!
//! - [`handler`] defines the `Handler` trait and closure adapters.
//! - [`shell`] provides `ShellHandler`, which runs a shell command.
//! - [`executor_loop`] owns the bounded worker pool.
//! - [`task_runner`] runs a single execution with timeout and cancellation.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `WorkerPoolBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod handler;
pub mod shell;
pub mod task_runner;

pub use backend::{BackendFuture, ExecutorBackend, WorkerPoolBackend};
pub use executor_loop::{PoolCommand, spawn_worker_pool};
pub use handler::{FnHandler, Handler, HandlerFuture, HandlerRef, handler_fn};
pub use shell::ShellHandler;
