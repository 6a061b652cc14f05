// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod retry;
pub mod trigger;
pub mod types;

pub use clock::{Clock, ClockError, ManualClock, SystemClock};
pub use dag::{StateChange, StopTask, TaskDefinition, TaskStatus};
pub use engine::{
    SchedulerBuilder, SchedulerConfig, SchedulerHandle, StateObserver, TracingObserver,
};
pub use errors::{SchedulerError, TaskError};
pub use exec::{Handler, HandlerRef, ShellHandler, handler_fn};
pub use retry::RetryPolicy;
pub use trigger::{CronSpec, TriggerSpec};
pub use types::{DependencyFailurePolicy, TaskId, TaskState};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the scheduler loop with the real worker pool
/// - task registration in dependency order
/// - Ctrl-C handling (graceful `stop()`)
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let mut scheduler_config = cfg.scheduler_config().clone();
    if let Some(max) = args.max_concurrency {
        scheduler_config.max_concurrency = max as usize;
    }

    if args.dry_run {
        print_dry_run(&cfg, &scheduler_config);
        return Ok(());
    }

    let handle = SchedulerBuilder::new(scheduler_config)
        .observer(TracingObserver)
        .start()?;

    for def in cfg.task_definitions() {
        let id = handle.register_task(def).await?;
        debug!(task = %id, "registered task from config");
    }
    info!(tasks = cfg.tasks().len(), "all tasks registered; running until Ctrl-C");

    tokio::select! {
        result = handle.wait() => result?,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Ctrl-C received; shutting down");
                handle.stop().await?;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for Ctrl+C; running until the loop exits");
                handle.wait().await?;
            }
        },
    }

    Ok(())
}

/// Simple dry-run output: print scheduler settings and tasks.
fn print_dry_run(cfg: &ConfigFile, scheduler: &SchedulerConfig) {
    println!("taskloom dry-run");
    println!("  scheduler.max_concurrency = {}", scheduler.max_concurrency);
    println!("  scheduler.poll_interval = {:?}", scheduler.poll_interval);
    println!(
        "  scheduler.dependency_failure_policy = {}",
        scheduler.dependency_failure_policy
    );
    println!();

    println!("tasks ({}, in registration order):", cfg.tasks().len());
    for task in cfg.tasks() {
        println!("  - {}", task.id);
        println!("      cmd: {}", task.cmd);
        println!("      trigger: {}", task.trigger);
        if task.priority != 0 {
            println!("      priority: {}", task.priority);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(timeout) = task.timeout {
            println!("      timeout: {timeout:?}");
        }
        println!(
            "      retry: max_attempts={} base_delay={:?} multiplier={} jitter={}",
            task.retry.max_attempts, task.retry.base_delay, task.retry.multiplier, task.retry.jitter
        );
    }

    debug!("dry-run complete (no execution)");
}
