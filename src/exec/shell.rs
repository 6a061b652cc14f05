// src/exec/shell.rs

//! Handler that runs a shell command.
//!
//! Used by the `taskloom` binary for tasks loaded from a TOML file.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::exec::handler::{Handler, HandlerFuture};
use crate::types::TaskId;

#[derive(Debug, Clone)]
pub struct ShellHandler {
    task: TaskId,
    cmd: String,
}

impl ShellHandler {
    pub fn new(task: impl Into<TaskId>, cmd: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            cmd: cmd.into(),
        }
    }
}

impl Handler for ShellHandler {
    fn run(&self, ctx: CancellationToken) -> HandlerFuture {
        let task = self.task.clone();
        let cmd = self.cmd.clone();

        Box::pin(async move {
            match run_command(&task, &cmd, ctx).await {
                Ok(CommandExit::Success) => Ok(()),
                Ok(CommandExit::Failed(code)) => Err(TaskError::Handler(format!(
                    "command exited with code {code}"
                ))),
                Ok(CommandExit::Killed) => Err(TaskError::Cancelled),
                Err(err) => Err(TaskError::Handler(format!("{err:#}"))),
            }
        })
    }
}

enum CommandExit {
    Success,
    Failed(i32),
    Killed,
}

async fn run_command(task: &str, cmd_line: &str, ctx: CancellationToken) -> Result<CommandExit> {
    info!(task = %task, cmd = %cmd_line, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };

    cmd.stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let task_name = task.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of task '{task}'"))?;
            let code = status.code().unwrap_or(-1);

            info!(
                task = %task,
                exit_code = code,
                success = status.success(),
                "task process exited"
            );

            if status.success() {
                Ok(CommandExit::Success)
            } else {
                Ok(CommandExit::Failed(code))
            }
        }

        _ = ctx.cancelled() => {
            info!(task = %task, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(task = %task, error = %e, "failed to kill child process on cancellation");
            }
            Ok(CommandExit::Killed)
        }
    }
}
