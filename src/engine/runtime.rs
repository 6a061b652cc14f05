// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::dag::ScheduledTask;
use crate::errors::{Result, SchedulerError};
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::handle::ControlRequest;
use super::observer::StateObserver;
use super::{CoreCommand, RuntimeEvent};

/// The scheduler loop.
///
/// Drives the core state machine in response to `RuntimeEvent`s and the
/// clock, and delegates actual execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. Each iteration:
///
/// 1. reads the clock once,
/// 2. applies every queued event (completions, control requests, shutdown),
/// 3. ticks the core and dispatches what it selected,
/// 4. publishes state changes and checks invariants,
/// 5. sleeps until the next due time, an event, or `poll_interval`.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn StateObserver>>,
    poll_interval: Duration,
    last_now: Option<DateTime<Utc>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("observers", &self.observers.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            clock,
            observers: Vec::new(),
            poll_interval: Duration::from_secs(1),
            last_now: None,
        }
    }

    pub fn with_observers(mut self, observers: Vec<Arc<dyn StateObserver>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Main event loop.
    ///
    /// Returns `Ok(())` after a graceful shutdown and an error if the loop
    /// died on a clock failure or an invariant violation. Either way the
    /// core ends up stopped and queued callers are answered with
    /// `SchedulerStopped`.
    pub async fn run(mut self) -> Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "taskloom scheduler loop started"
        );

        let mut acks = Vec::new();
        let outcome = self.run_loop(&mut acks).await;

        if let Err(err) = &outcome {
            error!(error = %err, "scheduler loop failed; stopping");
            self.core.mark_stopped();
            if let Err(cancel_err) = self.executor.cancel_all().await {
                debug!(error = %cancel_err, "could not cancel running tasks");
            }
        }

        self.finish(acks);
        info!("scheduler loop exited");
        outcome
    }

    async fn run_loop(&mut self, acks: &mut Vec<oneshot::Sender<()>>) -> Result<()> {
        let mut inbox: Vec<RuntimeEvent> = Vec::new();

        loop {
            while let Ok(event) = self.event_rx.try_recv() {
                inbox.push(event);
            }

            let now = self.now()?;

            for event in inbox.drain(..) {
                if !self.handle_event(event, now, acks).await? {
                    self.publish_changes();
                    return Ok(());
                }
            }

            let step = self.core.tick(now);
            self.execute(step.commands).await?;
            self.publish_changes();
            self.core.check_invariants()?;

            let sleep_for = self.sleep_duration(now);
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => inbox.push(event),
                    None => {
                        info!("runtime event channel closed; exiting");
                        return Ok(());
                    }
                },
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Apply one event. Returns `false` once the loop should exit.
    async fn handle_event(
        &mut self,
        event: RuntimeEvent,
        now: DateTime<Utc>,
        acks: &mut Vec<oneshot::Sender<()>>,
    ) -> Result<bool> {
        match event {
            RuntimeEvent::TaskCompleted(completion) => {
                let step = self.core.completion(completion, now);
                self.execute(step.commands).await?;
                Ok(step.keep_running)
            }
            RuntimeEvent::Control(request) => {
                self.handle_control(request, now).await?;
                Ok(true)
            }
            RuntimeEvent::ShutdownRequested { ack } => {
                acks.extend(ack);
                let step = self.core.shutdown();
                self.execute(step.commands).await?;
                Ok(step.keep_running)
            }
        }
    }

    async fn handle_control(&mut self, request: ControlRequest, now: DateTime<Utc>) -> Result<()> {
        debug!(request = request.kind(), "control request received");

        // A dropped reply receiver only means the caller stopped waiting.
        match request {
            ControlRequest::Register { def, reply } => {
                let _ = reply.send(self.core.register(def, now));
            }
            ControlRequest::Unregister { task, reply } => {
                let _ = reply.send(self.core.unregister(&task));
            }
            ControlRequest::Status { task, reply } => {
                let _ = reply.send(self.core.status(&task, now));
            }
            ControlRequest::StopTask { task, reply } => {
                let (result, step) = self.core.stop_task(&task, now);
                self.execute(step.commands).await?;
                let _ = reply.send(result);
            }
            ControlRequest::ResetTask { task, reply } => {
                let _ = reply.send(self.core.reset_task(&task, now));
            }
        }
        Ok(())
    }

    /// Execute commands from the core.
    async fn execute(&mut self, commands: Vec<CoreCommand>) -> Result<()> {
        for command in commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
                CoreCommand::CancelTask { task, dispatch_id } => {
                    self.executor.cancel_task(task, dispatch_id).await?;
                }
                CoreCommand::CancelAll => self.executor.cancel_all().await?,
                CoreCommand::RequestExit => info!("core issued RequestExit command"),
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        let dispatch_ids: Vec<_> = tasks.iter().map(|t| t.dispatch_id).collect();
        debug!(?ids, ?dispatch_ids, "dispatching ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    fn now(&mut self) -> Result<DateTime<Utc>> {
        match self.clock.now() {
            Ok(now) => {
                self.last_now = Some(now);
                Ok(now)
            }
            Err(err) => {
                error!(error = %err, "clock unavailable");
                Err(SchedulerError::ClockUnavailable(err))
            }
        }
    }

    fn sleep_duration(&self, now: DateTime<Utc>) -> Duration {
        self.core
            .next_wake_at(now)
            .and_then(|at| (at - now).to_std().ok())
            .map_or(self.poll_interval, |until| until.min(self.poll_interval))
    }

    fn publish_changes(&mut self) {
        let changes = self.core.take_changes();
        if self.observers.is_empty() {
            return;
        }
        for change in &changes {
            for observer in &self.observers {
                observer.on_state_change(change);
            }
        }
    }

    /// Close the inbox, answer whatever is still queued, and release every
    /// shutdown waiter.
    fn finish(&mut self, mut acks: Vec<oneshot::Sender<()>>) {
        self.event_rx.close();

        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                RuntimeEvent::Control(request) => request.reject(SchedulerError::SchedulerStopped),
                RuntimeEvent::TaskCompleted(completion) => {
                    if let Some(now) = self.last_now {
                        self.core.completion(completion, now);
                    }
                }
                RuntimeEvent::ShutdownRequested { ack } => acks.extend(ack),
            }
        }

        self.publish_changes();

        for ack in acks {
            let _ = ack.send(());
        }
    }
}
