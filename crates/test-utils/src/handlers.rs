//! Ready-made handlers for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskloom::errors::TaskError;
use taskloom::exec::{HandlerRef, handler_fn};

/// Handler that always succeeds immediately.
pub fn succeed() -> HandlerRef {
    handler_fn(|_ctx| async { Ok::<(), TaskError>(()) })
}

/// Handler that always fails with `msg`.
pub fn fail(msg: &str) -> HandlerRef {
    let msg = msg.to_string();
    handler_fn(move |_ctx| {
        let msg = msg.clone();
        async move { Err(TaskError::Handler(msg)) }
    })
}

/// Handler that panics.
pub fn panics() -> HandlerRef {
    handler_fn(|_ctx| async {
        let blow_up = true;
        if blow_up {
            panic!("handler blew up");
        }
        Ok::<(), TaskError>(())
    })
}

/// Sleeps for `dur`, returning `Cancelled` early if the token fires.
pub fn sleep_cooperatively(dur: Duration) -> HandlerRef {
    handler_fn(move |ctx| async move {
        tokio::select! {
            _ = tokio::time::sleep(dur) => Ok(()),
            _ = ctx.cancelled() => Err(TaskError::Cancelled),
        }
    })
}

/// Sleeps for `dur` and never looks at the cancellation token.
pub fn sleep_ignoring_cancel(dur: Duration) -> HandlerRef {
    handler_fn(move |_ctx| async move {
        tokio::time::sleep(dur).await;
        Ok::<(), TaskError>(())
    })
}

/// Handler that plays back a script of outcomes (then succeeds) and counts
/// its invocations.
#[derive(Clone, Default)]
pub struct Scripted {
    calls: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Result<(), TaskError>>>>,
}

impl Scripted {
    pub fn new(outcomes: impl IntoIterator<Item = Result<(), TaskError>>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
        }
    }

    /// Fails `n` times, then succeeds forever.
    pub fn failing_times(n: usize) -> Self {
        Self::new((0..n).map(|i| Err(TaskError::Handler(format!("failure #{}", i + 1)))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn handler(&self) -> HandlerRef {
        let calls = Arc::clone(&self.calls);
        let script = Arc::clone(&self.script);
        handler_fn(move |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            let outcome = script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or(Ok(()));
            async move { outcome }
        })
    }
}
