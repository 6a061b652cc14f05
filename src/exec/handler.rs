// src/exec/handler.rs

//! The unit of business logic a task runs.
//!
//! A [`Handler`] is opaque to the scheduler: it receives a
//! [`CancellationToken`] and resolves to `Ok(())` or a [`TaskError`].
//! Handlers should watch the token and return promptly once it fires; the
//! executor enforces per-task timeouts regardless.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;

/// Boxed future returned by [`Handler::run`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a handler object.
pub type HandlerRef = Arc<dyn Handler>;

pub trait Handler: Send + Sync + 'static {
    /// Start one execution. Every call returns a fresh, independent future.
    fn run(&self, ctx: CancellationToken) -> HandlerFuture;
}

/// Handler backed by a closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn run(&self, ctx: CancellationToken) -> HandlerFuture {
        Box::pin((self.f)(ctx))
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wrap a closure as a shared [`HandlerRef`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerRef
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}
