//! Callback contract and delivery executors for asynchronous calls.
//!
//! # Design
//! `Callback` methods take `self` by value, so a callback can be invoked at
//! most once by construction; `Call::start` invokes it exactly once. Where it
//! runs is decided by an `Executor`: the call engine hands it a task after
//! the transport completes, and the executor decides which thread runs it.
//! A UI consumer can pass a channel its main loop drains to get callbacks on
//! the UI thread without this crate knowing anything about UI.

use std::sync::mpsc::{SendError, Sender};

use tracing::warn;

use crate::error::Error;

/// Unit of work handed to an `Executor`.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Receives the outcome of `Call::start`.
///
/// Implemented for every `FnOnce(Result<T, Error>)`, so a closure is usually
/// all a caller needs.
pub trait Callback<T>: Send + 'static {
    fn on_success(self, value: T);
    fn on_failure(self, error: Error);
}

impl<T, F> Callback<T> for F
where
    F: FnOnce(Result<T, Error>) + Send + 'static,
{
    fn on_success(self, value: T) {
        self(Ok(value))
    }

    fn on_failure(self, error: Error) {
        self(Err(error))
    }
}

pub(crate) fn deliver<T, C: Callback<T>>(callback: C, outcome: Result<T, Error>) {
    match outcome {
        Ok(value) => callback.on_success(value),
        Err(error) => callback.on_failure(error),
    }
}

/// Decides which thread runs a callback.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);
}

/// Runs the callback on whichever thread completed the transport call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) {
        task()
    }
}

/// Runs the callback as a task on a tokio runtime.
///
/// If the runtime is shut down and drops the task unrun, the task runs
/// inline on the dropping thread.
impl Executor for tokio::runtime::Handle {
    fn execute(&self, task: Task) {
        let task = RunOnDrop(Some(task));
        drop(self.spawn(async move { task.run() }));
    }
}

struct RunOnDrop(Option<Task>);

impl RunOnDrop {
    fn run(mut self) {
        if let Some(task) = self.0.take() {
            task()
        }
    }
}

impl Drop for RunOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            warn!("runtime dropped a callback task; running callback inline");
            task()
        }
    }
}

/// Queues the callback for whoever drains the matching `Receiver`.
///
/// If the receiver is gone the task runs inline, so the callback still
/// fires exactly once.
impl Executor for Sender<Task> {
    fn execute(&self, task: Task) {
        if let Err(SendError(task)) = self.send(task) {
            warn!("callback queue receiver dropped; running callback inline");
            task()
        }
    }
}
