//! The deferred-scheduling collaborator
//!
//! Executors never advance a run synchronously inside a continuation
//! invocation. Every resumption and completion delivery is handed to a
//! [`Schedule`] implementation and runs on a later turn, which bounds stack
//! depth for task lists of any length and keeps same-turn ordering
//! deterministic.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::runtime::Handle;

use crate::error::{TandemError, TandemResult};

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Schedules a job to run after the current synchronous turn completes.
pub trait Schedule: Send + Sync {
    fn defer(&self, job: Job);
}

/// Defers jobs onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Scheduler backed by an explicit runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler backed by the ambient runtime.
    pub fn current() -> TandemResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| TandemError::NoRuntime)
    }
}

impl Schedule for TokioScheduler {
    fn defer(&self, job: Job) {
        self.handle.spawn(async move { job() });
    }
}

/// Queue-backed scheduler for hosts without a native deferral primitive.
///
/// Jobs accumulate until the owner drains them with
/// [`run_until_idle`](QueueScheduler::run_until_idle). Within one drain, jobs
/// run in the order they were deferred, including jobs deferred by earlier
/// jobs of the same drain. Useful for embedding the executors in a custom
/// loop and for deterministic tests.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<Job>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs queued jobs, and any jobs they defer, until none remain.
    pub fn run_until_idle(&self) {
        loop {
            let job = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

impl Schedule for QueueScheduler {
    fn defer(&self, job: Job) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
