//! The continuation multiplexer handed into tasks

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::error::TaskError;
use crate::scheduler::Schedule;
use crate::types::{Value, Values};

/// What a continuation does once invoked: synchronous context-flag updates
/// plus deferral of the actual resumption.
pub(crate) type ResumeFn = Box<dyn FnOnce(Option<TaskError>, Values) + Send>;

/// The callable handle passed into a task.
///
/// A task must eventually invoke the continuation it received, exactly once,
/// with either values or an error. The handle is cheap to clone so it can be
/// moved into separate success and failure paths; whichever path fires first
/// wins, and any later invocation is ignored.
pub struct Continuation {
    inner: Arc<Inner>,
}

struct Inner {
    fired: AtomicBool,
    target: Mutex<Option<ResumeFn>>,
    scheduler: Arc<dyn Schedule>,
}

impl Continuation {
    pub(crate) fn new(scheduler: Arc<dyn Schedule>, target: ResumeFn) -> Self {
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                target: Mutex::new(Some(target)),
                scheduler,
            }),
        }
    }

    /// Report success, threading `values` onward.
    pub fn resume(&self, values: Values) {
        self.invoke(None, values);
    }

    /// Report success with a single value.
    pub fn resume_with(&self, value: impl Any + Send) {
        self.resume(vec![Value::new(value)]);
    }

    /// Report failure. The error reaches the completion continuation of the
    /// owning run verbatim.
    pub fn fail(&self, error: TaskError) {
        self.invoke(Some(error), Values::new());
    }

    /// Report failure with an arbitrary payload.
    pub fn fail_with(&self, payload: impl Any + Send) {
        self.fail(TaskError::new(payload));
    }

    /// Invoke the continuation. The first invocation wins; later ones are
    /// ignored so a task cannot double-advance the owning executor.
    pub fn invoke(&self, error: Option<TaskError>, values: Values) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            trace!("continuation invoked more than once; ignoring");
            return;
        }
        let target = self
            .inner
            .target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(target) = target {
            target(error, values);
        }
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Schedule> {
        Arc::clone(&self.inner.scheduler)
    }
}

impl Clone for Continuation {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("fired", &self.inner.fired.load(Ordering::Acquire))
            .finish()
    }
}
